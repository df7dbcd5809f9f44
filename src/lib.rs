mod annotations;
mod ast;
mod config;
mod deps;
mod error;
mod generate;
mod loader;
mod options;
mod parse;
mod translate;
mod types;
mod wkt;

use std::path::Path;

pub use error::Error;

/// Compiles the packages matched by `patterns` under `root` and runs the
/// configured generators for each. An empty pattern list matches every
/// package below the root.
pub fn generate(
    root: impl AsRef<Path>,
    patterns: &[String],
    verbose: bool,
) -> Result<(), Error> {
    generate::run(root.as_ref(), patterns, verbose)
}
