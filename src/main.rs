use std::env;

use clap::{Parser, Subcommand};
use miette::Result;

#[derive(Debug, Parser)]
#[clap(name = "tusk", version, about)]
pub struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile packages and run their configured generators
    Generate {
        /// Package patterns, like `acme.com/pet` or `./...`
        #[clap(value_name = "PATTERNS", value_parser)]
        patterns: Vec<String>,
        /// Print the commands being run
        #[clap(short = 'v', long = "verbose")]
        verbose: bool,
    },
}

pub fn main() -> Result<()> {
    miette::set_panic_hook();

    let args = Args::parse();
    match args.command {
        Command::Generate { patterns, verbose } => {
            let root = env::current_dir().map_err(|err| miette::miette!(err))?;
            tusk::generate(root, &patterns, verbose)?;
        }
    }
    Ok(())
}
