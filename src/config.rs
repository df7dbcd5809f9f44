//! `.tuskconfig` discovery and parsing.
//!
//! Configuration is searched from the package directory upward. The search
//! stops at the project root, marked by a `tusk.mod` file or a `.git` entry,
//! or at the filesystem root. All files found on the way merge, with the
//! generators of nearer files running first.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind};

const CONFIG_FILE: &str = ".tuskconfig";
const ROOT_MARKERS: &[&str] = &["tusk.mod", ".git"];

#[derive(Debug, Default)]
pub(crate) struct Config {
    pub out: Option<String>,
    pub generators: Vec<Generator>,
}

#[derive(Debug, Default)]
pub(crate) struct Generator {
    /// A generator name passed to protoc as `--<name>_out`.
    pub protoc_gen: Option<String>,
    /// A plugin binary speaking the code generator wire protocol.
    pub command: Option<String>,
    pub params: Vec<(String, String)>,
    pub config_dir: PathBuf,
    pub out: Option<String>,
    /// Maximum subprocess runtime in seconds.
    pub timeout: Option<u64>,
}

impl Generator {
    pub fn is_protoc(&self) -> bool {
        self.protoc_gen.is_some()
    }

    /// The command line name used in diagnostics.
    pub fn display_name(&self) -> String {
        match (&self.command, &self.protoc_gen) {
            (Some(command), _) => command.clone(),
            (None, Some(gen)) => format!("protoc --{}_out", gen),
            (None, None) => "generator".to_owned(),
        }
    }

    pub fn param_string(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(key, value)| {
                if value.is_empty() {
                    key.clone()
                } else {
                    format!("{}={}", key, value)
                }
            })
            .collect();
        params.join(",")
    }

    /// The parameter string with the output directory folded in, as protoc
    /// expects for `--<name>_out=<params>:<dir>`.
    pub fn param_string_with_out(&self, package_dir: &Path) -> String {
        let out = self.out_path(package_dir);
        let params = self.param_string();
        if params.is_empty() {
            out.display().to_string()
        } else {
            format!("{}:{}", params, out.display())
        }
    }

    /// The directory generated files are written to. Relative `out` entries
    /// resolve against the directory of the config that declared them; with
    /// no `out`, files land beside the package sources.
    pub fn out_path(&self, package_dir: &Path) -> PathBuf {
        match &self.out {
            None => package_dir.to_owned(),
            Some(out) if Path::new(out).is_absolute() => PathBuf::from(out),
            Some(out) => self.config_dir.join(out),
        }
    }
}

pub(crate) fn load(dir: &Path) -> Result<Config, Error> {
    let mut merged: Option<Config> = None;

    let mut current = Some(dir);
    while let Some(dir) = current {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            let config = parse_file(&path, dir)?;
            match &mut merged {
                None => merged = Some(config),
                Some(merged) => merged.generators.extend(config.generators),
            }
        }

        if ROOT_MARKERS.iter().any(|marker| dir.join(marker).exists()) {
            break;
        }
        current = dir.parent();
    }

    match merged {
        Some(config) => Ok(config),
        None => Err(Error::from_kind(ErrorKind::ConfigNotFound {
            dir: dir.to_owned(),
        })),
    }
}

fn parse_file(path: &Path, dir: &Path) -> Result<Config, Error> {
    let text = fs::read_to_string(path).map_err(|err| {
        Error::from_kind(ErrorKind::OpenFile {
            path: path.to_owned(),
            err,
        })
    })?;

    let mut config = Config::default();
    let mut section: Option<Generator> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            if let Some(generator) = section.take() {
                config.generators.push(generator);
            }
            section = Some(parse_section_header(path, name.trim(), dir)?);
            continue;
        }

        let (key, value) = match line.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => {
                return Err(config_error(
                    path,
                    format!("expected 'key=value', found '{}'", line),
                ))
            }
        };

        match &mut section {
            None => match key {
                "out" => config.out = Some(value.to_owned()),
                _ => {
                    return Err(config_error(
                        path,
                        format!("unexpected key '{}' in global section", key),
                    ))
                }
            },
            Some(generator) => match key {
                "command" => {
                    if generator.protoc_gen.is_some() {
                        return Err(config_error(path, "only one 'command' or 'protoc' allowed"));
                    }
                    generator.command = Some(value.to_owned());
                }
                "protoc" => {
                    if generator.command.is_some() {
                        return Err(config_error(path, "only one 'command' or 'protoc' allowed"));
                    }
                    generator.protoc_gen = Some(value.to_owned());
                }
                "out" => generator.out = Some(value.to_owned()),
                "timeout" => match value.parse() {
                    Ok(seconds) => generator.timeout = Some(seconds),
                    Err(_) => {
                        return Err(config_error(
                            path,
                            format!("invalid timeout '{}'", value),
                        ))
                    }
                },
                _ => generator.params.push((key.to_owned(), value.to_owned())),
            },
        }
    }
    if let Some(generator) = section.take() {
        config.generators.push(generator);
    }

    for generator in &config.generators {
        if generator.command.is_none() && generator.protoc_gen.is_none() {
            return Err(config_error(
                path,
                "generator section needs a 'command' or 'protoc' key",
            ));
        }
    }

    // a global out applies to generators that do not set their own
    if let Some(out) = &config.out {
        for generator in &mut config.generators {
            if generator.out.is_none() {
                generator.out = Some(out.clone());
            }
        }
    }
    Ok(config)
}

fn parse_section_header(path: &Path, name: &str, dir: &Path) -> Result<Generator, Error> {
    let mut generator = Generator {
        config_dir: dir.to_owned(),
        ..Default::default()
    };

    if name == "generate" {
        return Ok(generator);
    }

    match name.strip_prefix("generate ") {
        Some(short) => {
            let short = short.trim().trim_matches('"');
            // a protoc-gen-<name> binary on PATH wins over a native
            // protoc generator of the same name
            let plugin = format!("protoc-gen-{}", short);
            if find_on_path(&plugin) {
                generator.command = Some(plugin);
            } else {
                generator.protoc_gen = Some(short.to_owned());
            }
            Ok(generator)
        }
        None => Err(config_error(path, format!("unknown section '{}'", name))),
    }
}

fn find_on_path(binary: &str) -> bool {
    let path = match env::var_os("PATH") {
        Some(path) => path,
        None => return false,
    };
    env::split_paths(&path).any(|dir| dir.join(binary).is_file())
}

fn config_error(path: &Path, message: impl Into<String>) -> Error {
    Error::from_kind(ErrorKind::Config {
        path: path.to_owned(),
        message: message.into(),
    })
}
