//! Dispatch of descriptor sets to code generator subprocesses.

use std::fs;
use std::io::Read;
use std::io::Write;
use std::path::{Component, Path};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use prost::Message;

use crate::config::{self, Generator};
use crate::deps::{self, WellKnownLoader};
use crate::error::{Error, ErrorKind};
use crate::loader::{Loader, Package};
use crate::translate::Translator;
use crate::types::{
    CodeGeneratorRequest, CodeGeneratorResponse, FileDescriptorProto, FileDescriptorSet,
};

#[cfg(test)]
mod tests;

/// The file name descriptors are generated under, once the package path
/// prefix is stripped for protoc.
const UNIFIED_NAME: &str = "all.proto";

/// Loads, translates and generates every package matched by the patterns.
/// Generators run synchronously in configuration order; the first failure
/// aborts the run.
pub(crate) fn run(root: &Path, patterns: &[String], verbose: bool) -> Result<(), Error> {
    let mut loader = Loader::new(root);
    let targets = loader.load(patterns)?;

    let mut translator = Translator::new(&loader);
    for target in &targets {
        translator.translate_pkg(target)?;
    }
    let files = translator.into_files().into_values().collect();
    let sorted = deps::resolve_and_sort(files, &WellKnownLoader)?;

    for target in &targets {
        let pkg = match loader.get(target) {
            Some(pkg) => pkg,
            None => {
                return Err(Error::from_kind(ErrorKind::UnknownDescriptorDependency {
                    name: target.clone(),
                }))
            }
        };
        let config = config::load(&pkg.dir)?;

        let request = CodeGeneratorRequest {
            file_to_generate: vec![pkg.descriptor_name()],
            parameter: None,
            proto_file: sorted.clone(),
        };

        for generator in &config.generators {
            if verbose {
                eprintln!(
                    "tusk: generating {} with {}",
                    pkg.import_path,
                    generator.display_name()
                );
            }
            if generator.is_protoc() {
                generate_protoc(&request, generator, pkg, verbose)?;
            } else {
                generate_plugin(&request, generator, pkg, verbose)?;
            }
        }
    }
    Ok(())
}

/// Runs a native protoc generator against the descriptor set.
///
/// protoc derives output file names from descriptor file names, which here
/// carry the package path. The target file is renamed to the bare
/// `all.proto` (and references to it rewritten) so output lands directly in
/// the output directory.
fn generate_protoc(
    request: &CodeGeneratorRequest,
    generator: &Generator,
    pkg: &Package,
    verbose: bool,
) -> Result<(), Error> {
    let mut files = request.proto_file.clone();
    rename_for_protoc(&mut files, &pkg.descriptor_name());
    let set = FileDescriptorSet { file: files };

    let gen_name = generator.protoc_gen.as_deref().unwrap_or_default();
    let mut command = Command::new("protoc");
    command
        .arg(format!(
            "--{}_out={}",
            gen_name,
            generator.param_string_with_out(&pkg.dir)
        ))
        .arg("--descriptor_set_in=/dev/stdin")
        .arg(UNIFIED_NAME);

    let output = run_command(command, &set.encode_to_vec(), generator, verbose)?;
    if !output.status.success() {
        return Err(Error::from_kind(ErrorKind::GeneratorFailed {
            command: generator.display_name(),
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        }));
    }
    Ok(())
}

/// Runs a plugin speaking the code generator wire protocol and writes the
/// files it returns.
fn generate_plugin(
    request: &CodeGeneratorRequest,
    generator: &Generator,
    pkg: &Package,
    verbose: bool,
) -> Result<(), Error> {
    let command_name = generator.display_name();

    let mut request = request.clone();
    request.parameter = Some(generator.param_string());

    let output = run_command(
        Command::new(&command_name),
        &request.encode_to_vec(),
        generator,
        verbose,
    )?;
    if !output.status.success() {
        return Err(Error::from_kind(ErrorKind::GeneratorFailed {
            command: command_name,
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        }));
    }

    let response = CodeGeneratorResponse::decode(output.stdout.as_slice()).map_err(|err| {
        Error::from_kind(ErrorKind::GeneratorResponse {
            command: command_name.clone(),
            err,
        })
    })?;
    if let Some(message) = response.error.filter(|message| !message.is_empty()) {
        return Err(Error::from_kind(ErrorKind::GeneratorReported {
            command: command_name,
            message,
        }));
    }

    let out_dir = generator.out_path(&pkg.dir);
    for file in response.file {
        let name = file.name.unwrap_or_default();
        let base = output_file_name(&name)?;
        let path = out_dir.join(base);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                Error::from_kind(ErrorKind::WriteFile {
                    path: path.clone(),
                    err,
                })
            })?;
        }
        fs::write(&path, file.content.unwrap_or_default()).map_err(|err| {
            Error::from_kind(ErrorKind::WriteFile { path, err })
        })?;
    }
    Ok(())
}

fn rename_for_protoc(files: &mut [FileDescriptorProto], target: &str) {
    for file in files {
        if file.name.as_deref() == Some(target) {
            file.name = Some(UNIFIED_NAME.to_owned());
        }
        for dep in &mut file.dependency {
            if dep == target {
                *dep = UNIFIED_NAME.to_owned();
            }
        }
    }
}

/// Validates a returned file name and reduces it to its final component.
/// Anything that is not a plain forward relative path is rejected, so a
/// generator cannot write outside the output directory.
fn output_file_name(name: &str) -> Result<&str, Error> {
    let path = Path::new(name);
    if name.is_empty()
        || !path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
    {
        return Err(Error::from_kind(ErrorKind::UnsafeOutputName {
            name: name.to_owned(),
        }));
    }
    match path.file_name().and_then(|base| base.to_str()) {
        Some(base) => Ok(base),
        None => Err(Error::from_kind(ErrorKind::UnsafeOutputName {
            name: name.to_owned(),
        })),
    }
}

struct CommandOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Runs a subprocess feeding `input` on stdin, enforcing the generator's
/// timeout if one is configured.
fn run_command(
    mut command: Command,
    input: &[u8],
    generator: &Generator,
    verbose: bool,
) -> Result<CommandOutput, Error> {
    let command_name = generator.display_name();
    if verbose {
        eprintln!("tusk: running {:?}", command);
    }

    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command.spawn().map_err(|err| {
        Error::from_kind(ErrorKind::GeneratorExecution {
            command: command_name.clone(),
            err,
        })
    })?;

    // stdin and the output pipes are serviced off-thread. The wait below
    // must never block on pipe I/O, or the timeout could not fire; killing
    // the child closes the pipes and unblocks the writer.
    let stdin = child.stdin.take().map(|mut stdin| {
        let input = input.to_vec();
        thread::spawn(move || {
            let _ = stdin.write_all(&input);
        })
    });
    let stdout = child.stdout.take().map(read_to_end_thread);
    let stderr = child.stderr.take().map(read_to_end_thread);

    let status = wait(&mut child, generator, &command_name)?;
    let stdout = stdout.map(collect).unwrap_or_default();
    let stderr = stderr.map(collect).unwrap_or_default();
    if let Some(handle) = stdin {
        let _ = handle.join();
    }

    Ok(CommandOutput {
        status,
        stdout,
        stderr,
    })
}

fn wait(child: &mut Child, generator: &Generator, command_name: &str) -> Result<ExitStatus, Error> {
    let seconds = match generator.timeout {
        Some(seconds) => seconds,
        None => {
            return child.wait().map_err(|err| {
                Error::from_kind(ErrorKind::GeneratorExecution {
                    command: command_name.to_owned(),
                    err,
                })
            })
        }
    };

    let deadline = Instant::now() + Duration::from_secs(seconds);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::from_kind(ErrorKind::GeneratorTimeout {
                        command: command_name.to_owned(),
                        seconds,
                    }));
                }
                thread::sleep(Duration::from_millis(20));
            }
            Err(err) => {
                return Err(Error::from_kind(ErrorKind::GeneratorExecution {
                    command: command_name.to_owned(),
                    err,
                }))
            }
        }
    }
}

fn read_to_end_thread(mut reader: impl Read + Send + 'static) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: thread::JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}
