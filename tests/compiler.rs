#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use assert_fs::TempDir;

fn write_package(root: &Path) -> PathBuf {
    fs::write(root.join("tusk.mod"), "").unwrap();
    let dir = root.join("pet");
    fs::create_dir(&dir).unwrap();
    fs::write(
        dir.join("pet.tusk"),
        "package pet\n\
         \n\
         // Pet is a registered animal.\n\
         type Pet struct {\n\
         \tName string `pb:\"1\"`\n\
         }\n",
    )
    .unwrap();
    dir
}

fn write_plugin(dir: &Path, script: &str) -> PathBuf {
    let path = dir.join("plugin.sh");
    fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn write_config(dir: &Path, body: &str) {
    fs::write(dir.join(".tuskconfig"), body).unwrap();
}

fn encode_field(tag: u8, bytes: &[u8], buf: &mut Vec<u8>) {
    assert!(bytes.len() < 128);
    buf.push(tag);
    buf.push(bytes.len() as u8);
    buf.extend_from_slice(bytes);
}

// CodeGeneratorResponse with a single file: file = 15, name = 1, content = 15.
fn plugin_response(name: &str, content: &str) -> Vec<u8> {
    let mut file = Vec::new();
    encode_field(0x0a, name.as_bytes(), &mut file);
    encode_field(0x7a, content.as_bytes(), &mut file);
    let mut buf = Vec::new();
    encode_field(0x7a, &file, &mut buf);
    buf
}

// CodeGeneratorResponse with the error field (1) set.
fn plugin_error_response(message: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_field(0x0a, message.as_bytes(), &mut buf);
    buf
}

// Reads the first length-delimited field 1 of a message, which for a
// CodeGeneratorRequest is the first file_to_generate entry.
fn first_string_field(bytes: &[u8]) -> Option<String> {
    let mut i = 0;
    while i + 1 < bytes.len() {
        let tag = bytes[i];
        let len = bytes[i + 1] as usize;
        if tag == 0x0a {
            return String::from_utf8(bytes[i + 2..i + 2 + len].to_vec()).ok();
        }
        if tag & 0x07 != 2 {
            return None;
        }
        i += 2 + len;
    }
    None
}

#[test]
fn plugin_writes_returned_files() {
    let root = TempDir::new().unwrap();
    let pkg = write_package(root.path());

    fs::write(
        pkg.join("response.bin"),
        plugin_response("acme/pet.pb.mock", "// mock output\n"),
    )
    .unwrap();
    let plugin = write_plugin(
        &pkg,
        "dir=$(dirname \"$0\")\ncat > \"$dir/request.bin\"\ncat \"$dir/response.bin\"",
    );
    write_config(&pkg, &format!("[generate]\ncommand={}\n", plugin.display()));

    tusk::generate(root.path(), &[], false).unwrap();

    // output names reduce to their base name under the package directory
    let written = fs::read_to_string(pkg.join("pet.pb.mock")).unwrap();
    assert_eq!(written, "// mock output\n");

    let request = fs::read(pkg.join("request.bin")).unwrap();
    assert_eq!(first_string_field(&request).as_deref(), Some("pet/all.proto"));
}

#[test]
fn plugin_output_honours_out_directory() {
    let root = TempDir::new().unwrap();
    let pkg = write_package(root.path());

    fs::write(pkg.join("response.bin"), plugin_response("pet.pb.mock", "out")).unwrap();
    let plugin = write_plugin(&pkg, "dir=$(dirname \"$0\")\ncat \"$dir/response.bin\"");
    write_config(
        &pkg,
        &format!("[generate]\ncommand={}\nout=generated\n", plugin.display()),
    );

    tusk::generate(root.path(), &[], false).unwrap();

    assert!(pkg.join("generated/pet.pb.mock").is_file());
}

#[test]
fn plugin_reported_error_fails_the_run() {
    let root = TempDir::new().unwrap();
    let pkg = write_package(root.path());

    fs::write(pkg.join("response.bin"), plugin_error_response("bad input")).unwrap();
    let plugin = write_plugin(&pkg, "dir=$(dirname \"$0\")\ncat \"$dir/response.bin\"");
    write_config(&pkg, &format!("[generate]\ncommand={}\n", plugin.display()));

    let err = tusk::generate(root.path(), &[], false).unwrap_err();
    assert!(err.to_string().contains("reported an error: bad input"));
    assert!(err.is_generator_error());
}

#[test]
fn failing_plugin_surfaces_stderr() {
    let root = TempDir::new().unwrap();
    let pkg = write_package(root.path());

    let plugin = write_plugin(&pkg, "echo 'boom' >&2\nexit 3");
    write_config(&pkg, &format!("[generate]\ncommand={}\n", plugin.display()));

    let err = tusk::generate(root.path(), &[], false).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("exited with status 3"));
    assert!(message.contains("boom"));
}

#[test]
fn slow_plugin_times_out() {
    let root = TempDir::new().unwrap();
    let pkg = write_package(root.path());

    let plugin = write_plugin(&pkg, "sleep 10");
    write_config(
        &pkg,
        &format!("[generate]\ncommand={}\ntimeout=1\n", plugin.display()),
    );

    let err = tusk::generate(root.path(), &[], false).unwrap_err();
    assert!(err.to_string().contains("did not finish within 1 seconds"));
}

#[test]
fn timeout_fires_while_pipes_are_blocked() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("tusk.mod"), "").unwrap();
    let pkg = root.path().join("pet");
    fs::create_dir(&pkg).unwrap();

    // enough fields that the encoded request exceeds the pipe buffer
    let mut schema = String::from("package pet\n\ntype Big struct {\n");
    for i in 1..=6000 {
        schema.push_str(&format!("\tField{i} string `pb:\"{i}\"`\n"));
    }
    schema.push_str("}\n");
    fs::write(pkg.join("big.tusk"), schema).unwrap();

    // fills its stdout pipe first, then stalls without reading stdin
    let plugin = write_plugin(&pkg, "head -c 200000 /dev/zero\nsleep 30");
    write_config(
        &pkg,
        &format!("[generate]\ncommand={}\ntimeout=1\n", plugin.display()),
    );

    let start = Instant::now();
    let err = tusk::generate(root.path(), &[], false).unwrap_err();
    assert!(err.to_string().contains("did not finish within 1 seconds"));
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[test]
fn unsafe_output_name_is_rejected() {
    let root = TempDir::new().unwrap();
    let pkg = write_package(root.path());

    fs::write(
        pkg.join("response.bin"),
        plugin_response("../escape.txt", "nope"),
    )
    .unwrap();
    let plugin = write_plugin(&pkg, "dir=$(dirname \"$0\")\ncat \"$dir/response.bin\"");
    write_config(&pkg, &format!("[generate]\ncommand={}\n", plugin.display()));

    let err = tusk::generate(root.path(), &[], false).unwrap_err();
    assert!(err.to_string().contains("unsafe output file name"));
    assert!(!root.path().join("escape.txt").exists());
}

#[test]
fn package_without_config_is_an_error() {
    let root = TempDir::new().unwrap();
    write_package(root.path());

    let err = tusk::generate(root.path(), &[], false).unwrap_err();
    assert!(err.to_string().contains(".tuskconfig"));
}

#[test]
fn generators_run_in_configuration_order() {
    let root = TempDir::new().unwrap();
    let pkg = write_package(root.path());

    fs::write(pkg.join("response.bin"), plugin_response("pet.pb.mock", "ok")).unwrap();
    let plugin = write_plugin(
        &pkg,
        "dir=$(dirname \"$0\")\necho run >> \"$dir/log.txt\"\ncat \"$dir/response.bin\"",
    );
    write_config(
        &pkg,
        &format!(
            "[generate]\ncommand={cmd}\n\n[generate]\ncommand={cmd}\n",
            cmd = plugin.display()
        ),
    );

    tusk::generate(root.path(), &[], false).unwrap();

    let log = fs::read_to_string(pkg.join("log.txt")).unwrap();
    assert_eq!(log, "run\nrun\n");
}
