use super::{output_file_name, rename_for_protoc};
use crate::error::ErrorKind;
use crate::types::FileDescriptorProto;

fn file(name: &str, deps: &[&str]) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(name.to_owned()),
        dependency: deps.iter().map(|dep| (*dep).to_owned()).collect(),
        ..Default::default()
    }
}

#[test]
fn protoc_rename_rewrites_target_and_references() {
    let mut files = vec![
        file("well_known/timestamp.proto", &[]),
        file("acme.com/pet/all.proto", &["well_known/timestamp.proto"]),
        file("acme.com/store/all.proto", &["acme.com/pet/all.proto"]),
    ];
    rename_for_protoc(&mut files, "acme.com/pet/all.proto");

    assert_eq!(files[1].name.as_deref(), Some("all.proto"));
    assert_eq!(files[1].dependency, vec!["well_known/timestamp.proto"]);
    assert_eq!(files[2].name.as_deref(), Some("acme.com/store/all.proto"));
    assert_eq!(files[2].dependency, vec!["all.proto"]);
}

#[test]
fn output_names_reduce_to_base_name() {
    assert_eq!(output_file_name("pet.pb.go").unwrap(), "pet.pb.go");
    assert_eq!(output_file_name("acme.com/pet/pet.pb.go").unwrap(), "pet.pb.go");
}

#[test]
fn unsafe_output_names_are_rejected() {
    for name in ["", "/etc/passwd", "../escape.go", "a/../../b.go"] {
        let err = output_file_name(name).unwrap_err();
        match err.kind() {
            ErrorKind::UnsafeOutputName { name: found } => assert_eq!(found, name),
            kind => panic!("unexpected error: {:?}", kind),
        }
    }
}
