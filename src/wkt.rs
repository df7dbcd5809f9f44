//! Built-in descriptors for the `well_known` namespace.
//!
//! These files are never read from disk. They are synthesized here and added
//! to descriptor sets whenever a schema uses a type that maps onto them.

use once_cell::sync::Lazy;
use prost_types::field_descriptor_proto::{Label, Type};

use crate::types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto};

pub(crate) const EMPTY_FILE: &str = "well_known/empty.proto";
pub(crate) const TIMESTAMP_FILE: &str = "well_known/timestamp.proto";
pub(crate) const DURATION_FILE: &str = "well_known/duration.proto";
pub(crate) const HTTP_FILE: &str = "well_known/http.proto";

pub(crate) const EMPTY_TYPE: &str = ".well_known.Empty";
pub(crate) const TIMESTAMP_TYPE: &str = ".well_known.Timestamp";
pub(crate) const DURATION_TYPE: &str = ".well_known.Duration";

/// Field number of the `http` method option carrying an `HttpRule`.
pub(crate) const HTTP_EXTENSION: u32 = 72295728;

pub(crate) mod http_rule {
    pub(crate) const GET: u32 = 2;
    pub(crate) const PUT: u32 = 3;
    pub(crate) const POST: u32 = 4;
    pub(crate) const DELETE: u32 = 5;
    pub(crate) const PATCH: u32 = 6;
    pub(crate) const BODY: u32 = 7;
}

pub(crate) fn get(name: &str) -> Option<&'static FileDescriptorProto> {
    match name {
        EMPTY_FILE => Some(&EMPTY),
        TIMESTAMP_FILE => Some(&TIMESTAMP),
        DURATION_FILE => Some(&DURATION),
        HTTP_FILE => Some(&HTTP),
        _ => None,
    }
}

static EMPTY: Lazy<FileDescriptorProto> = Lazy::new(|| FileDescriptorProto {
    message_type: vec![DescriptorProto {
        name: Some("Empty".to_owned()),
        ..Default::default()
    }],
    ..file(EMPTY_FILE)
});

static TIMESTAMP: Lazy<FileDescriptorProto> = Lazy::new(|| FileDescriptorProto {
    message_type: vec![seconds_nanos("Timestamp")],
    ..file(TIMESTAMP_FILE)
});

static DURATION: Lazy<FileDescriptorProto> = Lazy::new(|| FileDescriptorProto {
    message_type: vec![seconds_nanos("Duration")],
    ..file(DURATION_FILE)
});

static HTTP: Lazy<FileDescriptorProto> = Lazy::new(|| FileDescriptorProto {
    message_type: vec![DescriptorProto {
        name: Some("HttpRule".to_owned()),
        field: vec![
            string_field("get", http_rule::GET),
            string_field("put", http_rule::PUT),
            string_field("post", http_rule::POST),
            string_field("delete", http_rule::DELETE),
            string_field("patch", http_rule::PATCH),
            string_field("body", http_rule::BODY),
        ],
        ..Default::default()
    }],
    extension: vec![FieldDescriptorProto {
        name: Some("http".to_owned()),
        number: Some(HTTP_EXTENSION as i32),
        label: Some(Label::Optional as i32),
        r#type: Some(Type::Message as i32),
        type_name: Some(".well_known.HttpRule".to_owned()),
        extendee: Some(".google.protobuf.MethodOptions".to_owned()),
        ..Default::default()
    }],
    ..file(HTTP_FILE)
});

fn file(name: &str) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(name.to_owned()),
        package: Some("well_known".to_owned()),
        syntax: Some("proto3".to_owned()),
        ..Default::default()
    }
}

fn seconds_nanos(name: &str) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_owned()),
        field: vec![
            FieldDescriptorProto {
                name: Some("seconds".to_owned()),
                json_name: Some("seconds".to_owned()),
                number: Some(1),
                label: Some(Label::Optional as i32),
                r#type: Some(Type::Int64 as i32),
                ..Default::default()
            },
            FieldDescriptorProto {
                name: Some("nanos".to_owned()),
                json_name: Some("nanos".to_owned()),
                number: Some(2),
                label: Some(Label::Optional as i32),
                r#type: Some(Type::Int32 as i32),
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}

fn string_field(name: &str, number: u32) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_owned()),
        json_name: Some(name.to_owned()),
        number: Some(number as i32),
        label: Some(Label::Optional as i32),
        r#type: Some(Type::String as i32),
        ..Default::default()
    }
}
