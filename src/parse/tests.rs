use super::{parse, ParseError};
use crate::ast::{self, ConstValue, Decl, Ty};

fn parse_ok(source: &str) -> ast::File {
    match parse(source) {
        Ok(file) => file,
        Err(errors) => panic!("parse failed: {:?}", errors),
    }
}

fn parse_err(source: &str) -> Vec<ParseError> {
    match parse(source) {
        Ok(file) => panic!("expected failure, but parsed: {:?}", file),
        Err(errors) => errors,
    }
}

#[test]
fn package_clause() {
    let file = parse_ok("package util\n");
    assert_eq!(file.package.name.value, "util");
    assert!(file.imports.is_empty());
    assert!(file.decls.is_empty());
}

#[test]
fn package_doc() {
    let file = parse_ok("// Util holds shared types.\npackage util\n");
    assert_eq!(
        file.package.doc.text().as_deref(),
        Some("Util holds shared types.")
    );
}

#[test]
fn package_doc_detached_by_blank_line() {
    let file = parse_ok("// Stale comment.\n\npackage util\n");
    assert_eq!(file.package.doc.text(), None);
}

#[test]
fn imports() {
    let file = parse_ok(
        r#"package util

import "foo.example/v1/base"
import base2 "foo.example/v2/base"
import _ "foo.example/v1/unused"
"#,
    );
    assert_eq!(file.imports.len(), 3);
    assert_eq!(file.imports[0].path, "foo.example/v1/base");
    assert_eq!(file.imports[0].alias, None);
    assert!(!file.imports[0].blank);
    assert_eq!(
        file.imports[1].alias.as_ref().map(|i| i.value.as_str()),
        Some("base2")
    );
    assert!(file.imports[2].blank);
}

#[test]
fn import_block() {
    let file = parse_ok(
        "package util\n\nimport (\n\t\"foo.example/v1/base\"\n\tb \"foo.example/v2/base\"\n)\n",
    );
    assert_eq!(file.imports.len(), 2);
    assert_eq!(
        file.imports[1].alias.as_ref().map(|i| i.value.as_str()),
        Some("b")
    );
}

#[test]
fn struct_fields() {
    let file = parse_ok(
        r#"package util

type Message struct {
	// Msg is the contents.
	Msg     string            `pb:"1" json:"msg"`
	Code    int               `pb:"2"`
	Tags    []string          `pb:"3"`
	Attrs   map[string]string `pb:"4"`
	Raw     []byte            `pb:"5"`
}
"#,
    );
    let msg = match &file.decls[0] {
        Decl::Struct(msg) => msg,
        decl => panic!("expected a struct, found {:?}", decl),
    };
    assert_eq!(msg.name.value, "Message");
    assert_eq!(msg.fields.len(), 5);

    assert_eq!(msg.fields[0].name.value, "Msg");
    assert_eq!(
        msg.fields[0].doc.text().as_deref(),
        Some("Msg is the contents.")
    );
    let tag = msg.fields[0].tag.as_ref().unwrap();
    assert_eq!(tag.get("pb"), Some("1"));
    assert_eq!(tag.get("json"), Some("msg"));
    assert_eq!(tag.get("xml"), None);

    assert_eq!(msg.fields[1].ty.to_string(), "int");
    assert_eq!(msg.fields[2].ty.to_string(), "[]string");
    assert_eq!(msg.fields[3].ty.to_string(), "map[string]string");
    assert_eq!(msg.fields[4].ty.to_string(), "[]byte");
}

#[test]
fn qualified_type() {
    let file = parse_ok(
        "package util\n\nimport \"time\"\n\ntype Event struct {\n\tWhen time.Time `pb:\"1\"`\n}\n",
    );
    let msg = match &file.decls[0] {
        Decl::Struct(msg) => msg,
        decl => panic!("expected a struct, found {:?}", decl),
    };
    match &msg.fields[0].ty {
        Ty::Named(name) => {
            assert_eq!(name.qualifier.as_ref().unwrap().value, "time");
            assert_eq!(name.name.value, "Time");
        }
        ty => panic!("expected a named type, found {:?}", ty),
    }
}

#[test]
fn interface_methods() {
    let file = parse_ok(
        r#"package util

type Echo interface {
	// Echo returns its argument.
	Echo(EchoRequest) EchoResponse
	Ping()
	Watch(WatchRequest) chan WatchEvent
}
"#,
    );
    let svc = match &file.decls[0] {
        Decl::Interface(svc) => svc,
        decl => panic!("expected an interface, found {:?}", decl),
    };
    assert_eq!(svc.name.value, "Echo");
    assert_eq!(svc.methods.len(), 3);

    assert_eq!(svc.methods[0].name.value, "Echo");
    assert_eq!(ty_strings(&svc.methods[0].inputs), vec!["EchoRequest"]);
    assert_eq!(ty_strings(&svc.methods[0].outputs), vec!["EchoResponse"]);
    assert_eq!(
        svc.methods[0].doc.text().as_deref(),
        Some("Echo returns its argument.")
    );

    assert!(svc.methods[1].inputs.is_empty());
    assert!(svc.methods[1].outputs.is_empty());

    assert_eq!(ty_strings(&svc.methods[2].outputs), vec!["chan WatchEvent"]);
}

#[test]
fn method_with_multiple_parameters() {
    let file = parse_ok(
        "package util\n\ntype Api interface {\n\tFrob(A, B) (C, D)\n}\n",
    );
    let svc = match &file.decls[0] {
        Decl::Interface(svc) => svc,
        decl => panic!("expected an interface, found {:?}", decl),
    };
    assert_eq!(ty_strings(&svc.methods[0].inputs), vec!["A", "B"]);
    assert_eq!(ty_strings(&svc.methods[0].outputs), vec!["C", "D"]);
}

fn ty_strings(types: &[(Ty, logos::Span)]) -> Vec<String> {
    types.iter().map(|(ty, _)| ty.to_string()).collect()
}

#[test]
fn enum_alias_and_consts() {
    let file = parse_ok(
        r#"package util

// Status is the request state.
type Status int

const (
	// StatusUnknown is the zero value.
	StatusUnknown Status = iota
	StatusActive
	StatusDeleted
)
"#,
    );
    let alias = match &file.decls[0] {
        Decl::Alias(alias) => alias,
        decl => panic!("expected an alias, found {:?}", decl),
    };
    assert_eq!(alias.name.value, "Status");
    assert_eq!(alias.base.value, "int");

    let block = match &file.decls[1] {
        Decl::Consts(block) => block,
        decl => panic!("expected a const block, found {:?}", decl),
    };
    assert_eq!(block.specs.len(), 3);
    assert_eq!(block.specs[0].name.value, "StatusUnknown");
    assert_eq!(
        block.specs[0].ty.as_ref().map(|t| t.value.as_str()),
        Some("Status")
    );
    assert!(matches!(block.specs[0].value, Some(ConstValue::Iota(_))));
    assert_eq!(block.specs[1].ty, None);
    assert_eq!(block.specs[1].value, None);
}

#[test]
fn const_explicit_values() {
    let file = parse_ok(
        "package util\n\ntype Code int\n\nconst (\n\tCodeOk Code = 0\n\tCodeBad Code = 400\n)\n",
    );
    let block = match &file.decls[1] {
        Decl::Consts(block) => block,
        decl => panic!("expected a const block, found {:?}", decl),
    };
    match &block.specs[1].value {
        Some(ConstValue::Int(int)) => assert_eq!(int.value, 400),
        value => panic!("expected an integer, found {:?}", value),
    }
}

#[test]
fn annotations() {
    let file = parse_ok(
        r#"package util

type Echo interface {
	// Echo returns its argument.
	//
	// +tusk http.Match{
	//     Method: "POST",
	//     Path:   "/v1/echo",
	// }
	Echo(EchoRequest) EchoResponse
}
"#,
    );
    let svc = match &file.decls[0] {
        Decl::Interface(svc) => svc,
        decl => panic!("expected an interface, found {:?}", decl),
    };
    let method = &svc.methods[0];
    assert_eq!(method.doc.text().as_deref(), Some("Echo returns its argument."));
    let annotations = method.doc.annotations();
    assert_eq!(annotations.len(), 1);
    assert_eq!(
        annotations[0].text,
        "http.Match{ Method: \"POST\", Path:   \"/v1/echo\", }"
    );
}

#[test]
fn unexpected_token() {
    let errors = parse_err("package util\n\ntype 1 struct {}\n");
    assert!(matches!(
        &errors[0],
        ParseError::UnexpectedToken { expected, .. } if expected == "an identifier"
    ));
}

#[test]
fn missing_package() {
    let errors = parse_err("type Foo struct {}\n");
    assert!(matches!(
        &errors[0],
        ParseError::UnexpectedToken { expected, .. } if expected == "'package'"
    ));
}

#[test]
fn integer_out_of_range() {
    let errors = parse_err(
        "package util\n\ntype Code int\n\nconst (\n\tCodeBig Code = 99999999999999999999\n)\n",
    );
    assert!(matches!(&errors[0], ParseError::IntegerOutOfRange { .. }));
}

#[test]
fn recovers_after_bad_decl() {
    let errors = parse_err("package util\n\ntype Foo bar baz\n\ntype 2 struct {}\n");
    assert_eq!(errors.len(), 2);
}

#[test]
fn unexpected_eof() {
    let errors = parse_err("package util\n\ntype Message struct {\n\tMsg string `pb:\"1\"`\n");
    assert!(matches!(&errors[0], ParseError::UnexpectedEof { .. }));
}
