//! Resolution of `+tusk` doc annotations into descriptor options.

use logos::Logos;

use crate::ast::{Annotation, Doc};
use crate::error::{Error, ErrorKind};
use crate::loader::SourceFile;
use crate::options::{OptionSet, Value};
use crate::parse::lex::Token;
use crate::wkt;

/// The declaration level an annotation is attached to. Each level has its
/// own closed vocabulary; anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Level {
    File,
    Message,
    Field,
    Enum,
    EnumValue,
    Service,
    Method,
}

/// The options and implicit descriptor dependencies produced by one
/// declaration's annotations.
#[derive(Debug, Default)]
pub(crate) struct Resolved {
    pub options: OptionSet,
    pub deps: Vec<&'static str>,
}

pub(crate) fn resolve(
    level: Level,
    decl: &str,
    doc: &Doc,
    file: &SourceFile,
) -> Result<Resolved, Error> {
    let mut resolved = Resolved::default();
    for annotation in doc.annotations() {
        apply(level, decl, &annotation, file, &mut resolved)?;
    }
    Ok(resolved)
}

fn apply(
    level: Level,
    decl: &str,
    annotation: &Annotation,
    file: &SourceFile,
    resolved: &mut Resolved,
) -> Result<(), Error> {
    let expr = match Expr::parse(&annotation.text) {
        Some(expr) => expr,
        None => return Err(unsupported(decl, annotation, file)),
    };

    let target = match (level, expr.scope.as_str(), expr.name.as_str()) {
        (Level::File, "file", "JavaPackage") => Target::String(1),
        (Level::File, "file", "JavaMultipleFiles") => Target::Bool(10),
        (Level::File, "file", "Deprecated") => Target::Bool(23),
        (Level::Message, "message", "Deprecated") => Target::Bool(3),
        (Level::Field, "field", "Packed") => Target::Bool(2),
        (Level::Field, "field", "Deprecated") => Target::Bool(3),
        (Level::Enum, "enum", "Deprecated") => Target::Bool(3),
        (Level::EnumValue, "enumvalue", "Deprecated") => Target::Bool(1),
        (Level::Service, "service", "Deprecated") => Target::Bool(33),
        (Level::Method, "method", "Deprecated") => Target::Bool(33),
        (Level::Method, "http", "Match") => Target::HttpRule,
        _ => return Err(unsupported(decl, annotation, file)),
    };

    match (target, expr.arg) {
        (Target::String(tag), Arg::Call(Literal::String(value))) => {
            resolved.options.set(tag, Value::String(value));
        }
        (Target::Bool(tag), Arg::Call(Literal::Bool(value))) => {
            resolved.options.set(tag, Value::Bool(value));
        }
        (Target::HttpRule, Arg::Composite(entries)) => {
            let rule = http_rule(decl, annotation, file, entries)?;
            resolved
                .options
                .set(wkt::HTTP_EXTENSION, Value::Message(rule));
            if !resolved.deps.contains(&wkt::HTTP_FILE) {
                resolved.deps.push(wkt::HTTP_FILE);
            }
        }
        _ => return Err(unsupported(decl, annotation, file)),
    }
    Ok(())
}

fn http_rule(
    decl: &str,
    annotation: &Annotation,
    file: &SourceFile,
    entries: Vec<(String, Literal)>,
) -> Result<OptionSet, Error> {
    let mut method = None;
    let mut path = None;
    let mut body = None;
    for (key, value) in entries {
        match (key.as_str(), value) {
            ("Method", Literal::String(value)) => method = Some(value),
            ("Path", Literal::String(value)) => path = Some(value),
            ("Body", Literal::String(value)) => body = Some(value),
            _ => return Err(unsupported(decl, annotation, file)),
        }
    }

    let path = match path {
        Some(path) => path,
        None => return Err(unsupported(decl, annotation, file)),
    };
    let path_tag = match method.as_deref().unwrap_or("GET") {
        "GET" => wkt::http_rule::GET,
        "PUT" => wkt::http_rule::PUT,
        "POST" => wkt::http_rule::POST,
        "DELETE" => wkt::http_rule::DELETE,
        "PATCH" => wkt::http_rule::PATCH,
        _ => return Err(unsupported(decl, annotation, file)),
    };

    let mut rule = OptionSet::new();
    rule.set(path_tag, Value::String(path));
    if let Some(body) = body {
        rule.set(wkt::http_rule::BODY, Value::String(body));
    }
    Ok(rule)
}

fn unsupported(decl: &str, annotation: &Annotation, file: &SourceFile) -> Error {
    Error::from_kind(ErrorKind::UnsupportedOption {
        decl: decl.to_owned(),
        text: annotation.text.clone(),
        src: file.named_source().into(),
        span: annotation.span.clone().into(),
    })
}

enum Target {
    String(u32),
    Bool(u32),
    HttpRule,
}

/// A parsed annotation expression: `scope.Name(literal)` or
/// `scope.Name{Key: "value", ...}`.
struct Expr {
    scope: String,
    name: String,
    arg: Arg,
}

enum Arg {
    Call(Literal),
    Composite(Vec<(String, Literal)>),
}

enum Literal {
    String(String),
    Bool(bool),
}

impl Expr {
    fn parse(text: &str) -> Option<Expr> {
        let mut lexer = Token::lexer(text);

        let scope = lexer.next()?.into_ident()?;
        if lexer.next()? != Token::Dot {
            return None;
        }
        let name = lexer.next()?.into_ident()?;

        let arg = match lexer.next()? {
            Token::LeftParen => {
                let literal = parse_literal(lexer.next()?)?;
                if lexer.next()? != Token::RightParen {
                    return None;
                }
                Arg::Call(literal)
            }
            Token::LeftBrace => {
                let mut entries = Vec::new();
                loop {
                    match lexer.next()? {
                        Token::RightBrace => break,
                        Token::Comma => continue,
                        tok => {
                            let key = tok.into_ident()?;
                            if lexer.next()? != Token::Colon {
                                return None;
                            }
                            entries.push((key, parse_literal(lexer.next()?)?));
                        }
                    }
                }
                Arg::Composite(entries)
            }
            _ => return None,
        };

        if lexer.next().is_some() {
            return None;
        }
        if !lexer.extras.errors.is_empty() {
            return None;
        }
        Some(Expr { scope, name, arg })
    }
}

fn parse_literal(tok: Token) -> Option<Literal> {
    match tok {
        Token::StringLiteral(value) => Some(Literal::String(value)),
        Token::Ident(value) if value == "true" => Some(Literal::Bool(true)),
        Token::Ident(value) if value == "false" => Some(Literal::Bool(false)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::{resolve, Level};
    use crate::error::ErrorKind;
    use crate::loader::SourceFile;
    use crate::options::Value;
    use crate::parse;
    use crate::wkt;

    fn source_file(source: &str) -> SourceFile {
        let ast = parse::parse(source).unwrap();
        SourceFile {
            path: PathBuf::from("test.tusk"),
            source: Arc::from(source),
            ast,
        }
    }

    #[test]
    fn file_options() {
        let file = source_file(
            "// +tusk file.JavaPackage(\"com.example.pet\")\n// +tusk file.JavaMultipleFiles(true)\npackage pet\n",
        );
        let doc = file.ast.package.doc.clone();

        let resolved = resolve(Level::File, "pet", &doc, &file).unwrap();
        assert_eq!(
            resolved.options.get(1),
            Some(&Value::String("com.example.pet".to_owned()))
        );
        assert_eq!(resolved.options.get(10), Some(&Value::Bool(true)));
        assert!(resolved.deps.is_empty());
    }

    #[test]
    fn http_match() {
        let file = source_file(
            "package pet\n\ntype Api interface {\n\t// +tusk http.Match{\n\t//     Method: \"POST\",\n\t//     Path:   \"/v1/pets\",\n\t//     Body:   \"*\",\n\t// }\n\tCreate(Pet) Pet\n}\n",
        );
        let doc = match &file.ast.decls[0] {
            crate::ast::Decl::Interface(svc) => svc.methods[0].doc.clone(),
            decl => panic!("expected an interface, found {:?}", decl),
        };

        let resolved = resolve(Level::Method, "Create", &doc, &file).unwrap();
        assert_eq!(resolved.deps, vec![wkt::HTTP_FILE]);
        match resolved.options.get(wkt::HTTP_EXTENSION) {
            Some(Value::Message(rule)) => {
                assert_eq!(
                    rule.get(wkt::http_rule::POST),
                    Some(&Value::String("/v1/pets".to_owned()))
                );
                assert_eq!(
                    rule.get(wkt::http_rule::BODY),
                    Some(&Value::String("*".to_owned()))
                );
                assert_eq!(rule.get(wkt::http_rule::GET), None);
            }
            value => panic!("expected an http rule, found {:?}", value),
        }
    }

    #[test]
    fn http_match_defaults_to_get() {
        let file = source_file(
            "package pet\n\ntype Api interface {\n\t// +tusk http.Match{Path: \"/v1/pets\"}\n\tList() Pets\n}\n",
        );
        let doc = match &file.ast.decls[0] {
            crate::ast::Decl::Interface(svc) => svc.methods[0].doc.clone(),
            decl => panic!("expected an interface, found {:?}", decl),
        };

        let resolved = resolve(Level::Method, "List", &doc, &file).unwrap();
        match resolved.options.get(wkt::HTTP_EXTENSION) {
            Some(Value::Message(rule)) => {
                assert_eq!(
                    rule.get(wkt::http_rule::GET),
                    Some(&Value::String("/v1/pets".to_owned()))
                );
            }
            value => panic!("expected an http rule, found {:?}", value),
        }
    }

    #[test]
    fn wrong_level_is_rejected() {
        let file = source_file("// +tusk message.Deprecated(true)\npackage pet\n");
        let doc = file.ast.package.doc.clone();

        let err = resolve(Level::File, "pet", &doc, &file).unwrap_err();
        match err.kind() {
            ErrorKind::UnsupportedOption { decl, text, .. } => {
                assert_eq!(decl, "pet");
                assert_eq!(text, "message.Deprecated(true)");
            }
            kind => panic!("unexpected error: {:?}", kind),
        }
    }

    #[test]
    fn unknown_http_method_is_rejected() {
        let file = source_file(
            "package pet\n\ntype Api interface {\n\t// +tusk http.Match{Method: \"YEET\", Path: \"/v1/pets\"}\n\tList() Pets\n}\n",
        );
        let doc = match &file.ast.decls[0] {
            crate::ast::Decl::Interface(svc) => svc.methods[0].doc.clone(),
            decl => panic!("expected an interface, found {:?}", decl),
        };

        let err = resolve(Level::Method, "List", &doc, &file).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnsupportedOption { .. }));
    }
}
