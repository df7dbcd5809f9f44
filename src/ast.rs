use std::fmt;

use logos::Span;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct File {
    pub package: Package,
    pub imports: Vec<Import>,
    pub decls: Vec<Decl>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Package {
    pub name: Ident,
    pub doc: Doc,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Import {
    /// Explicit alias, if any. `_` imports parse to `blank: true` with no alias.
    pub alias: Option<Ident>,
    pub blank: bool,
    pub path: String,
    pub path_span: Span,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Decl {
    Struct(Struct),
    Interface(Interface),
    Alias(Alias),
    Consts(ConstBlock),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Struct {
    pub name: Ident,
    pub fields: Vec<Field>,
    pub doc: Doc,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Field {
    pub name: Ident,
    pub ty: Ty,
    pub ty_span: Span,
    pub tag: Option<Tag>,
    pub doc: Doc,
    pub span: Span,
}

/// A backtick-quoted side-channel tag, e.g. `` `pb:"1" json:"name"` ``.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Tag {
    pub raw: String,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Ty {
    Named(TypeName),
    List(Box<Ty>),
    Map { key: Box<Ty>, value: Box<Ty> },
    Chan(Box<Ty>),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TypeName {
    pub qualifier: Option<Ident>,
    pub name: Ident,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Interface {
    pub name: Ident,
    pub methods: Vec<Method>,
    pub doc: Doc,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Method {
    pub name: Ident,
    pub inputs: Vec<(Ty, Span)>,
    pub outputs: Vec<(Ty, Span)>,
    pub doc: Doc,
    pub span: Span,
}

/// `type Status int`, the declaration half of an enum.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Alias {
    pub name: Ident,
    pub base: Ident,
    pub doc: Doc,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ConstBlock {
    pub specs: Vec<ConstSpec>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ConstSpec {
    pub name: Ident,
    pub ty: Option<Ident>,
    pub value: Option<ConstValue>,
    pub doc: Doc,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ConstValue {
    Iota(Span),
    Int(Int),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Int {
    pub value: u64,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Ident {
    pub value: String,
    pub span: Span,
}

/// The leading comment block attached to a declaration, one entry per line
/// with the `//` markers stripped.
#[derive(Clone, Default, Debug, PartialEq)]
pub(crate) struct Doc {
    pub lines: Vec<DocLine>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DocLine {
    pub text: String,
    pub span: Span,
}

/// One `+tusk` annotation expression split out of a [`Doc`], covering the
/// marker line and any continuation lines up to the next marker.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Annotation {
    pub text: String,
    pub span: Span,
}

const ANNOTATION_MARKER: &str = "+tusk ";

impl Doc {
    /// The documentation text with annotation lines removed, or `None` if
    /// nothing but annotations (or nothing at all) was written.
    pub fn text(&self) -> Option<String> {
        let mut text = String::new();
        for line in &self.lines {
            if line.text.trim_start().starts_with(ANNOTATION_MARKER) {
                break;
            }
            text.push_str(line.text.trim());
            text.push('\n');
        }
        let text = text.trim().to_owned();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Splits out the `+tusk` annotation expressions. Each marker line starts
    /// a new annotation; following lines are folded into it.
    pub fn annotations(&self) -> Vec<Annotation> {
        let mut annotations: Vec<Annotation> = Vec::new();
        for line in &self.lines {
            let trimmed = line.text.trim_start();
            if let Some(rest) = trimmed.strip_prefix(ANNOTATION_MARKER) {
                annotations.push(Annotation {
                    text: rest.trim().to_owned(),
                    span: line.span.clone(),
                });
            } else if let Some(current) = annotations.last_mut() {
                current.text.push(' ');
                current.text.push_str(trimmed.trim());
                current.span.end = line.span.end;
            }
        }
        annotations
    }
}

impl Ident {
    pub fn new(value: impl Into<String>, span: Span) -> Self {
        Ident {
            value: value.into(),
            span,
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{}.{}", qualifier, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Named(name) => write!(f, "{}", name),
            Ty::List(elem) => write!(f, "[]{}", elem),
            Ty::Map { key, value } => write!(f, "map[{}]{}", key, value),
            Ty::Chan(elem) => write!(f, "chan {}", elem),
        }
    }
}

impl Tag {
    /// Looks up the value of a `key:"value"` pair, reflect.StructTag style.
    pub fn get(&self, key: &str) -> Option<&str> {
        let mut rest = self.raw.as_str();
        while let Some(colon) = rest.find(':') {
            let name = rest[..colon].trim();
            let after = &rest[colon + 1..];
            let after = after.strip_prefix('"')?;
            let end = after.find('"')?;
            let value = &after[..end];
            if name == key {
                return Some(value);
            }
            rest = &after[end + 1..];
        }
        None
    }
}
