//! Translation of loaded schema packages into descriptor files.

use std::collections::{BTreeSet, HashMap, HashSet};

use logos::Span;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::source_code_info::Location;
use prost_types::SourceCodeInfo;

use crate::annotations::{self, Level};
use crate::ast;
use crate::error::{Error, ErrorKind};
use crate::loader::{Loader, Package, SourceFile, TypeKind};
use crate::options::{OptionSet, Value};
use crate::types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, MethodDescriptorProto, ServiceDescriptorProto,
};
use crate::wkt;


// FileDescriptorProto field numbers used as source-code-info paths.
const PACKAGE_PATH: i32 = 2;
const MESSAGE_PATH: i32 = 4;
const ENUM_PATH: i32 = 5;
const SERVICE_PATH: i32 = 6;
// and within their parent descriptors
const FIELD_PATH: i32 = 2;
const ENUM_VALUE_PATH: i32 = 2;
const METHOD_PATH: i32 = 2;

/// FileOptions field carrying the source package name.
const NAMESPACE_OPTION: u32 = 11;

/// MessageOptions field marking a synthesized map entry.
const MAP_ENTRY_OPTION: u32 = 7;

/// Translates packages into descriptor files, memoized by import path.
/// Imports translate depth-first before their importers.
pub(crate) struct Translator<'a> {
    loader: &'a Loader,
    files: HashMap<String, FileDescriptorProto>,
}

impl<'a> Translator<'a> {
    pub fn new(loader: &'a Loader) -> Self {
        Translator {
            loader,
            files: HashMap::new(),
        }
    }

    pub fn translate_pkg(&mut self, import_path: &str) -> Result<(), Error> {
        if self.files.contains_key(import_path) {
            return Ok(());
        }

        let loader = self.loader;
        let pkg = match loader.get(import_path) {
            Some(pkg) => pkg,
            None => {
                return Err(Error::from_kind(ErrorKind::UnknownDescriptorDependency {
                    name: import_path.to_owned(),
                }))
            }
        };

        for dep in &pkg.deps {
            self.translate_pkg(dep)?;
        }

        let file = FileBuilder::new(loader, pkg).build()?;
        self.files.insert(import_path.to_owned(), file);
        Ok(())
    }

    pub fn into_files(self) -> HashMap<String, FileDescriptorProto> {
        self.files
    }
}

/// Build state for a single descriptor file.
struct FileBuilder<'a> {
    loader: &'a Loader,
    pkg: &'a Package,
    file: FileDescriptorProto,
    /// Descriptor file names this file depends on.
    deps: BTreeSet<String>,
    locations: Vec<Location>,
    enums: Vec<EnumBuilder>,
}

struct EnumBuilder {
    name: String,
    doc: Option<String>,
    options: OptionSet,
    values: Vec<EnumValueBuilder>,
}

struct EnumValueBuilder {
    name: String,
    number: i32,
    doc: Option<String>,
    options: OptionSet,
}

/// A resolved field type, including the synthesized entry message for maps.
struct FieldType {
    r#type: Type,
    type_name: Option<String>,
    label: Label,
    map_entry: Option<DescriptorProto>,
}

impl FieldType {
    fn singular(r#type: Type, type_name: Option<String>) -> Self {
        FieldType {
            r#type,
            type_name,
            label: Label::Optional,
            map_entry: None,
        }
    }
}

impl<'a> FileBuilder<'a> {
    fn new(loader: &'a Loader, pkg: &'a Package) -> Self {
        FileBuilder {
            loader,
            pkg,
            file: FileDescriptorProto {
                name: Some(pkg.descriptor_name()),
                package: Some(pkg.proto_name.clone()),
                syntax: Some("proto3".to_owned()),
                ..Default::default()
            },
            deps: BTreeSet::new(),
            locations: Vec::new(),
            enums: Vec::new(),
        }
    }

    fn build(mut self) -> Result<FileDescriptorProto, Error> {
        let pkg = self.pkg;

        let mut options = OptionSet::new();
        options.set(NAMESPACE_OPTION, Value::String(pkg.name.clone()));
        for file in &pkg.files {
            let resolved =
                annotations::resolve(Level::File, &pkg.name, &file.ast.package.doc, file)?;
            options.merge(resolved.options);
            self.register_deps(resolved.deps);
        }
        self.file.options = Some(options);

        for file in &pkg.files {
            if let Some(text) = file.ast.package.doc.text() {
                self.add_doc(vec![PACKAGE_PATH], text);
                break;
            }
        }

        for file in &pkg.files {
            for decl in &file.ast.decls {
                match decl {
                    ast::Decl::Struct(msg) => {
                        let index = self.file.message_type.len();
                        if let Some(text) = msg.doc.text() {
                            self.add_doc(vec![MESSAGE_PATH, index as i32], text);
                        }
                        let descriptor = self.convert_message(file, msg, index)?;
                        self.file.message_type.push(descriptor);
                    }
                    ast::Decl::Interface(svc) => {
                        let index = self.file.service.len();
                        if let Some(text) = svc.doc.text() {
                            self.add_doc(vec![SERVICE_PATH, index as i32], text);
                        }
                        let descriptor = self.convert_service(file, svc, index)?;
                        self.file.service.push(descriptor);
                    }
                    ast::Decl::Alias(alias) => {
                        let resolved = annotations::resolve(
                            Level::Enum,
                            &alias.name.value,
                            &alias.doc,
                            file,
                        )?;
                        self.register_deps(resolved.deps);
                        let doc = alias.doc.text();
                        let entry = self.enum_builder(&alias.name.value);
                        entry.doc = doc;
                        entry.options.merge(resolved.options);
                    }
                    ast::Decl::Consts(block) => self.convert_consts(file, block)?,
                }
            }
        }

        self.finish_enums();

        for dep in &pkg.deps {
            self.deps.insert(format!("{}/all.proto", dep));
        }
        self.file.dependency = self.deps.into_iter().collect();
        if !self.locations.is_empty() {
            self.file.source_code_info = Some(SourceCodeInfo {
                location: self.locations,
            });
        }
        Ok(self.file)
    }

    fn convert_message(
        &mut self,
        file: &SourceFile,
        msg: &ast::Struct,
        index: usize,
    ) -> Result<DescriptorProto, Error> {
        let resolved = annotations::resolve(Level::Message, &msg.name.value, &msg.doc, file)?;
        self.register_deps(resolved.deps);

        let mut descriptor = DescriptorProto {
            name: Some(msg.name.value.clone()),
            options: none_if_empty(resolved.options),
            ..Default::default()
        };

        let mut numbers = HashSet::new();
        for (i, field) in msg.fields.iter().enumerate() {
            if let Some(text) = field.doc.text() {
                self.add_doc(
                    vec![MESSAGE_PATH, index as i32, FIELD_PATH, i as i32],
                    text,
                );
            }
            let field_resolved =
                annotations::resolve(Level::Field, &field.name.value, &field.doc, file)?;
            self.register_deps(field_resolved.deps);

            let number = field_number(file, field)?;
            if !numbers.insert(number) {
                return Err(Error::from_kind(ErrorKind::DuplicateFieldNumber {
                    message: msg.name.value.clone(),
                    number,
                    src: file.named_source().into(),
                    span: field.span.clone().into(),
                }));
            }

            let ty = self.resolve_field_type(file, field, &msg.name.value)?;
            if let Some(entry) = ty.map_entry {
                descriptor.nested_type.push(entry);
            }

            descriptor.field.push(FieldDescriptorProto {
                name: Some(field.name.value.clone()),
                number: Some(number),
                label: Some(ty.label as i32),
                r#type: Some(ty.r#type as i32),
                type_name: ty.type_name,
                json_name: field
                    .tag
                    .as_ref()
                    .and_then(|tag| tag.get("json"))
                    .map(str::to_owned),
                options: none_if_empty(field_resolved.options),
                ..Default::default()
            });
        }
        Ok(descriptor)
    }

    fn convert_service(
        &mut self,
        file: &SourceFile,
        svc: &ast::Interface,
        index: usize,
    ) -> Result<ServiceDescriptorProto, Error> {
        let resolved = annotations::resolve(Level::Service, &svc.name.value, &svc.doc, file)?;
        self.register_deps(resolved.deps);

        let mut descriptor = ServiceDescriptorProto {
            name: Some(svc.name.value.clone()),
            options: none_if_empty(resolved.options),
            ..Default::default()
        };

        for (i, method) in svc.methods.iter().enumerate() {
            if let Some(text) = method.doc.text() {
                self.add_doc(
                    vec![SERVICE_PATH, index as i32, METHOD_PATH, i as i32],
                    text,
                );
            }
            let method_resolved =
                annotations::resolve(Level::Method, &method.name.value, &method.doc, file)?;
            self.register_deps(method_resolved.deps);

            let (input_type, client_streaming) =
                self.convert_parameter(file, method, &method.inputs, "parameter")?;
            let (output_type, server_streaming) =
                self.convert_parameter(file, method, &method.outputs, "result")?;

            descriptor.method.push(MethodDescriptorProto {
                name: Some(method.name.value.clone()),
                input_type: Some(input_type),
                output_type: Some(output_type),
                options: none_if_empty(method_resolved.options),
                client_streaming: if client_streaming { Some(true) } else { None },
                server_streaming: if server_streaming { Some(true) } else { None },
            });
        }
        Ok(descriptor)
    }

    /// Resolves a method parameter or result list to a message type name and
    /// a streaming flag. An empty list becomes the well-known empty message.
    fn convert_parameter(
        &mut self,
        file: &SourceFile,
        method: &ast::Method,
        types: &[(ast::Ty, Span)],
        dir: &'static str,
    ) -> Result<(String, bool), Error> {
        let (ty, span) = match types {
            [] => {
                self.deps.insert(wkt::EMPTY_FILE.to_owned());
                return Ok((wkt::EMPTY_TYPE.to_owned(), false));
            }
            [ty] => ty,
            [_, (_, span), ..] => {
                return Err(Error::from_kind(ErrorKind::TooManyParameters {
                    method: method.name.value.clone(),
                    dir,
                    src: file.named_source().into(),
                    span: span.clone().into(),
                }))
            }
        };

        let (ty, streaming) = match ty {
            ast::Ty::Chan(inner) => (&**inner, true),
            ty => (ty, false),
        };
        let name = match ty {
            ast::Ty::Named(name) => name,
            _ => return Err(self.unsupported(file, &method.name.value, span)),
        };

        match self.resolve_named(file, name, span, &method.name.value)? {
            (Type::Message, Some(type_name)) => Ok((type_name, streaming)),
            _ => Err(self.unsupported(file, &method.name.value, span)),
        }
    }

    fn convert_consts(&mut self, file: &SourceFile, block: &ast::ConstBlock) -> Result<(), Error> {
        let pkg = self.pkg;
        let mut inherited: Option<(Option<String>, ast::ConstValue)> = None;

        for (iota, spec) in block.specs.iter().enumerate() {
            let (ty, value) = match (&spec.ty, &spec.value) {
                (ty @ Some(_), Some(value)) => {
                    (ty.as_ref().map(|t| t.value.clone()), value.clone())
                }
                (None, Some(value)) => (None, value.clone()),
                (None, None) => match &inherited {
                    Some((ty, value)) => (ty.clone(), value.clone()),
                    None => {
                        return Err(self.unsupported(file, &spec.name.value, &spec.span));
                    }
                },
                (Some(_), None) => {
                    return Err(self.unsupported(file, &spec.name.value, &spec.span));
                }
            };
            inherited = Some((ty.clone(), value.clone()));

            let number = match value {
                ast::ConstValue::Iota(_) => iota as i32,
                ast::ConstValue::Int(int) => match i32::try_from(int.value) {
                    Ok(number) => number,
                    Err(_) => {
                        return Err(self.unsupported(file, &spec.name.value, &int.span));
                    }
                },
            };

            // Constants that are not typed as a declared enum are plain
            // constants and translate to nothing.
            let ty = match ty {
                Some(ty) => ty,
                None => continue,
            };
            if pkg.symbols.get(&ty) != Some(&TypeKind::Enum) {
                continue;
            }

            let resolved =
                annotations::resolve(Level::EnumValue, &spec.name.value, &spec.doc, file)?;
            self.register_deps(resolved.deps);

            let name = strip_enum_prefix(&ty, &spec.name.value);
            let doc = spec.doc.text();
            let entry = self.enum_builder(&ty);
            entry.values.push(EnumValueBuilder {
                name,
                number,
                doc,
                options: resolved.options,
            });
        }
        Ok(())
    }

    /// Emits the collected enums in first-appearance order, dropping any
    /// that ended up with no values.
    fn finish_enums(&mut self) {
        let enums = std::mem::take(&mut self.enums);
        for entry in enums {
            if entry.values.is_empty() {
                continue;
            }

            let index = self.file.enum_type.len() as i32;
            if let Some(text) = entry.doc {
                self.add_doc(vec![ENUM_PATH, index], text);
            }

            let mut descriptor = EnumDescriptorProto {
                name: Some(entry.name.clone()),
                options: none_if_empty(entry.options),
                ..Default::default()
            };
            for (j, value) in entry.values.into_iter().enumerate() {
                if let Some(text) = value.doc {
                    // values are exported as EnumName_ValueName downstream
                    self.add_doc(
                        vec![ENUM_PATH, index, ENUM_VALUE_PATH, j as i32],
                        format!("{}_{}", entry.name, text),
                    );
                }
                descriptor.value.push(EnumValueDescriptorProto {
                    name: Some(value.name),
                    number: Some(value.number),
                    options: none_if_empty(value.options),
                });
            }
            self.file.enum_type.push(descriptor);
        }
    }

    fn resolve_field_type(
        &mut self,
        file: &SourceFile,
        field: &ast::Field,
        msg_name: &str,
    ) -> Result<FieldType, Error> {
        let decl = &field.name.value;
        let span = &field.ty_span;
        match &field.ty {
            ast::Ty::Named(name) => {
                let (r#type, type_name) = self.resolve_named(file, name, span, decl)?;
                Ok(FieldType::singular(r#type, type_name))
            }
            ast::Ty::List(elem) => match &**elem {
                ast::Ty::Named(name) if name.qualifier.is_none() && name.name.value == "byte" => {
                    Ok(FieldType::singular(Type::Bytes, None))
                }
                ast::Ty::Named(name) => {
                    let (r#type, type_name) = self.resolve_named(file, name, span, decl)?;
                    Ok(FieldType {
                        r#type,
                        type_name,
                        label: Label::Repeated,
                        map_entry: None,
                    })
                }
                _ => Err(self.unsupported(file, decl, span)),
            },
            ast::Ty::Map { key, value } => {
                let key = match &**key {
                    ast::Ty::Named(name) => {
                        let (r#type, _) = self.resolve_named(file, name, span, decl)?;
                        if !valid_map_key(r#type) {
                            return Err(self.unsupported(file, decl, span));
                        }
                        r#type
                    }
                    _ => return Err(self.unsupported(file, decl, span)),
                };
                let (value_type, value_type_name) = match &**value {
                    ast::Ty::Named(name) => self.resolve_named(file, name, span, decl)?,
                    _ => return Err(self.unsupported(file, decl, span)),
                };

                let entry_name = format!("{}Entry", upper_first(decl));
                let mut map_entry_options = OptionSet::new();
                map_entry_options.set(MAP_ENTRY_OPTION, Value::Bool(true));
                let entry = DescriptorProto {
                    name: Some(entry_name.clone()),
                    field: vec![
                        FieldDescriptorProto {
                            name: Some("key".to_owned()),
                            number: Some(1),
                            label: Some(Label::Optional as i32),
                            r#type: Some(key as i32),
                            ..Default::default()
                        },
                        FieldDescriptorProto {
                            name: Some("value".to_owned()),
                            number: Some(2),
                            label: Some(Label::Optional as i32),
                            r#type: Some(value_type as i32),
                            type_name: value_type_name,
                            ..Default::default()
                        },
                    ],
                    options: Some(map_entry_options),
                    ..Default::default()
                };

                Ok(FieldType {
                    r#type: Type::Message,
                    type_name: Some(format!(
                        ".{}.{}.{}",
                        self.pkg.proto_name, msg_name, entry_name
                    )),
                    label: Label::Repeated,
                    map_entry: Some(entry),
                })
            }
            ast::Ty::Chan(_) => Err(self.unsupported(file, decl, span)),
        }
    }

    /// Resolves a possibly qualified type name to a descriptor type and
    /// cross-reference name, registering implicit dependencies.
    fn resolve_named(
        &mut self,
        file: &SourceFile,
        name: &ast::TypeName,
        span: &Span,
        decl: &str,
    ) -> Result<(Type, Option<String>), Error> {
        let pkg = self.pkg;
        match &name.qualifier {
            None => {
                if let Some(scalar) = scalar_type(&name.name.value) {
                    return Ok((scalar, None));
                }
                match pkg.symbols.get(&name.name.value) {
                    Some(TypeKind::Message) => Ok((
                        Type::Message,
                        Some(format!(".{}.{}", pkg.proto_name, name.name.value)),
                    )),
                    Some(TypeKind::Enum) => Ok((
                        Type::Enum,
                        Some(format!(".{}.{}", pkg.proto_name, name.name.value)),
                    )),
                    None => Err(self.unsupported(file, decl, span)),
                }
            }
            Some(qualifier) => {
                let path = match pkg.resolve_qualifier(file, &qualifier.value) {
                    Some(path) => path.to_owned(),
                    None => return Err(self.unsupported(file, decl, span)),
                };
                if path == "time" {
                    return match name.name.value.as_str() {
                        "Time" => {
                            self.deps.insert(wkt::TIMESTAMP_FILE.to_owned());
                            Ok((Type::Message, Some(wkt::TIMESTAMP_TYPE.to_owned())))
                        }
                        "Duration" => {
                            self.deps.insert(wkt::DURATION_FILE.to_owned());
                            Ok((Type::Message, Some(wkt::DURATION_TYPE.to_owned())))
                        }
                        _ => Err(self.unsupported(file, decl, span)),
                    };
                }

                let target = match self.loader.get(&path) {
                    Some(target) => target,
                    None => return Err(self.unsupported(file, decl, span)),
                };
                match target.symbols.get(&name.name.value) {
                    Some(TypeKind::Message) => Ok((
                        Type::Message,
                        Some(format!(".{}.{}", target.proto_name, name.name.value)),
                    )),
                    Some(TypeKind::Enum) => Ok((
                        Type::Enum,
                        Some(format!(".{}.{}", target.proto_name, name.name.value)),
                    )),
                    None => Err(self.unsupported(file, decl, span)),
                }
            }
        }
    }

    fn enum_builder(&mut self, name: &str) -> &mut EnumBuilder {
        match self.enums.iter().position(|entry| entry.name == name) {
            Some(index) => &mut self.enums[index],
            None => {
                self.enums.push(EnumBuilder {
                    name: name.to_owned(),
                    doc: None,
                    options: OptionSet::new(),
                    values: Vec::new(),
                });
                let index = self.enums.len() - 1;
                &mut self.enums[index]
            }
        }
    }

    fn register_deps(&mut self, deps: Vec<&'static str>) {
        for dep in deps {
            self.deps.insert(dep.to_owned());
        }
    }

    fn add_doc(&mut self, path: Vec<i32>, text: String) {
        self.locations.push(Location {
            path,
            leading_comments: Some(text),
            ..Default::default()
        });
    }

    fn unsupported(&self, file: &SourceFile, decl: &str, span: &Span) -> Error {
        Error::from_kind(ErrorKind::UnsupportedType {
            decl: decl.to_owned(),
            src: file.named_source().into(),
            span: span.clone().into(),
        })
    }
}

fn field_number(file: &SourceFile, field: &ast::Field) -> Result<i32, Error> {
    let number = field
        .tag
        .as_ref()
        .and_then(|tag| tag.get("pb"))
        .and_then(|value| value.parse::<i32>().ok());
    match number {
        Some(number) if number > 0 => Ok(number),
        _ => Err(Error::from_kind(ErrorKind::MissingFieldNumber {
            field: field.name.value.clone(),
            src: file.named_source().into(),
            span: field.span.clone().into(),
        })),
    }
}

fn scalar_type(name: &str) -> Option<Type> {
    match name {
        "string" => Some(Type::String),
        "bool" => Some(Type::Bool),
        "int" | "int32" => Some(Type::Int32),
        "int64" => Some(Type::Int64),
        "uint32" => Some(Type::Uint32),
        "uint64" => Some(Type::Uint64),
        "float32" => Some(Type::Float),
        "float64" => Some(Type::Double),
        _ => None,
    }
}

fn valid_map_key(r#type: Type) -> bool {
    matches!(
        r#type,
        Type::Int32 | Type::Int64 | Type::Uint32 | Type::Uint64 | Type::Bool | Type::String
    )
}

/// Strips the enum's name (and an optional separating underscore) from a
/// value name, keeping the original when nothing useful would remain.
fn strip_enum_prefix(enum_name: &str, value_name: &str) -> String {
    match value_name.strip_prefix(enum_name) {
        Some(rest) => {
            let rest = rest.strip_prefix('_').unwrap_or(rest);
            if rest.is_empty() {
                value_name.to_owned()
            } else {
                rest.to_owned()
            }
        }
        None => value_name.to_owned(),
    }
}

fn upper_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn none_if_empty(options: OptionSet) -> Option<OptionSet> {
    if options.is_empty() {
        None
    } else {
        Some(options)
    }
}
