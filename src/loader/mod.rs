//! Discovery and parsing of schema packages.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use miette::NamedSource;

use crate::ast;
use crate::error::{Error, ErrorKind};
use crate::parse;


const SCHEMA_EXTENSION: &str = "tusk";

const RECURSIVE_SUFFIX: &str = "...";

/// Import paths satisfied by the compiler itself rather than a schema
/// package on disk.
const BUILTIN_IMPORTS: &[&str] = &["time"];

/// Loads schema packages from a directory tree, memoized by import path.
pub(crate) struct Loader {
    root: PathBuf,
    packages: HashMap<String, Package>,
}

#[derive(Debug)]
pub(crate) struct Package {
    /// The name from the package clause.
    pub name: String,
    /// The package directory relative to the loader root, `/`-separated.
    pub import_path: String,
    /// The namespace used in descriptors, derived from the import path.
    pub proto_name: String,
    pub dir: PathBuf,
    /// Schema files in sorted file name order.
    pub files: Vec<SourceFile>,
    pub symbols: BTreeMap<String, TypeKind>,
    /// Unique non-blank schema imports across all files, sorted.
    pub deps: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct SourceFile {
    pub path: PathBuf,
    pub source: Arc<str>,
    pub ast: ast::File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeKind {
    Message,
    Enum,
}

impl Loader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Loader {
            root: root.into(),
            packages: HashMap::new(),
        }
    }

    /// Resolves the given patterns and loads every matched package along with
    /// its transitive imports. Returns the matched import paths, sorted.
    pub fn load(&mut self, patterns: &[String]) -> Result<Vec<String>, Error> {
        let default = [format!("./{}", RECURSIVE_SUFFIX)];
        let patterns = if patterns.is_empty() {
            &default[..]
        } else {
            patterns
        };

        let mut matched = Vec::new();
        for pattern in patterns {
            matched.extend(self.resolve_pattern(pattern)?);
        }
        matched.sort();
        matched.dedup();

        for import_path in &matched {
            self.load_package(import_path)?;
        }
        Ok(matched)
    }

    pub fn get(&self, import_path: &str) -> Option<&Package> {
        self.packages.get(import_path)
    }

    fn resolve_pattern(&self, pattern: &str) -> Result<Vec<String>, Error> {
        let norm = pattern.strip_prefix("./").unwrap_or(pattern);

        let (base, recursive) = match norm.strip_suffix(RECURSIVE_SUFFIX) {
            Some(prefix) => (prefix.trim_end_matches('/'), true),
            None => (norm.trim_end_matches('/'), false),
        };

        if !recursive {
            // the root itself is never a package; its import path would
            // be empty
            if base.is_empty() || base == "." {
                return Err(Error::from_kind(ErrorKind::NoSchemaFiles {
                    pattern: pattern.to_owned(),
                }));
            }
            if has_schema_files(&self.root.join(base)) {
                return Ok(vec![base.to_owned()]);
            }
            return Err(Error::from_kind(ErrorKind::NoSchemaFiles {
                pattern: pattern.to_owned(),
            }));
        }

        let mut matched = Vec::new();
        walk_schema_dirs(&self.root.join(base), base, &mut matched)?;
        if matched.is_empty() {
            return Err(Error::from_kind(ErrorKind::NoSchemaFiles {
                pattern: pattern.to_owned(),
            }));
        }
        Ok(matched)
    }

    fn load_package(&mut self, import_path: &str) -> Result<(), Error> {
        if self.packages.contains_key(import_path) {
            return Ok(());
        }

        let dir = self.root.join(import_path);
        let mut files = Vec::new();
        for path in schema_files(&dir)? {
            files.push(parse_file(path)?);
        }

        let mut name: Option<(String, &SourceFile)> = None;
        for file in &files {
            match &name {
                None => name = Some((file.ast.package.name.value.clone(), file)),
                Some((first, _)) if *first != file.ast.package.name.value => {
                    return Err(Error::from_kind(ErrorKind::PackageNameMismatch {
                        path: import_path.to_owned(),
                        first: first.clone(),
                        second: file.ast.package.name.value.clone(),
                        src: file.named_source().into(),
                        span: file.ast.package.name.span.clone().into(),
                    }));
                }
                Some(_) => {}
            }
        }
        let name = match name {
            Some((name, _)) => name,
            None => {
                return Err(Error::from_kind(ErrorKind::NoSchemaFiles {
                    pattern: import_path.to_owned(),
                }))
            }
        };

        let mut symbols = BTreeMap::new();
        for file in &files {
            for decl in &file.ast.decls {
                match decl {
                    ast::Decl::Struct(msg) => {
                        symbols.insert(msg.name.value.clone(), TypeKind::Message);
                    }
                    ast::Decl::Alias(alias) => {
                        if alias.base.value != "int" {
                            return Err(Error::from_kind(ErrorKind::UnsupportedType {
                                decl: alias.name.value.clone(),
                                src: file.named_source().into(),
                                span: alias.base.span.clone().into(),
                            }));
                        }
                        symbols.insert(alias.name.value.clone(), TypeKind::Enum);
                    }
                    ast::Decl::Interface(_) | ast::Decl::Consts(_) => {}
                }
            }
        }

        let mut deps = Vec::new();
        for file in &files {
            for import in &file.ast.imports {
                if !import.blank && !is_builtin_import(&import.path) {
                    deps.push(import.path.clone());
                }
            }
        }
        deps.sort();
        deps.dedup();

        // Imports to check and recurse into, gathered up front so the
        // package can be registered before loading them. Registration first
        // keeps import cycles from recursing forever; the descriptor
        // dependency sort rejects them later.
        let mut imports = Vec::new();
        for file in &files {
            for import in &file.ast.imports {
                if !is_builtin_import(&import.path) {
                    imports.push((
                        import.path.clone(),
                        import.path_span.clone(),
                        file.named_source(),
                    ));
                }
            }
        }

        self.packages.insert(
            import_path.to_owned(),
            Package {
                name,
                import_path: import_path.to_owned(),
                proto_name: proto_name(import_path),
                dir,
                files,
                symbols,
                deps,
            },
        );

        for (path, span, src) in imports {
            if !has_schema_files(&self.root.join(&path)) {
                return Err(Error::from_kind(ErrorKind::ImportNotFound {
                    path,
                    src: src.into(),
                    span: span.into(),
                }));
            }
            self.load_package(&path)?;
        }

        Ok(())
    }
}

impl Package {
    /// The name of the descriptor file this package translates to.
    pub fn descriptor_name(&self) -> String {
        format!("{}/all.proto", self.import_path)
    }

    /// Resolves a type qualifier against a file's imports, returning the
    /// imported path. Blank imports never bind a qualifier.
    pub fn resolve_qualifier<'a>(
        &'a self,
        file: &'a SourceFile,
        qualifier: &str,
    ) -> Option<&'a str> {
        for import in &file.ast.imports {
            if import.blank {
                continue;
            }
            let bound = match &import.alias {
                Some(alias) => alias.value.as_str(),
                None => import.path.rsplit('/').next().unwrap_or(&import.path),
            };
            if bound == qualifier {
                return Some(&import.path);
            }
        }
        None
    }
}

impl SourceFile {
    pub fn named_source(&self) -> NamedSource {
        NamedSource::new(self.path.display().to_string(), self.source.to_string())
    }
}

fn is_builtin_import(path: &str) -> bool {
    BUILTIN_IMPORTS.contains(&path)
}

/// Derives a descriptor namespace from an import path: `/` becomes `.` and
/// anything that is not valid in an identifier becomes `_`.
fn proto_name(import_path: &str) -> String {
    import_path
        .chars()
        .map(|ch| match ch {
            '/' => '.',
            ch if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' => ch,
            _ => '_',
        })
        .collect()
}

fn parse_file(path: PathBuf) -> Result<SourceFile, Error> {
    let source = fs::read_to_string(&path).map_err(|err| {
        Error::from_kind(ErrorKind::OpenFile {
            path: path.clone(),
            err,
        })
    })?;
    let source: Arc<str> = source.into();

    match parse::parse(&source) {
        Ok(ast) => Ok(SourceFile { path, source, ast }),
        Err(errors) => {
            let src = NamedSource::new(path.display().to_string(), source.to_string());
            Err(Error::parse_errors(errors, src))
        }
    }
}

fn schema_files(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let entries = fs::read_dir(dir).map_err(|err| {
        Error::from_kind(ErrorKind::OpenFile {
            path: dir.to_owned(),
            err,
        })
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| {
            Error::from_kind(ErrorKind::OpenFile {
                path: dir.to_owned(),
                err,
            })
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == SCHEMA_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn has_schema_files(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(entries) => entries.flatten().any(|entry| {
            let path = entry.path();
            path.is_file() && path.extension().map_or(false, |ext| ext == SCHEMA_EXTENSION)
        }),
        Err(_) => false,
    }
}

fn walk_schema_dirs(dir: &Path, rel: &str, matched: &mut Vec<String>) -> Result<(), Error> {
    if !rel.is_empty() && has_schema_files(dir) {
        matched.push(rel.to_owned());
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() && !name.starts_with('.') {
            subdirs.push((name, path));
        }
    }
    subdirs.sort();

    for (name, path) in subdirs {
        let child_rel = if rel.is_empty() {
            name
        } else {
            format!("{}/{}", rel, name)
        };
        walk_schema_dirs(&path, &child_rel, matched)?;
    }
    Ok(())
}
