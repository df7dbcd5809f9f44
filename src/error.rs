use std::{fmt, io, path::PathBuf};

use miette::{Diagnostic, NamedSource, SourceCode, SourceSpan};
use thiserror::Error;

use crate::parse::ParseError;

/// An error that can occur when compiling or generating tusk schema packages.
#[derive(Debug, Diagnostic, Error)]
#[error(transparent)]
#[diagnostic(transparent)]
pub struct Error {
    kind: Box<ErrorKind>,
}

#[derive(Debug, Diagnostic, Error)]
pub(crate) enum ErrorKind {
    #[error("{}", err)]
    #[diagnostic(forward(err))]
    ParseErrors {
        err: ParseError,
        #[source_code]
        src: DynSourceCode,
        #[related]
        errors: Vec<ParseError>,
    },
    #[error("no schema files found matching pattern '{pattern}'")]
    NoSchemaFiles { pattern: String },
    #[error("error opening file '{path}'")]
    OpenFile {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("error writing file '{path}'")]
    WriteFile {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("import '{path}' does not resolve to a schema package")]
    ImportNotFound {
        path: String,
        #[source_code]
        src: DynSourceCode,
        #[label("imported here")]
        span: SourceSpan,
    },
    #[error("package '{path}' declares conflicting package names '{first}' and '{second}'")]
    PackageNameMismatch {
        path: String,
        first: String,
        second: String,
        #[source_code]
        src: DynSourceCode,
        #[label("declared here")]
        span: SourceSpan,
    },
    #[error("unsupported option '{text}' on '{decl}'")]
    UnsupportedOption {
        decl: String,
        text: String,
        #[source_code]
        src: DynSourceCode,
        #[label("option declared here")]
        span: SourceSpan,
    },
    #[error("missing field number tag on field '{field}'")]
    #[help("add a side-channel tag such as `pb:\"1\"` to assign the field number")]
    MissingFieldNumber {
        field: String,
        #[source_code]
        src: DynSourceCode,
        #[label("field declared here")]
        span: SourceSpan,
    },
    #[error("field number {number} is used more than once in message '{message}'")]
    DuplicateFieldNumber {
        message: String,
        number: i32,
        #[source_code]
        src: DynSourceCode,
        #[label("number reused here")]
        span: SourceSpan,
    },
    #[error("method '{method}' has more than one {dir}")]
    TooManyParameters {
        method: String,
        dir: &'static str,
        #[source_code]
        src: DynSourceCode,
        #[label("declared here")]
        span: SourceSpan,
    },
    #[error("unsupported type for '{decl}'")]
    UnsupportedType {
        decl: String,
        #[source_code]
        src: DynSourceCode,
        #[label("type used here")]
        span: SourceSpan,
    },
    #[error("dependency cycle detected between descriptor files: {files}")]
    DependencyCycle { files: String },
    #[error("descriptor dependency '{name}' could not be loaded")]
    UnknownDescriptorDependency { name: String },
    #[error("error executing '{command}'")]
    GeneratorExecution {
        command: String,
        #[source]
        err: io::Error,
    },
    #[error("generator '{command}' exited with status {status}: {stderr}")]
    GeneratorFailed {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("generator '{command}' reported an error: {message}")]
    GeneratorReported { command: String, message: String },
    #[error("generator '{command}' did not finish within {seconds} seconds")]
    GeneratorTimeout { command: String, seconds: u64 },
    #[error("invalid response from generator '{command}': {err}")]
    GeneratorResponse {
        command: String,
        #[source]
        err: prost::DecodeError,
    },
    #[error("generator returned unsafe output file name '{name}'")]
    UnsafeOutputName { name: String },
    #[error("no .tuskconfig found for directory '{dir}'")]
    ConfigNotFound { dir: PathBuf },
    #[error("error in '{path}': {message}")]
    Config { path: PathBuf, message: String },
}

pub(crate) struct DynSourceCode(Box<dyn SourceCode>);

impl fmt::Debug for DynSourceCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DynSourceCode").finish_non_exhaustive()
    }
}

impl SourceCode for DynSourceCode {
    fn read_span<'a>(
        &'a self,
        span: &SourceSpan,
        context_lines_before: usize,
        context_lines_after: usize,
    ) -> Result<Box<dyn miette::SpanContents<'a> + 'a>, miette::MietteError> {
        self.0
            .read_span(span, context_lines_before, context_lines_after)
    }
}

impl From<String> for DynSourceCode {
    fn from(source: String) -> Self {
        DynSourceCode(Box::new(source))
    }
}

impl From<NamedSource> for DynSourceCode {
    fn from(source: NamedSource) -> Self {
        DynSourceCode(Box::new(source))
    }
}

impl Error {
    pub(crate) fn from_kind(kind: ErrorKind) -> Self {
        Error {
            kind: Box::new(kind),
        }
    }

    #[cfg(test)]
    pub(crate) fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub(crate) fn parse_errors(mut errors: Vec<ParseError>, src: impl Into<DynSourceCode>) -> Self {
        let err = errors.remove(0);
        Error::from_kind(ErrorKind::ParseErrors {
            err,
            src: src.into(),
            errors,
        })
    }

    /// Returns true if the error was produced by a code generator subprocess,
    /// rather than by translation itself.
    pub fn is_generator_error(&self) -> bool {
        matches!(
            &*self.kind,
            ErrorKind::GeneratorExecution { .. }
                | ErrorKind::GeneratorFailed { .. }
                | ErrorKind::GeneratorReported { .. }
                | ErrorKind::GeneratorTimeout { .. }
                | ErrorKind::GeneratorResponse { .. }
        )
    }
}
