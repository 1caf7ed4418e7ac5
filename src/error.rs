//! Crate-wide error type. Contract errors (bad caller input) use this;
//! content issues found while analyzing an otherwise-well-formed patch never
//! raise an `Error` and instead accumulate in [`crate::validator::ValidationResult`].

use std::fmt;

/// The class of failure, matching the enumeration callers switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("parse error")]
    ParseError,
    #[error("validation error")]
    ValidationError,
    #[error("unknown template")]
    UnknownTemplate,
    #[error("invalid parameter")]
    InvalidParam,
    #[error("unknown port")]
    UnknownPort,
    #[error("unknown module")]
    UnknownModule,
    #[error("duplicate mapping")]
    DuplicateMapping,
    #[error("file I/O error")]
    FileIO,
}

/// `Error { kind, message, context }` as specified in §6.4.
#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub context: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn parse(message: impl Into<String>, approx_line: usize) -> Self {
        Self::new(ErrorKind::ParseError, message).with_context(format!("line {approx_line}"))
    }

    /// Prefix a module-indexed context onto an existing error, per §7's
    /// `"Error in module N (\"template\"): …"` composer failure format.
    pub fn in_module(mut self, index: usize, template: &str) -> Self {
        let prefix = format!("module {index} (\"{template}\")");
        self.context = Some(match self.context.take() {
            Some(existing) => format!("{prefix}: {existing}"),
            None => prefix,
        });
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(ctx) => write!(f, "Error in {ctx}: {}", self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
