use crate::location::Loc;
use std::fmt;
use thiserror::Error;

/// What kind of rule a positioned diagnostic violated. Not shown to the
/// user; tests and the driver dispatch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Syntax,
    Name,
    Type,
    NotImplemented,
}

/// A positioned compile error. Every diagnostic carries a real source
/// location; a placeholder location is a bug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub file: String,
    pub loc: Loc,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        file: impl Into<String>,
        loc: Loc,
        message: impl Into<String>,
    ) -> Diagnostic {
        Diagnostic {
            kind,
            file: file.into(),
            loc,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.loc, self.message)
    }
}

fn join_lines(diags: &[Diagnostic]) -> String {
    diags
        .iter()
        .map(Diagnostic::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// The driver-level error type. Source errors aggregate every diagnostic the
/// front-end phases produced; the other variants fail the pipeline fast.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Toolchain(String),
    #[error("{}", join_lines(.0))]
    Source(Vec<Diagnostic>),
}

impl CompileError {
    /// Sorts diagnostics by source position so they are reported in source
    /// order, then wraps them.
    pub fn from_diagnostics(mut diags: Vec<Diagnostic>) -> CompileError {
        diags.sort_by_key(|d| d.loc);
        CompileError::Source(diags)
    }
}
