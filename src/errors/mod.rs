//! Error taxonomy for the composition engine
//!
//! Every failure is an [`Error`] carrying an [`ErrorKind`]. Kinds map to
//! message templates through a single table, so a new kind only needs a code
//! and a template. Errors capture a call trace at creation and keep a
//! de-noised copy with engine frames and registered stack-cleaner matches
//! removed.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, Error>;

/// Title shared by every error of this crate, reported by [`Error::family`].
pub const BASE_ERROR_FAMILY: &str = "base of : progeny : errors";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NamespaceDoesNotExist,
    NamespaceAlreadyExists,
    AssociationExists,
    AlreadyDeclared,
    WrongTypeDefinition,
    WrongInstanceInvocation,
    WrongModificationPattern,
    WrongArgumentsUsed,
    WrongHookType,
    WrongStackCleaner,
    /// Raised by caller code running inside a construction
    Raised,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 11] = [
        ErrorKind::NamespaceDoesNotExist,
        ErrorKind::NamespaceAlreadyExists,
        ErrorKind::AssociationExists,
        ErrorKind::AlreadyDeclared,
        ErrorKind::WrongTypeDefinition,
        ErrorKind::WrongInstanceInvocation,
        ErrorKind::WrongModificationPattern,
        ErrorKind::WrongArgumentsUsed,
        ErrorKind::WrongHookType,
        ErrorKind::WrongStackCleaner,
        ErrorKind::Raised,
    ];

    /// `(code, message template)` for this kind.
    const fn entry(self) -> (&'static str, &'static str) {
        match self {
            Self::NamespaceDoesNotExist => ("NAMESPACE_DOES_NOT_EXIST", "namespace does not exist"),
            Self::NamespaceAlreadyExists => (
                "NAMESPACE_ALREADY_EXISTS",
                "namespace with that name already exists",
            ),
            Self::AssociationExists => ("ASSOCIATION_EXISTS", "association is already made"),
            Self::AlreadyDeclared => ("ALREADY_DECLARED", "this type has already been declared"),
            Self::WrongTypeDefinition => ("WRONG_TYPE_DEFINITION", "wrong type definition"),
            Self::WrongInstanceInvocation => ("WRONG_INSTANCE_INVOCATION", "wrong instance invocation"),
            Self::WrongModificationPattern => ("WRONG_MODIFICATION_PATTERN", "wrong modification pattern"),
            Self::WrongArgumentsUsed => (
                "WRONG_ARGUMENTS_USED",
                "wrong arguments : should use proper invocation",
            ),
            Self::WrongHookType => ("WRONG_HOOK_TYPE", "this hook type does not exist"),
            Self::WrongStackCleaner => ("WRONG_STACK_CLEANER", "wrong stack cleaner pattern"),
            Self::Raised => ("RAISED", "construction aborted"),
        }
    }

    pub fn code(self) -> &'static str {
        self.entry().0
    }

    pub fn message(self) -> &'static str {
        self.entry().1
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The construction an error escaped from.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedConstruction {
    /// Dotted path of the type whose construction failed
    pub type_path: String,
    /// Arguments that construction was invoked with
    pub args: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    trace: Vec<String>,
    base_trace: Arc<str>,
    construction: Option<Box<FailedConstruction>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self::build(kind, kind.message().to_string())
    }

    /// Error whose message reads `<template> : <addition>`.
    pub fn with_addition(kind: ErrorKind, addition: impl fmt::Display) -> Self {
        Self::build(kind, format!("{} : {}", kind.message(), addition))
    }

    /// Error raised by an initializer, hook or flow checker.
    pub fn raised(reason: impl fmt::Display) -> Self {
        Self::with_addition(ErrorKind::Raised, reason)
    }

    fn build(kind: ErrorKind, message: String) -> Self {
        let base_trace = Backtrace::capture().to_string();
        let trace = cleanup_trace(base_trace.lines());
        Self {
            kind,
            message,
            trace,
            base_trace: Arc::from(base_trace),
            construction: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn family(&self) -> &'static str {
        BASE_ERROR_FAMILY
    }

    /// Call trace with engine frames removed
    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    /// Call trace exactly as captured
    pub fn base_trace(&self) -> &str {
        &self.base_trace
    }

    pub fn construction(&self) -> Option<&FailedConstruction> {
        self.construction.as_deref()
    }

    /// Prepend frames describing where the error surfaced.
    pub fn with_stack_addition(mut self, frames: impl IntoIterator<Item = String>) -> Self {
        let mut frames: Vec<String> = frames.into_iter().collect();
        frames.append(&mut self.trace);
        self.trace = frames;
        self
    }

    /// Record the failed construction unless an inner one was already recorded.
    pub(crate) fn within_construction(mut self, type_path: &str, args: &[Value]) -> Self {
        if self.construction.is_none() {
            self.trace.insert(0, format!("in construction of {}", type_path));
            self.construction = Some(Box::new(FailedConstruction {
                type_path: type_path.to_string(),
                args: args.to_vec(),
            }));
        }
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Error {}

impl PartialEq<ErrorKind> for Error {
    fn eq(&self, kind: &ErrorKind) -> bool {
        self.kind == *kind
    }
}

// ============================================================================
// Stack cleaners
// ============================================================================

static STACK_CLEANERS: Lazy<RwLock<Vec<Regex>>> = Lazy::new(|| {
    RwLock::new(vec![
        Regex::new(r"^\s*\d+: progeny::").expect("static pattern"),
        Regex::new(r"^\s*\d+: std::backtrace").expect("static pattern"),
    ])
});

/// Register a pattern; trace lines matching any registered pattern are
/// dropped from [`Error::trace`].
pub fn define_stack_cleaner(pattern: &str) -> Result<()> {
    match Regex::new(pattern) {
        Ok(regex) => {
            STACK_CLEANERS.write().push(regex);
            Ok(())
        }
        Err(err) => {
            tracing::warn!(pattern, error = %err, "Rejected stack cleaner");
            Err(Error::with_addition(ErrorKind::WrongStackCleaner, err))
        }
    }
}

pub fn cleanup_trace<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let cleaners = STACK_CLEANERS.read();
    let mut kept = Vec::new();
    let mut skip_location = false;
    for line in lines {
        let trimmed = line.trim();
        // a frame's "at file:line" row follows its symbol row
        if trimmed.starts_with("at ") {
            if !skip_location {
                kept.push(line.to_string());
            }
            continue;
        }
        skip_location = cleaners.iter().any(|cleaner| cleaner.is_match(line));
        if !skip_location {
            kept.push(line.to_string());
        }
    }
    kept
}
