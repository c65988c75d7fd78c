//! Classified failures of the interpreter core.
//!
//! Loading and invocation problems get their own variants so callers can tell
//! them apart. Faults raised while evaluating instructions stay plain
//! [`anyhow::Error`]s and are passed through untouched.

use crate::ty::Type;
use thiserror::Error;

/// Failure to read, parse or materialize a program.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("materialization error at line {line}: {message}")]
    Materialize { line: usize, message: String },
}

impl LoadError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        LoadError::Parse {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn materialize(line: usize, message: impl Into<String>) -> Self {
        LoadError::Materialize {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum InterpError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("'{0}' function not found in module")]
    MissingEntryPoint(String),

    #[error("Function '{0}' not found")]
    FunctionNotFound(String),

    #[error("Function '{name}' has no body")]
    NoBody { name: String },

    #[error("Function '{name}' takes {expected} arguments, but only {found} were supplied")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Argument {index} of '{name}' has type {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        index: usize,
        expected: Type,
        found: Type,
    },

    #[error("Unsupported signature for '{name}': {reason}")]
    MainSignature { name: String, reason: String },

    #[error("Value of type {0} cannot be used as an exit status")]
    ExitStatus(Type),
}
