//! Error taxonomy for session operations.
//!
//! [`SessionError`] is what every public [`Session`](crate::Session) method
//! returns. [`EngineError`] is what the interpreter boundary returns; it is
//! folded into `SessionError` unchanged so callers can tell a syntax fault
//! from a runtime fault from a conversion failure without string matching.

use std::{path::PathBuf, thread::ThreadId};

use thiserror::Error;

use crate::value::ValueKind;

/// Errors surfaced by [`Session`](crate::Session) operations.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// An operation was invoked from a thread other than the session owner.
    #[error("invalid thread access: session is owned by {owner:?}, called from {caller:?}")]
    InvalidThread { owner: ThreadId, caller: ThreadId },

    /// The current thread already hosts a session that was never closed.
    #[error(
        "unsafe reuse of thread {thread:?} for another interpreter context; close() the previous session first"
    )]
    ThreadReuse { thread: ThreadId },

    /// `close()` was called from a thread other than the session owner.
    #[error("unsafe close() of interpreter context by thread {caller:?}; close() from the owning thread {owner:?}")]
    CrossThreadClose { owner: ThreadId, caller: ThreadId },

    /// The session has been closed.
    #[error("session has been closed")]
    Closed,

    /// The session never acquired an interpreter context.
    #[error("session is not initialized")]
    Uninitialized,

    /// Acquiring or configuring the interpreter context failed.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// The operation does not apply to the session's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed caller input. No engine state was touched.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine rejected source text as syntactically invalid.
    #[error("compile error: {0}")]
    Compile(String),

    /// The engine raised while executing guest code.
    #[error("{0}")]
    Execution(String),

    /// A value could not be converted between host and guest representation.
    #[error("type conversion failed: {0}")]
    TypeConversion(String),

    /// A script path exists but cannot be read as a file.
    #[error("invalid file: {}", path.display())]
    FileAccess { path: PathBuf },
}

impl SessionError {
    /// Builds the conversion error for a guest value that cannot become `target`.
    pub(crate) fn conversion(found: ValueKind, target: ValueKind) -> Self {
        Self::TypeConversion(format!("cannot convert {found} to {target}"))
    }

    /// Builds the conversion error for an integer that does not fit `target`.
    pub(crate) fn out_of_range(value: impl std::fmt::Display, target: ValueKind) -> Self {
        Self::TypeConversion(format!("{value} is out of range for {target}"))
    }
}

/// Failures reported by an [`Engine`](crate::Engine) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Source text failed to compile.
    #[error("{0}")]
    Compile(String),
    /// Guest code raised at runtime.
    #[error("{0}")]
    Execution(String),
    /// The engine has no mapping between the guest value and the requested type.
    #[error("{0}")]
    Conversion(String),
    /// A named value does not exist in the context.
    #[error("name '{0}' is not defined")]
    NameNotFound(String),
    /// Any other engine-side failure.
    #[error("{0}")]
    Failed(String),
}

impl From<EngineError> for SessionError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Compile(msg) => Self::Compile(msg),
            EngineError::Conversion(msg) => Self::TypeConversion(msg),
            err @ (EngineError::Execution(_) | EngineError::NameNotFound(_) | EngineError::Failed(_)) => {
                Self::Execution(err.to_string())
            }
        }
    }
}
