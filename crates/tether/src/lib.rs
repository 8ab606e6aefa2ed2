#![doc = include_str!("../../../README.md")]

mod accumulator;
pub mod affinity;
mod config;
mod engine;
mod error;
mod references;
mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod value;

pub use crate::{
    accumulator::{EvalOutcome, StatementAccumulator, StatementSink},
    affinity::ThreadRegistry,
    config::{ResourceResolver, SearchPathResolver, SessionConfig},
    engine::{AcquireOptions, CompileStatus, ContextHandle, Engine, configure_main_engine, main_engine},
    error::{EngineError, SessionError},
    references::ReferenceTracker,
    session::{Lifecycle, Session},
    value::{ClassRef, FromValue, IntoValue, Kwargs, ObjectRef, Value, ValueKind},
};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SessionError>;
