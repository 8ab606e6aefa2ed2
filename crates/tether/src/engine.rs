//! The interpreter boundary.
//!
//! [`Engine`] is the request/response surface of the embedded interpreter. The
//! session layer never reaches past it: every execution, compile probe, value
//! transfer and teardown goes through one of these methods, always with the
//! [`ContextHandle`] the engine returned from `acquire_context`.
//!
//! Implementations must tolerate calls for many contexts from many threads
//! (hence `Send + Sync`); the session layer guarantees that calls for any one
//! context only ever come from that context's owning thread.

use std::{
    fmt,
    num::NonZeroU64,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use crate::{
    config::ResourceResolver,
    error::{EngineError, SessionError},
    value::{Kwargs, ObjectRef, Value, ValueKind},
};

/// Identifies one interpreter context inside an engine.
///
/// Never zero, so `Option<ContextHandle>` is the natural "no context" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(NonZeroU64);

impl ContextHandle {
    /// Wraps a raw engine handle; returns `None` for zero.
    #[must_use]
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// The raw engine handle.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Result of a compile-only probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileStatus {
    /// The text parses as a self-contained unit.
    Complete,
    /// The text is a valid prefix that needs more lines (e.g. an open block).
    Incomplete,
}

/// Parameters for [`Engine::acquire_context`].
#[derive(Debug, Clone, Copy)]
pub struct AcquireOptions<'a> {
    /// Resolver for host resources; `None` selects the engine default.
    pub resolver: Option<&'a Arc<dyn ResourceResolver>>,
    /// Whether the context will import modules shared with the main instance.
    pub has_shared_state: bool,
    /// Whether the context gets its own isolated interpreter state.
    pub isolated: bool,
}

/// The embedded interpreter, seen from the host.
pub trait Engine: fmt::Debug + Send + Sync {
    /// Creates a new execution context.
    fn acquire_context(&self, options: &AcquireOptions<'_>) -> Result<ContextHandle, EngineError>;

    /// Executes source text in the context.
    fn execute(&self, ctx: ContextHandle, source: &str) -> Result<(), EngineError>;

    /// Compiles without executing, reporting whether the text is a complete unit.
    ///
    /// Text that can never become valid (as opposed to text that is merely
    /// unfinished) should be reported as [`EngineError::Compile`].
    fn compile_check(&self, ctx: ContextHandle, source: &str) -> Result<CompileStatus, EngineError>;

    /// Executes a script file.
    fn run_file(&self, ctx: ContextHandle, path: &Path) -> Result<(), EngineError>;

    /// Calls a named callable with positional and keyword arguments.
    fn invoke_callable(
        &self,
        ctx: ContextHandle,
        name: &str,
        args: &[Value],
        kwargs: Option<&Kwargs>,
    ) -> Result<Value, EngineError>;

    /// Reads a named value, converted to `target`.
    fn get_named(&self, ctx: ContextHandle, name: &str, target: ValueKind) -> Result<Value, EngineError>;

    /// Reads a named value as raw bytes, without any text decoding.
    fn get_named_bytes(&self, ctx: ContextHandle, name: &str) -> Result<Vec<u8>, EngineError>;

    /// Binds `name` to `value` in the context.
    fn set_named(&self, ctx: ContextHandle, name: &str, value: Value) -> Result<(), EngineError>;

    /// Replaces the context's resource resolver.
    fn set_resource_resolver(&self, ctx: ContextHandle, resolver: &Arc<dyn ResourceResolver>);

    /// Tears down per-context module and import-hook state ahead of release.
    fn teardown_modules(&self, ctx: ContextHandle) -> Result<(), EngineError>;

    /// Drops an object reference the engine previously handed out.
    fn release_reference(&self, ctx: ContextHandle, reference: &ObjectRef);

    /// Terminates the context. Best-effort; must not fail the caller.
    fn release_context(&self, ctx: ContextHandle);

    /// Appends directories to the guest's module search path.
    fn add_search_paths(&self, _ctx: ContextHandle, _paths: &[PathBuf]) -> Result<(), EngineError> {
        Ok(())
    }

    /// Routes imports of the named modules to the main engine instance.
    fn install_shared_modules(&self, _ctx: ContextHandle, _modules: &[String]) -> Result<(), EngineError> {
        Ok(())
    }

    /// Installs the hook that lets guest code import host types.
    fn install_import_hook(
        &self,
        _ctx: ContextHandle,
        _resolver: Option<&Arc<dyn ResourceResolver>>,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    /// Sends guest stdout/stderr to the host's streams.
    fn redirect_streams(&self, _ctx: ContextHandle) -> Result<(), EngineError> {
        Ok(())
    }
}

// =============================================================================
// Main engine instance
// =============================================================================

/// The process-wide engine used by [`Session::new`](crate::Session::new).
static MAIN_ENGINE: OnceLock<Arc<dyn Engine>> = OnceLock::new();

/// Installs the process-wide main engine.
///
/// Must happen before the first `Session::new`. The slot can be filled once;
/// a second call fails with [`SessionError::InvalidState`] and leaves the
/// first engine in place.
pub fn configure_main_engine(engine: Arc<dyn Engine>) -> Result<(), SessionError> {
    MAIN_ENGINE
        .set(engine)
        .map_err(|_| SessionError::InvalidState("main engine is already configured".to_owned()))?;
    tracing::info!("main interpreter engine configured");
    Ok(())
}

/// Returns the main engine, if one has been configured.
#[must_use]
pub fn main_engine() -> Option<Arc<dyn Engine>> {
    MAIN_ENGINE.get().cloned()
}
