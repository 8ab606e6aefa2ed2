//! Thread-pinned interpreter sessions.
//!
//! A [`Session`] owns one interpreter context acquired from an [`Engine`]. It
//! moves through `Uninitialized → Initialized → Closed`; `Closed` is terminal.
//! Every operation that reaches the engine first passes the affinity check
//! (see [`crate::affinity`]), so a session is only ever driven from the thread
//! that initialized it.
//!
//! ```
//! use std::sync::Arc;
//! use tether::{EvalOutcome, Session, SessionConfig, ThreadRegistry, testing::FakeEngine};
//!
//! let engine = Arc::new(FakeEngine::new());
//! let config = SessionConfig::new().interactive(true);
//! let mut session = Session::with_engine(engine, Arc::new(ThreadRegistry::new()), config).unwrap();
//!
//! assert_eq!(session.eval("if True:").unwrap(), EvalOutcome::Buffered);
//! assert_eq!(session.eval("    answer = 42").unwrap(), EvalOutcome::Buffered);
//! assert_eq!(session.flush().unwrap(), EvalOutcome::Executed);
//! assert_eq!(session.get_value::<i32>("answer").unwrap(), 42);
//!
//! session.close().unwrap();
//! ```

use std::{
    fs,
    path::Path,
    sync::Arc,
    thread::{self, ThreadId},
};

use strum::Display;

use crate::{
    Result,
    accumulator::{EvalOutcome, StatementAccumulator, StatementSink},
    affinity::{self, ThreadRegistry},
    config::{ResourceResolver, SessionConfig},
    engine::{self, AcquireOptions, CompileStatus, ContextHandle, Engine},
    error::{EngineError, SessionError},
    references::ReferenceTracker,
    value::{FromValue, IntoValue, Kwargs, Value},
};

/// Where a session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Lifecycle {
    /// Created, no context acquired yet.
    Uninitialized,
    /// Holds a live context.
    Initialized,
    /// Context released. Terminal.
    Closed,
}

/// An interpreter context bound to the thread that created it.
#[derive(Debug)]
pub struct Session {
    engine: Arc<dyn Engine>,
    registry: Arc<ThreadRegistry>,
    config: SessionConfig,
    /// Resolver currently installed in the context.
    resolver: Option<Arc<dyn ResourceResolver>>,
    handle: Option<ContextHandle>,
    owner: Option<ThreadId>,
    lifecycle: Lifecycle,
    /// Set when acquisition or configuration failed; the session can never initialize.
    init_failed: bool,
    accumulator: StatementAccumulator,
    references: ReferenceTracker,
}

// =============================================================================
// Construction and initialization
// =============================================================================

impl Session {
    /// Creates a session on the process-wide main engine and thread registry.
    ///
    /// Fails with [`SessionError::Initialization`] if
    /// [`configure_main_engine`](crate::configure_main_engine) has not been called.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let engine = engine::main_engine().ok_or_else(|| {
            SessionError::Initialization("no main engine configured; call configure_main_engine first".to_owned())
        })?;
        Self::with_engine(engine, ThreadRegistry::global(), config)
    }

    /// Creates a session on an explicit engine and registry.
    ///
    /// Unless `config.postpone_init` is set, the context is acquired right away
    /// and the calling thread becomes the owner.
    ///
    /// # Errors
    ///
    /// [`SessionError::ThreadReuse`] if the calling thread already hosts an
    /// unclosed session, [`SessionError::Initialization`] if the engine could
    /// not provide or configure a context.
    pub fn with_engine(engine: Arc<dyn Engine>, registry: Arc<ThreadRegistry>, config: SessionConfig) -> Result<Self> {
        let thread = thread::current().id();
        if registry.is_hosting(thread) {
            tracing::warn!(?thread, "thread already hosts an unclosed session");
            return Err(SessionError::ThreadReuse { thread });
        }

        let mut session = Self {
            engine,
            registry,
            resolver: config.resource_resolver.clone(),
            accumulator: StatementAccumulator::new(config.interactive),
            config,
            handle: None,
            owner: None,
            lifecycle: Lifecycle::Uninitialized,
            init_failed: false,
            references: ReferenceTracker::new(),
        };
        if !session.config.postpone_init {
            session.init()?;
        }
        Ok(session)
    }

    /// Acquires and configures the interpreter context.
    ///
    /// Called automatically by the constructors unless init was postponed. The
    /// calling thread becomes the owner, so a postponed session should be
    /// initialized on the thread that will use it.
    pub fn init(&mut self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Closed => return Err(SessionError::Closed),
            Lifecycle::Initialized => {
                return Err(SessionError::InvalidState("session is already initialized".to_owned()));
            }
            Lifecycle::Uninitialized => {}
        }
        if self.init_failed {
            return Err(SessionError::Initialization(
                "a previous initialization attempt failed; create a new session".to_owned(),
            ));
        }

        let thread = thread::current().id();
        self.registry.claim(thread)?;

        let options = AcquireOptions {
            resolver: self.resolver.as_ref(),
            has_shared_state: self.config.has_shared_modules(),
            isolated: self.config.isolated,
        };
        let ctx = match self.engine.acquire_context(&options) {
            Ok(ctx) => ctx,
            Err(err) => {
                self.registry.release(thread);
                self.init_failed = true;
                return Err(SessionError::Initialization(err.to_string()));
            }
        };

        self.handle = Some(ctx);
        self.owner = Some(thread);
        self.lifecycle = Lifecycle::Initialized;

        if let Err(err) = self.configure(ctx) {
            tracing::warn!(%ctx, %err, "context configuration failed; releasing context");
            self.engine.release_context(ctx);
            self.handle = None;
            self.owner = None;
            self.lifecycle = Lifecycle::Uninitialized;
            self.init_failed = true;
            self.registry.release(thread);
            return Err(SessionError::Initialization(err.to_string()));
        }

        tracing::info!(%ctx, ?thread, interactive = self.is_interactive(), "session initialized");
        Ok(())
    }

    /// Applies search paths, shared modules, the import hook and stream redirection.
    fn configure(&self, ctx: ContextHandle) -> std::result::Result<(), EngineError> {
        if !self.config.include_paths.is_empty() {
            tracing::debug!(%ctx, paths = ?self.config.include_paths, "extending search path");
            self.engine.add_search_paths(ctx, &self.config.include_paths)?;
        }
        if self.config.has_shared_modules() {
            tracing::debug!(%ctx, modules = ?self.config.shared_modules, "installing shared modules");
            self.engine.install_shared_modules(ctx, &self.config.shared_modules)?;
        }
        self.engine.install_import_hook(ctx, self.resolver.as_ref())?;
        if self.config.redirect_output_streams {
            self.engine.redirect_streams(ctx)?;
        }
        Ok(())
    }

    /// Passes the affinity check and returns the live context.
    fn context(&self) -> Result<ContextHandle> {
        affinity::check(self.lifecycle, self.owner, thread::current().id())?;
        self.handle.ok_or(SessionError::Uninitialized)
    }
}

// =============================================================================
// Execution
// =============================================================================

impl Session {
    /// Feeds one line of source, or flushes with `None`.
    ///
    /// In direct mode a non-blank line runs immediately. In interactive mode a
    /// line that compiles on its own runs immediately when nothing is pending;
    /// anything else is appended to the pending statement, which runs on the
    /// next flush. If execution fails the pending statement is discarded.
    pub fn evaluate(&mut self, line: Option<&str>) -> Result<EvalOutcome> {
        let ctx = self.context()?;
        let mut sink = ContextSink {
            engine: self.engine.as_ref(),
            ctx,
        };
        self.accumulator.feed(line, &mut sink)
    }

    /// Feeds one line. Blank text flushes, like `evaluate(None)`.
    pub fn eval(&mut self, line: &str) -> Result<EvalOutcome> {
        self.evaluate(Some(line))
    }

    /// Runs the pending statement, if any.
    pub fn flush(&mut self) -> Result<EvalOutcome> {
        self.evaluate(None)
    }

    /// Calls a guest callable by name.
    ///
    /// Positional arguments keep their order. The result is extracted untyped;
    /// object references in it are released when the session closes.
    pub fn invoke(&mut self, name: &str, args: &[Value], kwargs: Option<&Kwargs>) -> Result<Value> {
        let ctx = self.context()?;
        if name.trim().is_empty() {
            return Err(SessionError::InvalidArgument("invalid function name".to_owned()));
        }
        let result = self.engine.invoke_callable(ctx, name, args, kwargs)?;
        self.references.track(&result);
        Ok(result)
    }

    /// Runs a script file in the session's context.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidArgument`] for an empty path,
    /// [`SessionError::FileAccess`] if the path is missing, not a regular file
    /// or cannot be opened. Neither touches the engine.
    pub fn run_script(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let ctx = self.context()?;
        let path = path.as_ref();
        validate_script(path)?;
        tracing::debug!(%ctx, path = %path.display(), "running script");
        self.engine.run_file(ctx, path)?;
        Ok(())
    }

    /// Installs `resolver` and then runs a script file.
    pub fn run_script_with_resolver(
        &mut self,
        path: impl AsRef<Path>,
        resolver: Arc<dyn ResourceResolver>,
    ) -> Result<()> {
        self.set_resource_resolver(resolver)?;
        self.run_script(path)
    }
}

/// Rejects script paths before anything reaches the engine.
fn validate_script(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(SessionError::InvalidArgument("script path cannot be empty".to_owned()));
    }
    let access_error = || SessionError::FileAccess {
        path: path.to_path_buf(),
    };
    let metadata = fs::metadata(path).map_err(|_| access_error())?;
    if !metadata.is_file() {
        return Err(access_error());
    }
    fs::File::open(path).map_err(|_| access_error())?;
    Ok(())
}

/// Adapts the engine to the accumulator for one `evaluate` call.
struct ContextSink<'a> {
    engine: &'a dyn Engine,
    ctx: ContextHandle,
}

impl StatementSink for ContextSink<'_> {
    type Error = SessionError;

    fn is_complete(&mut self, source: &str) -> Result<bool> {
        Ok(self.engine.compile_check(self.ctx, source)? == CompileStatus::Complete)
    }

    fn execute(&mut self, source: &str) -> Result<()> {
        self.engine.execute(self.ctx, source)?;
        Ok(())
    }
}

// =============================================================================
// Values
// =============================================================================

impl Session {
    /// Reads a named value as `T`.
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use tether::{Session, SessionConfig, ThreadRegistry, testing::FakeEngine};
    /// # let mut session = Session::with_engine(
    /// #     Arc::new(FakeEngine::new()), Arc::new(ThreadRegistry::new()), SessionConfig::new()).unwrap();
    /// session.set_value("n", 300_i64).unwrap();
    /// assert_eq!(session.get_value::<i16>("n").unwrap(), 300);
    /// assert!(session.get_value::<i8>("n").is_err());
    /// ```
    pub fn get_value<T: FromValue>(&mut self, name: &str) -> Result<T> {
        let ctx = self.context()?;
        validate_name(name)?;
        let value = self.engine.get_named(ctx, name, T::KIND)?;
        self.references.track(&value);
        T::from_value(value)
    }

    /// Reads a named value, letting the engine choose the host representation.
    pub fn get_object(&mut self, name: &str) -> Result<Value> {
        self.get_value::<Value>(name)
    }

    /// Reads a named value as raw bytes, with no text decoding.
    pub fn get_bytes(&mut self, name: &str) -> Result<Vec<u8>> {
        let ctx = self.context()?;
        validate_name(name)?;
        Ok(self.engine.get_named_bytes(ctx, name)?)
    }

    /// Binds `name` in the context to a host value.
    pub fn set_value(&mut self, name: &str, value: impl IntoValue) -> Result<()> {
        let ctx = self.context()?;
        validate_name(name)?;
        let value = value.into_value();
        tracing::trace!(%ctx, name, kind = %value.kind(), "set value");
        self.engine.set_named(ctx, name, value)?;
        Ok(())
    }

    /// Replaces the context's resource resolver.
    ///
    /// Does not reach the engine when `resolver` is the one already installed.
    pub fn set_resource_resolver(&mut self, resolver: Arc<dyn ResourceResolver>) -> Result<()> {
        let ctx = self.context()?;
        if self
            .resolver
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &resolver))
        {
            return Ok(());
        }
        tracing::debug!(%ctx, resolver = resolver.name(), "switching resource resolver");
        self.engine.set_resource_resolver(ctx, &resolver);
        self.resolver = Some(resolver);
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SessionError::InvalidArgument("variable name cannot be blank".to_owned()));
    }
    Ok(())
}

// =============================================================================
// Status and mode
// =============================================================================

impl Session {
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.lifecycle == Lifecycle::Initialized
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lifecycle == Lifecycle::Closed
    }

    /// The thread that owns this session, once initialized.
    #[must_use]
    pub fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    /// The engine context, while the session holds one.
    #[must_use]
    pub fn context_handle(&self) -> Option<ContextHandle> {
        self.handle
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn is_interactive(&self) -> bool {
        self.accumulator.is_interactive()
    }

    /// Switches interactive mode. Leaving it drops any pending statement.
    pub fn set_interactive(&mut self, interactive: bool) -> Result<()> {
        self.context()?;
        if let Some(dropped) = self.accumulator.set_interactive(interactive) {
            tracing::warn!(pending = %dropped, "interactive mode disabled; pending statement discarded");
        }
        Ok(())
    }

    /// Whether an incomplete statement is waiting for more lines.
    #[must_use]
    pub fn has_pending_statement(&self) -> bool {
        self.accumulator.pending().is_some()
    }

    /// Number of engine object references held by this session.
    #[must_use]
    pub fn tracked_references(&self) -> usize {
        self.references.len()
    }
}

// =============================================================================
// Teardown
// =============================================================================

impl Session {
    /// Releases the interpreter context.
    ///
    /// Closing twice is a no-op. Must be called from the owning thread; from any
    /// other thread it fails with [`SessionError::CrossThreadClose`] and the
    /// session stays open.
    ///
    /// The sequence is: release tracked object references, tear down module
    /// state, terminate the context, forget the handle, free the owning thread
    /// in the registry. The session is marked closed before any of it runs and
    /// every step runs regardless of the one before; a teardown failure is
    /// logged, never allowed to strand the context.
    pub fn close(&mut self) -> Result<()> {
        if self.lifecycle == Lifecycle::Closed {
            return Ok(());
        }
        let caller = thread::current().id();
        if let Some(owner) = self.owner
            && owner != caller
        {
            return Err(SessionError::CrossThreadClose { owner, caller });
        }

        self.lifecycle = Lifecycle::Closed;
        if let Some(ctx) = self.handle {
            let released = self.references.release_all(self.engine.as_ref(), ctx);
            tracing::debug!(%ctx, released, "released object references");
            if let Err(err) = self.engine.teardown_modules(ctx) {
                tracing::error!(%ctx, %err, "module teardown failed; releasing context anyway");
            }
            self.engine.release_context(ctx);
            self.handle = None;
            tracing::info!(%ctx, "session closed");
        }
        if let Some(owner) = self.owner {
            self.registry.release(owner);
        }
        self.accumulator = StatementAccumulator::new(self.accumulator.is_interactive());
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::error!(%err, "session dropped on a foreign thread; interpreter context leaked");
        }
    }
}
