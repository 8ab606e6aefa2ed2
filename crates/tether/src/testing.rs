//! In-memory [`Engine`] for tests.
//!
//! `FakeEngine` does not interpret a real language. It understands just enough
//! to exercise the session layer:
//!
//! - compile probes: text whose last non-blank line ends in `:`, or that leaves
//!   a bracket open, is [`CompileStatus::Incomplete`]; a stray closing bracket
//!   is a compile error
//! - execution: every line of the form `name = literal` (int, float, quoted
//!   string, `True`, `False`, `None`) binds a variable, and any line starting
//!   with `raise` fails with [`EngineError::Execution`]
//! - callables registered with [`FakeEngine::register_callable`]
//!
//! Everything the session sends across the boundary is recorded so tests can
//! assert on it, and a few failure switches let tests drive error paths.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;

use crate::{
    config::ResourceResolver,
    engine::{AcquireOptions, CompileStatus, ContextHandle, Engine},
    error::EngineError,
    value::{Kwargs, ObjectRef, Value, ValueKind},
};

type Callable = Arc<dyn Fn(&[Value], Option<&Kwargs>) -> Result<Value, EngineError> + Send + Sync>;

/// Observable state of one fake context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeContext {
    /// Source texts passed to `execute`, in call order.
    pub executed: Vec<String>,
    /// Current variable bindings.
    pub variables: HashMap<String, Value>,
    /// `(name, kind)` of every `set_named` call, in call order.
    pub assignments: Vec<(String, ValueKind)>,
    /// Name of the active resource resolver.
    pub resolver: Option<String>,
    pub has_shared_state: bool,
    pub isolated: bool,
    pub search_paths: Vec<PathBuf>,
    pub shared_modules: Vec<String>,
    pub import_hook_installed: bool,
    pub streams_redirected: bool,
    pub modules_torn_down: bool,
}

#[derive(Default)]
struct FakeState {
    contexts: HashMap<ContextHandle, FakeContext>,
    released_contexts: Vec<ContextHandle>,
    released_references: Vec<ObjectRef>,
    late_references: Vec<ObjectRef>,
    lifecycle_calls: Vec<&'static str>,
    resolver_changes: usize,
    callables: HashMap<String, Callable>,
}

/// An engine that keeps all state in memory.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
    next_handle: AtomicU64,
    fail_acquire: AtomicBool,
    fail_teardown: AtomicBool,
}

impl std::fmt::Debug for FakeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeEngine")
            .field("live_contexts", &self.live_contexts())
            .finish_non_exhaustive()
    }
}

impl FakeEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `acquire_context` calls fail.
    pub fn fail_acquire(&self, fail: bool) {
        self.fail_acquire.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent `teardown_modules` calls fail.
    pub fn fail_teardown(&self, fail: bool) {
        self.fail_teardown.store(fail, Ordering::SeqCst);
    }

    /// Registers a callable reachable through `invoke_callable`.
    pub fn register_callable(
        &self,
        name: &str,
        callable: impl Fn(&[Value], Option<&Kwargs>) -> Result<Value, EngineError> + Send + Sync + 'static,
    ) {
        self.state.lock().callables.insert(name.to_owned(), Arc::new(callable));
    }

    /// Snapshot of a live context, or `None` once it has been released.
    #[must_use]
    pub fn context(&self, ctx: ContextHandle) -> Option<FakeContext> {
        self.state.lock().contexts.get(&ctx).cloned()
    }

    #[must_use]
    pub fn live_contexts(&self) -> usize {
        self.state.lock().contexts.len()
    }

    /// Every `release_context` call, in order, duplicates included.
    #[must_use]
    pub fn released_contexts(&self) -> Vec<ContextHandle> {
        self.state.lock().released_contexts.clone()
    }

    #[must_use]
    pub fn released_references(&self) -> Vec<ObjectRef> {
        self.state.lock().released_references.clone()
    }

    /// References released after their context was already gone.
    #[must_use]
    pub fn late_released_references(&self) -> Vec<ObjectRef> {
        self.state.lock().late_references.clone()
    }

    /// Names of the context lifecycle calls (`acquire_context`,
    /// `release_reference`, `teardown_modules`, `release_context`), in call order.
    #[must_use]
    pub fn lifecycle_calls(&self) -> Vec<&'static str> {
        self.state.lock().lifecycle_calls.clone()
    }

    /// How many times `set_resource_resolver` was called.
    #[must_use]
    pub fn resolver_changes(&self) -> usize {
        self.state.lock().resolver_changes
    }

    fn with_context<T>(
        &self,
        ctx: ContextHandle,
        f: impl FnOnce(&mut FakeContext) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut state = self.state.lock();
        let context = state
            .contexts
            .get_mut(&ctx)
            .ok_or_else(|| EngineError::Failed(format!("unknown context {ctx}")))?;
        f(context)
    }
}

impl Engine for FakeEngine {
    fn acquire_context(&self, options: &AcquireOptions<'_>) -> Result<ContextHandle, EngineError> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(EngineError::Failed("interpreter context unavailable".to_owned()));
        }
        let raw = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        let ctx = ContextHandle::new(raw).ok_or_else(|| EngineError::Failed("handle space exhausted".to_owned()))?;
        let context = FakeContext {
            resolver: options.resolver.map(|r| r.name().to_owned()),
            has_shared_state: options.has_shared_state,
            isolated: options.isolated,
            ..FakeContext::default()
        };
        let mut state = self.state.lock();
        state.lifecycle_calls.push("acquire_context");
        state.contexts.insert(ctx, context);
        Ok(ctx)
    }

    fn execute(&self, ctx: ContextHandle, source: &str) -> Result<(), EngineError> {
        self.with_context(ctx, |context| {
            context.executed.push(source.to_owned());
            run_source(context, source)
        })
    }

    fn compile_check(&self, ctx: ContextHandle, source: &str) -> Result<CompileStatus, EngineError> {
        self.with_context(ctx, |_| probe(source))
    }

    fn run_file(&self, ctx: ContextHandle, path: &Path) -> Result<(), EngineError> {
        let source =
            fs::read_to_string(path).map_err(|err| EngineError::Failed(format!("{}: {err}", path.display())))?;
        self.execute(ctx, &source)
    }

    fn invoke_callable(
        &self,
        ctx: ContextHandle,
        name: &str,
        args: &[Value],
        kwargs: Option<&Kwargs>,
    ) -> Result<Value, EngineError> {
        let callable = {
            let state = self.state.lock();
            if !state.contexts.contains_key(&ctx) {
                return Err(EngineError::Failed(format!("unknown context {ctx}")));
            }
            state
                .callables
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::NameNotFound(name.to_owned()))?
        };
        // called without the lock so callables may re-enter the engine
        callable(args, kwargs)
    }

    fn get_named(&self, ctx: ContextHandle, name: &str, _target: ValueKind) -> Result<Value, EngineError> {
        self.with_context(ctx, |context| {
            context
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::NameNotFound(name.to_owned()))
        })
    }

    fn get_named_bytes(&self, ctx: ContextHandle, name: &str) -> Result<Vec<u8>, EngineError> {
        self.with_context(ctx, |context| match context.variables.get(name) {
            Some(Value::Str(text)) => Ok(text.as_bytes().to_vec()),
            Some(Value::ByteArray(bytes)) => Ok(bytes.clone()),
            Some(other) => Err(EngineError::Conversion(format!(
                "'{name}' is {}, not str or bytes",
                other.kind()
            ))),
            None => Err(EngineError::NameNotFound(name.to_owned())),
        })
    }

    fn set_named(&self, ctx: ContextHandle, name: &str, value: Value) -> Result<(), EngineError> {
        self.with_context(ctx, |context| {
            context.assignments.push((name.to_owned(), value.kind()));
            context.variables.insert(name.to_owned(), value);
            Ok(())
        })
    }

    fn set_resource_resolver(&self, ctx: ContextHandle, resolver: &Arc<dyn ResourceResolver>) {
        let mut state = self.state.lock();
        state.resolver_changes += 1;
        if let Some(context) = state.contexts.get_mut(&ctx) {
            context.resolver = Some(resolver.name().to_owned());
        }
    }

    fn teardown_modules(&self, ctx: ContextHandle) -> Result<(), EngineError> {
        self.state.lock().lifecycle_calls.push("teardown_modules");
        if self.fail_teardown.load(Ordering::SeqCst) {
            return Err(EngineError::Execution("shared module teardown failed".to_owned()));
        }
        self.with_context(ctx, |context| {
            context.modules_torn_down = true;
            Ok(())
        })
    }

    fn release_reference(&self, ctx: ContextHandle, reference: &ObjectRef) {
        let mut state = self.state.lock();
        state.lifecycle_calls.push("release_reference");
        if state.contexts.contains_key(&ctx) {
            state.released_references.push(reference.clone());
        } else {
            state.late_references.push(reference.clone());
        }
    }

    fn release_context(&self, ctx: ContextHandle) {
        let mut state = self.state.lock();
        state.lifecycle_calls.push("release_context");
        state.contexts.remove(&ctx);
        state.released_contexts.push(ctx);
    }

    fn add_search_paths(&self, ctx: ContextHandle, paths: &[PathBuf]) -> Result<(), EngineError> {
        self.with_context(ctx, |context| {
            context.search_paths.extend_from_slice(paths);
            Ok(())
        })
    }

    fn install_shared_modules(&self, ctx: ContextHandle, modules: &[String]) -> Result<(), EngineError> {
        self.with_context(ctx, |context| {
            context.shared_modules.extend_from_slice(modules);
            Ok(())
        })
    }

    fn install_import_hook(
        &self,
        ctx: ContextHandle,
        _resolver: Option<&Arc<dyn ResourceResolver>>,
    ) -> Result<(), EngineError> {
        self.with_context(ctx, |context| {
            context.import_hook_installed = true;
            Ok(())
        })
    }

    fn redirect_streams(&self, ctx: ContextHandle) -> Result<(), EngineError> {
        self.with_context(ctx, |context| {
            context.streams_redirected = true;
            Ok(())
        })
    }
}

/// Heuristic completeness probe over bracket balance and block headers.
fn probe(source: &str) -> Result<CompileStatus, EngineError> {
    let mut depth = 0i32;
    for ch in source.chars() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return Err(EngineError::Compile(format!("unmatched '{ch}'")));
        }
    }
    if depth > 0 {
        return Ok(CompileStatus::Incomplete);
    }
    let opens_block = source
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .is_some_and(|line| line.trim_end().ends_with(':'));
    Ok(if opens_block {
        CompileStatus::Incomplete
    } else {
        CompileStatus::Complete
    })
}

fn run_source(context: &mut FakeContext, source: &str) -> Result<(), EngineError> {
    if let CompileStatus::Incomplete = probe(source)?
        && !source.contains('\n')
    {
        return Err(EngineError::Compile("unexpected end of input".to_owned()));
    }
    for line in source.lines().map(str::trim) {
        if let Some(message) = line.strip_prefix("raise") {
            return Err(EngineError::Execution(format!("Exception:{message}")));
        }
        if let Some((name, literal)) = line.split_once('=')
            && let Some(value) = parse_literal(literal.trim())
        {
            let name = name.trim();
            if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                context.variables.insert(name.to_owned(), value);
            }
        }
    }
    Ok(())
}

fn parse_literal(text: &str) -> Option<Value> {
    match text {
        "True" => return Some(Value::Bool(true)),
        "False" => return Some(Value::Bool(false)),
        "None" => return Some(Value::None),
        _ => {}
    }
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::Long(int));
    }
    if let Ok(float) = text.parse::<f64>() {
        return Some(Value::Double(float));
    }
    let quoted = (text.len() >= 2)
        && ((text.starts_with('"') && text.ends_with('"')) || (text.starts_with('\'') && text.ends_with('\'')));
    quoted.then(|| Value::Str(text[1..text.len() - 1].to_owned()))
}
