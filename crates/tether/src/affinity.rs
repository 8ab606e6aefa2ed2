//! Thread affinity for interpreter contexts.
//!
//! An interpreter context keeps per-thread state inside the engine, so it may
//! only ever be touched from the thread that created it, and a thread may host
//! at most one live context at a time. [`ThreadRegistry`] records which threads
//! currently host a context; [`check`] is the gate every session operation
//! passes before crossing into the engine.

use std::{
    collections::HashSet,
    sync::{Arc, OnceLock},
    thread::ThreadId,
};

use parking_lot::Mutex;

use crate::{error::SessionError, session::Lifecycle};

/// The registry shared by every session created through `Session::new`.
static GLOBAL_REGISTRY: OnceLock<Arc<ThreadRegistry>> = OnceLock::new();

/// Set of threads that currently host a live interpreter context.
///
/// A thread is added when a session initializes on it and removed when that
/// session closes. A session that is never closed keeps its thread marked for
/// the life of the registry, so any later attempt to create a session on that
/// thread fails with [`SessionError::ThreadReuse`].
///
/// The process-wide instance is [`ThreadRegistry::global`]; tests and embedders
/// that want isolation can build their own with [`ThreadRegistry::new`] and
/// pass it to `Session::with_engine`.
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    hosting: Mutex<HashSet<ThreadId>>,
}

impl ThreadRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL_REGISTRY.get_or_init(|| Arc::new(Self::new())))
    }

    /// Marks `thread` as hosting a context.
    ///
    /// Fails with [`SessionError::ThreadReuse`] if it already hosts one.
    pub fn claim(&self, thread: ThreadId) -> Result<(), SessionError> {
        if self.hosting.lock().insert(thread) {
            Ok(())
        } else {
            tracing::warn!(?thread, "refusing to host a second interpreter context on thread");
            Err(SessionError::ThreadReuse { thread })
        }
    }

    /// Clears the hosting mark for `thread`. Returns whether it was set.
    pub fn release(&self, thread: ThreadId) -> bool {
        self.hosting.lock().remove(&thread)
    }

    /// Whether `thread` currently hosts a context.
    #[must_use]
    pub fn is_hosting(&self, thread: ThreadId) -> bool {
        self.hosting.lock().contains(&thread)
    }

    /// Number of threads currently hosting a context.
    #[must_use]
    pub fn hosting_count(&self) -> usize {
        self.hosting.lock().len()
    }
}

/// Verifies that `caller` may operate on a session in `lifecycle` owned by `owner`.
///
/// Checks, in order: the caller is the owning thread, the session is not
/// closed, the session acquired a context. A session that never initialized
/// has no owner and reports [`SessionError::Uninitialized`] to any caller.
pub fn check(lifecycle: Lifecycle, owner: Option<ThreadId>, caller: ThreadId) -> Result<(), SessionError> {
    if let Some(owner) = owner
        && owner != caller
    {
        return Err(SessionError::InvalidThread { owner, caller });
    }
    match lifecycle {
        Lifecycle::Initialized => Ok(()),
        Lifecycle::Closed => Err(SessionError::Closed),
        Lifecycle::Uninitialized => Err(SessionError::Uninitialized),
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn other_thread_id() -> ThreadId {
        thread::spawn(|| thread::current().id()).join().unwrap()
    }

    #[test]
    fn claim_then_reclaim_fails_until_released() {
        let registry = ThreadRegistry::new();
        let me = thread::current().id();

        registry.claim(me).unwrap();
        assert!(registry.is_hosting(me));
        assert!(matches!(registry.claim(me), Err(SessionError::ThreadReuse { thread }) if thread == me));

        assert!(registry.release(me));
        assert!(!registry.is_hosting(me));
        registry.claim(me).unwrap();
    }

    #[test]
    fn release_is_idempotent() {
        let registry = ThreadRegistry::new();
        let me = thread::current().id();
        registry.claim(me).unwrap();
        assert!(registry.release(me));
        assert!(!registry.release(me));
        assert_eq!(registry.hosting_count(), 0);
    }

    #[test]
    fn concurrent_claims_from_distinct_threads_all_succeed() {
        let registry = Arc::new(ThreadRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let me = thread::current().id();
                    registry.claim(me).unwrap();
                    assert!(registry.claim(me).is_err());
                    me
                })
            })
            .collect();
        let ids: Vec<ThreadId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registry.hosting_count(), 16);
        for id in ids {
            assert!(registry.release(id));
        }
        assert_eq!(registry.hosting_count(), 0);
    }

    #[test]
    fn check_rejects_foreign_thread_before_lifecycle() {
        let owner = thread::current().id();
        let caller = other_thread_id();
        for lifecycle in [Lifecycle::Initialized, Lifecycle::Closed] {
            let err = check(lifecycle, Some(owner), caller).unwrap_err();
            assert!(matches!(err, SessionError::InvalidThread { .. }), "got {err:?}");
        }
    }

    #[test]
    fn check_reports_lifecycle_on_owning_thread() {
        let me = thread::current().id();
        check(Lifecycle::Initialized, Some(me), me).unwrap();
        assert!(matches!(check(Lifecycle::Closed, Some(me), me), Err(SessionError::Closed)));
        assert!(matches!(
            check(Lifecycle::Uninitialized, None, me),
            Err(SessionError::Uninitialized)
        ));
        assert!(matches!(check(Lifecycle::Closed, None, me), Err(SessionError::Closed)));
    }
}
