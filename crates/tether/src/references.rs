//! Bookkeeping for object references a session has received from its engine.

use indexmap::IndexMap;

use crate::{
    engine::{ContextHandle, Engine},
    value::{ObjectRef, Value},
};

/// Object references handed out by the engine for one context.
///
/// Each reference pins something on the guest side. They all have to be
/// released before the context itself is torn down, which is the first step of
/// `Session::close`. Tracked by id, so a reference seen twice is released once.
#[derive(Debug, Default)]
pub struct ReferenceTracker {
    live: IndexMap<u64, ObjectRef>,
}

impl ReferenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` if it carries an object reference.
    pub fn track(&mut self, value: &Value) {
        if let Value::Object(reference) = value {
            self.live.entry(reference.id()).or_insert_with(|| reference.clone());
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Releases every tracked reference through `engine`, oldest first.
    /// Returns how many were released.
    pub fn release_all(&mut self, engine: &dyn Engine, ctx: ContextHandle) -> usize {
        let count = self.live.len();
        for (_, reference) in self.live.drain(..) {
            engine.release_reference(ctx, &reference);
        }
        count
    }
}
