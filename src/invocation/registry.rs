/*!
 * Invocation Registry
 * Tracks in-flight invocations by call id
 */

use super::invocation::Invocation;
use crate::core::types::CallId;
use dashmap::DashMap;
use log::trace;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Concurrent map of in-flight invocations. Completion deregisters
/// exactly once per terminal outcome; late duplicates are no-ops.
pub struct InvocationRegistry {
    inflight: DashMap<CallId, Arc<Invocation>, ahash::RandomState>,
    sequence: AtomicU64,
}

impl InvocationRegistry {
    pub fn new() -> Self {
        Self {
            inflight: DashMap::with_hasher(ahash::RandomState::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Next correlation id for a dispatched invocation.
    pub fn next_call_id(&self) -> CallId {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn register(&self, invocation: Arc<Invocation>) {
        self.inflight.insert(invocation.call_id(), invocation);
    }

    /// Idempotent: returns `true` only if the invocation was still
    /// registered.
    pub fn deregister(&self, invocation: &Invocation) -> bool {
        let removed = self.inflight.remove(&invocation.call_id()).is_some();
        if removed {
            trace!("deregistered {}", invocation);
        }
        removed
    }

    pub fn get(&self, call_id: CallId) -> Option<Arc<Invocation>> {
        self.inflight.get(&call_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}

impl Default for InvocationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
