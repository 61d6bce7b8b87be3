/*!
 * Service Context
 * Shared collaborators handed to every invocation future
 */

use super::executor::{Executor, ThreadPoolExecutor};
use super::future::InvocationFuture;
use super::invocation::Invocation;
use super::liveness::{AlwaysExecuting, LivenessOracle};
use super::registry::InvocationRegistry;
use crate::core::limits::{DEFAULT_ASYNC_QUEUE_CAPACITY, DEFAULT_ASYNC_WORKERS};
use std::sync::Arc;

/// The slice of the operation service a future needs: the in-flight
/// registry, the liveness oracle, and the default callback executor.
pub struct ServiceContext {
    registry: Arc<InvocationRegistry>,
    liveness: Arc<dyn LivenessOracle>,
    async_executor: Arc<dyn Executor>,
}

impl ServiceContext {
    pub fn new(
        registry: Arc<InvocationRegistry>,
        liveness: Arc<dyn LivenessOracle>,
        async_executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            registry,
            liveness,
            async_executor,
        }
    }

    /// Fresh registry, always-live oracle, and a default thread-pool
    /// executor for callbacks.
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(InvocationRegistry::new()),
            Arc::new(AlwaysExecuting),
            Arc::new(ThreadPoolExecutor::new(
                "opcall-async",
                DEFAULT_ASYNC_WORKERS,
                DEFAULT_ASYNC_QUEUE_CAPACITY,
            )),
        )
    }

    pub fn registry(&self) -> &Arc<InvocationRegistry> {
        &self.registry
    }

    pub fn liveness(&self) -> &Arc<dyn LivenessOracle> {
        &self.liveness
    }

    pub fn async_executor(&self) -> &Arc<dyn Executor> {
        &self.async_executor
    }

    /// Register the invocation and hand out its future.
    pub fn new_future(
        self: &Arc<Self>,
        invocation: Arc<Invocation>,
        deserialize: bool,
    ) -> Arc<InvocationFuture> {
        self.registry.register(invocation.clone());
        Arc::new(InvocationFuture::new(self.clone(), invocation, deserialize))
    }
}
