/*!
 * Completion Callbacks
 *
 * Singly-linked LIFO stack of `(callback, executor)` pairs attached to a
 * future, guarded by the future's monitor and drained wholesale on
 * terminal completion. Callbacks are always submitted to their executor,
 * never run inline on the completing or attaching thread.
 */

use super::executor::Executor;
use super::response::Payload;
use crate::core::errors::InvocationError;
use crate::core::types::InvocationResult;
use std::sync::Arc;

/// Callback invoked once with the terminal outcome of an invocation.
pub trait CompletionCallback: Send + 'static {
    fn on_response(&self, value: Option<Payload>);
    fn on_failure(&self, error: InvocationError);
}

struct FnCallback<F>(F);

impl<F> CompletionCallback for FnCallback<F>
where
    F: Fn(InvocationResult<Option<Payload>>) + Send + 'static,
{
    fn on_response(&self, value: Option<Payload>) {
        (self.0)(Ok(value));
    }

    fn on_failure(&self, error: InvocationError) {
        (self.0)(Err(error));
    }
}

/// Adapt a closure into a [`CompletionCallback`].
pub fn callback_fn<F>(f: F) -> Box<dyn CompletionCallback>
where
    F: Fn(InvocationResult<Option<Payload>>) + Send + 'static,
{
    Box::new(FnCallback(f))
}

struct CallbackNode {
    callback: Box<dyn CompletionCallback>,
    executor: Arc<dyn Executor>,
    next: Option<Box<CallbackNode>>,
}

/// Stack of pending callbacks. Nodes are immutable once linked; the whole
/// chain is detached in one move on completion.
#[derive(Default)]
pub(crate) struct CallbackChain {
    head: Option<Box<CallbackNode>>,
}

impl CallbackChain {
    pub fn push(&mut self, callback: Box<dyn CompletionCallback>, executor: Arc<dyn Executor>) {
        self.head = Some(Box::new(CallbackNode {
            callback,
            executor,
            next: self.head.take(),
        }));
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

impl Iterator for CallbackChain {
    type Item = (Box<dyn CompletionCallback>, Arc<dyn Executor>);

    /// Pops in LIFO order: attach order reversed.
    fn next(&mut self) -> Option<Self::Item> {
        let node = self.head.take()?;
        self.head = node.next;
        Some((node.callback, node.executor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::executor::{ExecutorError, Task};
    use parking_lot::Mutex;

    struct NoopExecutor;

    impl Executor for NoopExecutor {
        fn submit(&self, _task: Task) -> Result<(), ExecutorError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "noop"
        }
    }

    #[test]
    fn drains_in_reverse_attach_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let executor: Arc<dyn Executor> = Arc::new(NoopExecutor);

        let mut chain = CallbackChain::default();
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            chain.push(
                callback_fn(move |_| order.lock().push(tag)),
                executor.clone(),
            );
        }

        for (callback, _executor) in chain {
            callback.on_response(None);
        }

        assert_eq!(*order.lock(), vec!["third", "second", "first"]);
    }

    #[test]
    fn empty_after_drain() {
        let executor: Arc<dyn Executor> = Arc::new(NoopExecutor);
        let mut chain = CallbackChain::default();
        chain.push(callback_fn(|_| {}), executor);
        assert!(!chain.is_empty());

        assert!(chain.next().is_some());
        assert!(chain.is_empty());
    }
}
