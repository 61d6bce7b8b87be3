/*!
 * Invocation Domain
 *
 * An invocation is a logical request dispatched to a cluster peer. Its
 * future is the rendezvous between threads awaiting the reply, the
 * transport thread delivering it, and user completion callbacks.
 */

pub mod callbacks;
pub mod executor;
pub mod future;
pub mod invocation;
pub mod liveness;
pub mod registry;
pub mod response;
pub mod service;

pub use callbacks::{callback_fn, CompletionCallback};
pub use executor::{Executor, ExecutorError, Task, ThreadPoolExecutor};
pub use future::InvocationFuture;
pub use invocation::Invocation;
pub use liveness::{AlwaysExecuting, FixedLiveness, LivenessOracle};
pub use registry::InvocationRegistry;
pub use response::{Payload, Response, ResponseSlot};
pub use service::ServiceContext;
