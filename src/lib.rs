/*!
 * opcall
 * Core of a distributed operation-call service: invocation futures with
 * liveness-aware blocking waits, completion callbacks, and an in-flight
 * invocation registry.
 */

pub mod core;
pub mod invocation;

pub use crate::core::errors::{FailureKind, InvocationError, RemoteFailure};
pub use crate::core::types::{Address, CallId, InvocationResult, Value};
pub use invocation::callbacks::{callback_fn, CompletionCallback};
pub use invocation::executor::{Executor, ExecutorError, Task, ThreadPoolExecutor};
pub use invocation::future::InvocationFuture;
pub use invocation::invocation::Invocation;
pub use invocation::liveness::{AlwaysExecuting, FixedLiveness, LivenessOracle};
pub use invocation::registry::InvocationRegistry;
pub use invocation::response::{Payload, Response};
pub use invocation::service::ServiceContext;
