/*!
 * System Limits and Constants
 *
 * Centralized location for service-wide limits and thresholds.
 */

/// Cap on the long-poll extension added on top of an invocation's call
/// timeout (1 minute). A single park never exceeds call timeout plus this,
/// so a stuck invocation is detected even during an indefinite wait.
pub const MAX_CALL_TIMEOUT_EXTENSION_MS: i64 = 60 * 1000;

/// Distinguished "no deadline" value for millisecond budgets. Budgets are
/// signed: a budget that went negative has expired, while the infinite
/// budget never decrements.
pub const INFINITE_MS: i64 = i64::MAX;

/// Worker threads of the default callback executor
pub const DEFAULT_ASYNC_WORKERS: usize = 4;

/// Task queue capacity of the default callback executor.
/// Submissions beyond this are rejected, never buffered unboundedly.
pub const DEFAULT_ASYNC_QUEUE_CAPACITY: usize = 1024;
