/*!
 * Core Types
 * Common types used across the operation-call service
 */

/// Correlation id of an invocation
pub type CallId = u64;

/// Cluster member address
pub type Address = std::net::SocketAddr;

/// Decoded domain value carried by a response
pub type Value = serde_json::Value;

/// Common result type for invocation operations
pub type InvocationResult<T> = Result<T, super::errors::InvocationError>;
