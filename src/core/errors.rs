/*!
 * Error Types
 * Centralized error handling with thiserror
 *
 * Two layers: `RemoteFailure` is the wire-level failure carrier a peer
 * completes an invocation with; `InvocationError` is what waiters see.
 */

use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use thiserror::Error;

/// Marker separating the remote frames from the awaiting thread's frames
/// in a stitched trace.
const STITCH_MARKER: &str = "------ awaiting thread ------";

/// Classification of a remote failure carrier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The operation raised an error on the executing member
    Remote,
    /// The invocation machinery gave up on a silent peer
    OperationTimeout,
}

/// Throwable-like failure carrier delivered as a completion value.
///
/// Carries the original message, an optional cause chain, and the stack
/// frames captured at the failure site. The frames cross the wire as
/// plain strings; the awaiting side splices its own frames underneath
/// before surfacing the failure (see [`RemoteFailure::stitch_local_trace`]).
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct RemoteFailure {
    message: String,
    kind: FailureKind,
    #[source]
    cause: Option<Box<RemoteFailure>>,
    trace: Vec<String>,
}

impl RemoteFailure {
    /// Failure raised by the operation on the executing member
    pub fn remote(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FailureKind::Remote,
            cause: None,
            trace: Vec::new(),
        }
    }

    /// Timeout synthesized when a peer stopped executing the invocation
    pub fn operation_timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FailureKind::OperationTimeout,
            cause: None,
            trace: Vec::new(),
        }
    }

    pub fn with_cause(mut self, cause: RemoteFailure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_trace(mut self, frames: Vec<String>) -> Self {
        self.trace = frames;
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn cause(&self) -> Option<&RemoteFailure> {
        self.cause.as_deref()
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    pub fn is_operation_timeout(&self) -> bool {
        self.kind == FailureKind::OperationTimeout
    }

    /// Splice the calling thread's frames under the original failure site.
    ///
    /// A failure that crossed a thread or wire boundary has lost the
    /// context of whoever is about to observe it; the stitched copy keeps
    /// the original frames on top and appends the awaiting thread's
    /// frames below a marker line.
    pub fn stitch_local_trace(&self) -> Self {
        let mut stitched = self.clone();
        stitched.trace.push(STITCH_MARKER.to_string());
        let local = Backtrace::force_capture().to_string();
        stitched
            .trace
            .extend(local.lines().map(|line| line.trim_end().to_string()));
        stitched
    }
}

/// Errors surfaced to threads waiting on an invocation future
#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("call {invocation} timed out waiting for a response")]
    Timeout { invocation: String },

    #[error("call {invocation} was interrupted while waiting")]
    Interrupted { invocation: String },

    #[error("remote execution failed: {0}")]
    Execution(#[from] RemoteFailure),

    #[error("failed to decode response for call {invocation}")]
    Codec {
        invocation: String,
        #[source]
        source: serde_json::Error,
    },
}

impl InvocationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, InvocationError::Timeout { .. })
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, InvocationError::Interrupted { .. })
    }
}
