/*!
 * Remote Liveness Oracle
 *
 * Long-polling waiters ask the oracle whether the peer is still executing
 * an invocation before manufacturing a timeout. The probe itself (an
 * is-still-running protocol round trip) lives outside this crate.
 */

use super::invocation::Invocation;
use std::sync::atomic::{AtomicBool, Ordering};

pub trait LivenessOracle: Send + Sync {
    fn is_executing(&self, invocation: &Invocation) -> bool;
}

/// Treats every peer as live. The safe default until a real probe is
/// wired in: long polls then never synthesize timeouts on their own.
pub struct AlwaysExecuting;

impl LivenessOracle for AlwaysExecuting {
    fn is_executing(&self, _invocation: &Invocation) -> bool {
        true
    }
}

/// Settable oracle for tests and controlled environments.
pub struct FixedLiveness {
    executing: AtomicBool,
}

impl FixedLiveness {
    pub fn new(executing: bool) -> Self {
        Self {
            executing: AtomicBool::new(executing),
        }
    }

    pub fn set(&self, executing: bool) {
        self.executing.store(executing, Ordering::Release);
    }
}

impl LivenessOracle for FixedLiveness {
    fn is_executing(&self, _invocation: &Invocation) -> bool {
        self.executing.load(Ordering::Acquire)
    }
}
