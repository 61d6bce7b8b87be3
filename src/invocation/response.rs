/*!
 * Response Slot
 *
 * Atomic, write-once-with-sentinels cell holding the current reply of an
 * invocation.
 *
 * # Design: ArcSwap Over Mutex
 *
 * The slot is read on every fast path (`is_done`, the pre-park probe, the
 * post-wake check), so reads must not contend with the monitor. An
 * `ArcSwapOption` gives zero-contention atomic loads with acquire/release
 * publication of the referenced response, and pointer-identity
 * compare-and-swap for the one non-terminal reset the protocol needs
 * (`WaitAgain` back to empty).
 */

use crate::core::errors::RemoteFailure;
use crate::core::types::Value;
use arc_swap::ArcSwapOption;
use bytes::Bytes;
use std::sync::Arc;

/// Successful reply payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Decoded domain value
    Value(Value),
    /// Still-encoded reply bytes; decoded lazily by deserializing futures
    Serialized(Bytes),
}

/// The current content of a future's response slot.
///
/// `WaitAgain` is the only non-terminal variant: a waiter that observes it
/// clears the slot back to empty and re-arms its wait. Everything else is
/// terminal and never overwritten.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// The peer is still working; re-arm the wait
    WaitAgain,
    /// The operation completed without producing a value
    NullReply,
    /// Installed by the invocation machinery when the caller gave up
    Interrupted,
    /// Internal marker for an exhausted wait budget; never stored
    DeadlineExceeded,
    /// Successful reply
    Payload(Payload),
    /// Failure carrier from the executing member
    Failure(RemoteFailure),
}

impl Response {
    pub fn value(value: Value) -> Self {
        Response::Payload(Payload::Value(value))
    }

    pub fn serialized(data: Bytes) -> Self {
        Response::Payload(Payload::Serialized(data))
    }

    pub fn failure(failure: RemoteFailure) -> Self {
        Response::Failure(failure)
    }

    pub fn is_wait_again(&self) -> bool {
        matches!(self, Response::WaitAgain)
    }

    /// Everything but `WaitAgain` is terminal (an empty slot is `None`
    /// at the [`ResponseSlot`] level).
    pub fn is_terminal(&self) -> bool {
        !self.is_wait_again()
    }
}

/// Lock-free cell holding the invocation's current response.
pub struct ResponseSlot {
    cell: ArcSwapOption<Response>,
}

impl ResponseSlot {
    pub fn new() -> Self {
        Self {
            cell: ArcSwapOption::const_empty(),
        }
    }

    /// Non-blocking read of the current cell content.
    pub fn read(&self) -> Option<Arc<Response>> {
        self.cell.load_full()
    }

    pub fn is_empty(&self) -> bool {
        self.cell.load().is_none()
    }

    /// `true` iff the slot holds a terminal value.
    pub fn is_terminal(&self) -> bool {
        self.read().is_some_and(|response| response.is_terminal())
    }

    /// Unconditional store. Callers serialize terminal writes through the
    /// future's monitor; the slot itself only guarantees publication.
    pub fn store(&self, response: Arc<Response>) {
        self.cell.store(Some(response));
    }

    /// Reset `WaitAgain` back to empty, by identity: the clear only takes
    /// effect if the slot still holds exactly the observed response.
    pub fn clear_wait_again(&self, observed: &Arc<Response>) {
        self.cell.compare_and_swap(observed, None);
    }
}

impl Default for ResponseSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wait_again_is_the_only_non_terminal_response() {
        assert!(!Response::WaitAgain.is_terminal());
        assert!(Response::NullReply.is_terminal());
        assert!(Response::Interrupted.is_terminal());
        assert!(Response::DeadlineExceeded.is_terminal());
        assert!(Response::value(json!(1)).is_terminal());
        assert!(Response::failure(RemoteFailure::remote("boom")).is_terminal());
    }

    #[test]
    fn clear_wait_again_resets_the_observed_response() {
        let slot = ResponseSlot::new();
        let wait_again = Arc::new(Response::WaitAgain);
        slot.store(wait_again.clone());

        let observed = slot.read().unwrap();
        slot.clear_wait_again(&observed);
        assert!(slot.is_empty());
    }

    #[test]
    fn clear_wait_again_is_by_identity_not_value() {
        let slot = ResponseSlot::new();
        let stale = Arc::new(Response::WaitAgain);
        slot.store(Arc::new(Response::WaitAgain));

        // equal in value, different allocation: must not clear
        slot.clear_wait_again(&stale);
        assert!(!slot.is_empty());
    }

    #[test]
    fn clear_wait_again_never_clobbers_a_terminal_write() {
        let slot = ResponseSlot::new();
        let wait_again = Arc::new(Response::WaitAgain);
        slot.store(wait_again.clone());

        let observed = slot.read().unwrap();
        slot.store(Arc::new(Response::value(json!("late"))));

        slot.clear_wait_again(&observed);
        assert_eq!(
            slot.read().as_deref(),
            Some(&Response::value(json!("late")))
        );
    }
}
