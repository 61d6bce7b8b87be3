/*!
 * Invocation Handle
 *
 * Identity and call parameters of a single dispatched operation. The
 * dispatch and retry machinery owns the lifecycle; the future only reads
 * the call parameters and asks for synthesized failures.
 */

use crate::core::errors::RemoteFailure;
use crate::core::types::{Address, CallId, Value};
use bytes::Bytes;
use parking_lot::RwLock;
use std::fmt;

pub struct Invocation {
    call_id: CallId,
    operation: String,
    /// Retries may re-target the invocation, e.g. after a partition
    /// migration, so the target is read per poll rather than once.
    target: RwLock<Address>,
    local: Address,
    remote: bool,
    call_timeout_ms: i64,
}

impl Invocation {
    /// `call_timeout_ms <= 0` means the invocation carries no call
    /// timeout and waits are bounded only by the caller's own budget.
    pub fn new(
        call_id: CallId,
        operation: impl Into<String>,
        target: Address,
        local: Address,
        call_timeout_ms: i64,
    ) -> Self {
        Self {
            call_id,
            operation: operation.into(),
            remote: target != local,
            target: RwLock::new(target),
            local,
            call_timeout_ms,
        }
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn target(&self) -> Address {
        *self.target.read()
    }

    /// Re-target the invocation; used by the retry machinery.
    pub fn set_target(&self, target: Address) {
        *self.target.write() = target;
    }

    pub fn local_address(&self) -> Address {
        self.local
    }

    /// Whether the invocation was dispatched to another member. Stays
    /// `true` across re-targeting.
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    pub fn call_timeout_ms(&self) -> i64 {
        self.call_timeout_ms
    }

    /// Failure installed when the liveness probe reports the peer is no
    /// longer executing this invocation.
    pub fn new_timeout_failure(&self, total_poll_ms: i64) -> RemoteFailure {
        RemoteFailure::operation_timeout(format!(
            "call {} got no response after {} ms of polling",
            self, total_poll_ms
        ))
    }

    /// Decode a still-serialized reply. A decoded `null` is a valid
    /// absent value, not an error.
    pub fn deserialize(&self, data: &Bytes) -> Result<Option<Value>, serde_json::Error> {
        let value: Value = serde_json::from_slice(data)?;
        Ok(match value {
            Value::Null => None,
            value => Some(value),
        })
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[id={}, target={}]",
            self.operation,
            self.call_id,
            self.target()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn invocation() -> Invocation {
        Invocation::new(
            7,
            "map.get",
            addr("10.0.0.2:5701"),
            addr("10.0.0.1:5701"),
            60_000,
        )
    }

    #[test]
    fn remote_flag_survives_retargeting() {
        let inv = invocation();
        assert!(inv.is_remote());

        inv.set_target(addr("10.0.0.1:5701"));
        assert!(inv.is_remote());
        assert_eq!(inv.target(), inv.local_address());
    }

    #[test]
    fn local_invocation_is_not_remote() {
        let local = addr("10.0.0.1:5701");
        let inv = Invocation::new(1, "map.put", local, local, 0);
        assert!(!inv.is_remote());
    }

    #[test]
    fn deserialize_null_is_absent() {
        let inv = invocation();
        assert_eq!(inv.deserialize(&Bytes::from_static(b"null")).unwrap(), None);
        assert_eq!(
            inv.deserialize(&Bytes::from_static(b"{\"n\":5}")).unwrap(),
            Some(json!({"n": 5}))
        );
        assert!(inv.deserialize(&Bytes::from_static(b"not json")).is_err());
    }

    #[test]
    fn timeout_failure_references_the_call() {
        let inv = invocation();
        let failure = inv.new_timeout_failure(1200);
        assert!(failure.is_operation_timeout());
        assert!(failure.message().contains("map.get"));
        assert!(failure.message().contains("1200 ms"));
    }
}
