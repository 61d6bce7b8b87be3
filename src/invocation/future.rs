/*!
 * Invocation Future
 *
 * The rendezvous between threads awaiting the reply of a dispatched
 * operation, the transport thread that delivers it, and user completion
 * callbacks.
 *
 * # Design
 *
 * The response slot is lock-free ([`ResponseSlot`]); the monitor (one
 * mutex plus one condvar) exists only to pair a terminal slot write with
 * waiter notification and callback detachment atomically. Waiters park in
 * bounded windows derived from the invocation's call timeout, so even an
 * indefinite wait can notice a dead peer: when a window elapses without a
 * reply, the waiter asks the liveness oracle whether the peer is still
 * executing the call and, if not, manufactures a timeout completion.
 *
 * Interrupts are deferred, not fatal: an interrupt observed while parked
 * is remembered and the wait keeps going until a response arrives or the
 * budget runs out; the thread's interrupt status is restored whenever the
 * final outcome is not itself an interrupt.
 */

use super::callbacks::{CallbackChain, CompletionCallback};
use super::executor::Executor;
use super::invocation::Invocation;
use super::response::{Payload, Response, ResponseSlot};
use super::service::ServiceContext;
use crate::core::errors::InvocationError;
use crate::core::interrupt::{self, ParkSite};
use crate::core::limits::{INFINITE_MS, MAX_CALL_TIMEOUT_EXTENSION_MS};
use crate::core::types::InvocationResult;
use log::{error, trace, warn};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monitor pairing slot transitions with waiter notification and
/// callback detachment. All attach/complete critical sections take the
/// mutex; parked waiters hold it only while blocked on the condvar.
struct Monitor {
    callbacks: Mutex<CallbackChain>,
    done: Condvar,
}

impl ParkSite for Monitor {
    fn unpark_all(&self) {
        let _guard = self.callbacks.lock();
        self.done.notify_all();
    }
}

pub struct InvocationFuture {
    context: Arc<ServiceContext>,
    invocation: Arc<Invocation>,
    /// When set, still-serialized payloads are decoded before being
    /// handed to waiters and callbacks.
    deserialize: bool,
    slot: ResponseSlot,
    monitor: Arc<Monitor>,
    /// Number of threads currently inside a wait; diagnostics only.
    waiter_count: AtomicU32,
    /// Whether any awaiting thread observed an interrupt during its wait.
    interrupted: AtomicBool,
}

impl InvocationFuture {
    pub fn new(
        context: Arc<ServiceContext>,
        invocation: Arc<Invocation>,
        deserialize: bool,
    ) -> Self {
        Self {
            context,
            invocation,
            deserialize,
            slot: ResponseSlot::new(),
            monitor: Arc::new(Monitor {
                callbacks: Mutex::new(CallbackChain::default()),
                done: Condvar::new(),
            }),
            waiter_count: AtomicU32::new(0),
            interrupted: AtomicBool::new(false),
        }
    }

    pub fn invocation(&self) -> &Arc<Invocation> {
        &self.invocation
    }

    /// `true` iff the slot holds a terminal value.
    pub fn is_done(&self) -> bool {
        self.slot.is_terminal()
    }

    /// In-flight work cannot be cancelled; only the surrounding retry
    /// machinery can decide to stop. Always returns `false`.
    pub fn cancel(&self, _may_interrupt_if_running: bool) -> bool {
        false
    }

    pub fn is_cancelled(&self) -> bool {
        false
    }

    /// Threads currently parked in a wait on this future.
    pub fn waiter_count(&self) -> u32 {
        self.waiter_count.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Completion gate
    // ------------------------------------------------------------------

    /// Offer a response. Can be called any number of times, but only the
    /// first terminal offer takes effect; later offers are discarded and
    /// return `false`.
    ///
    /// `None` is normalized to [`Response::NullReply`]. Offering
    /// [`Response::WaitAgain`] re-arms the future without completing it:
    /// callbacks stay attached, the invocation stays registered, and
    /// waiters pick the marker up on their next bounded poll (the gate
    /// does not notify for it).
    pub fn complete(&self, offered: Option<Response>) -> bool {
        let offered = Arc::new(offered.unwrap_or(Response::NullReply));

        let detached;
        {
            let mut callbacks = self.monitor.callbacks.lock();

            if let Some(current) = self.slot.read() {
                if current.is_terminal() {
                    // late duplicate, e.g. a response racing a member-left
                    // failure; keep the first and make sure the registry
                    // forgets the call
                    trace!(
                        "response already set for {}: current {:?}, offered {:?}",
                        self.invocation,
                        current,
                        offered
                    );
                    self.context.registry().deregister(&self.invocation);
                    return false;
                }
            }

            self.slot.store(offered.clone());

            if offered.is_wait_again() {
                return true;
            }

            detached = std::mem::take(&mut *callbacks);
            self.monitor.done.notify_all();
            self.context.registry().deregister(&self.invocation);
        }

        // executors may be slow or saturated; submission stays outside
        // the monitor
        for (callback, executor) in detached {
            self.submit_callback(callback, executor, offered.clone());
        }
        true
    }

    // ------------------------------------------------------------------
    // Callbacks
    // ------------------------------------------------------------------

    /// Attach a callback on the service's default executor.
    pub fn attach(&self, callback: Box<dyn CompletionCallback>) {
        self.attach_via(callback, self.context.async_executor().clone());
    }

    /// Attach a callback to run on `executor` once the future completes.
    /// If it already has, the callback is submitted right away, still via
    /// the executor and never inline on the attaching thread.
    pub fn attach_via(&self, callback: Box<dyn CompletionCallback>, executor: Arc<dyn Executor>) {
        let mut callbacks = self.monitor.callbacks.lock();

        if let Some(current) = self.slot.read() {
            if current.is_terminal() {
                drop(callbacks);
                self.submit_callback(callback, executor, current);
                return;
            }
        }

        callbacks.push(callback, executor);
    }

    fn submit_callback(
        &self,
        callback: Box<dyn CompletionCallback>,
        executor: Arc<dyn Executor>,
        response: Arc<Response>,
    ) {
        let invocation = self.invocation.clone();
        let deserialize = self.deserialize;
        let task = Box::new(move || match resolve(&invocation, deserialize, &response) {
            Ok(value) => callback.on_response(value),
            Err(err) => callback.on_failure(err),
        });

        if let Err(rejected) = executor.submit(task) {
            warn!("callback for {} rejected: {}", self.invocation, rejected);
        }
    }

    // ------------------------------------------------------------------
    // Await engine
    // ------------------------------------------------------------------

    /// Wait without a deadline for the invocation's outcome.
    pub fn get(&self) -> InvocationResult<Option<Payload>> {
        let response = self.wait_for_response(None);
        if matches!(*response, Response::DeadlineExceeded) {
            // an unbounded wait has no budget to exhaust
            error!("unexpected timeout while waiting on {:?}", self);
            return Ok(None);
        }
        resolve(&self.invocation, self.deserialize, &response)
    }

    /// Bounded wait. A zero timeout performs one non-blocking probe.
    pub fn wait_timeout(&self, timeout: Duration) -> InvocationResult<Option<Payload>> {
        let response = self.wait_for_response(Some(timeout));
        resolve(&self.invocation, self.deserialize, &response)
    }

    /// Unchecked variant of [`get`](Self::get).
    ///
    /// # Panics
    ///
    /// Panics if the invocation failed.
    pub fn join(&self) -> Option<Payload> {
        match self.get() {
            Ok(value) => value,
            Err(err) => panic!("invocation {} failed: {err}", self.invocation),
        }
    }

    /// Core wait loop: park in bounded windows, clear wait-again markers,
    /// defer interrupts, and escalate to the liveness oracle when long
    /// polling. Returns the raw slot value, or `DeadlineExceeded` when
    /// the caller's budget ran out.
    fn wait_for_response(&self, timeout: Option<Duration>) -> Arc<Response> {
        if let Some(response) = self.slot.read() {
            if response.is_terminal() {
                return response;
            }
        }

        self.waiter_count.fetch_add(1, Ordering::Relaxed);
        let _waiter = WaiterGuard(&self.waiter_count);
        let _park = interrupt::park_scope(self.monitor.clone() as Arc<dyn ParkSite>);

        let budget_ms = to_millis_clamped(timeout);
        let wait_start = Instant::now();
        let max_poll_ms = self.max_poll_ms();
        let long_polling = budget_ms > max_poll_ms;
        let mut remaining_ms = budget_ms;
        let mut poll_count: i64 = 0;

        // a budget that went negative has expired; a zero budget still
        // buys one non-blocking probe
        while remaining_ms >= 0 {
            let poll_ms = max_poll_ms.min(remaining_ms);
            let poll_start = Instant::now();
            poll_count += 1;

            if self.park_for(poll_ms) {
                self.interrupted.store(true, Ordering::Release);
            }
            let last_poll_ms = elapsed_ms(poll_start);
            remaining_ms = remaining_budget(budget_ms, elapsed_ms(wait_start));

            if let Some(response) = self.slot.read() {
                if response.is_wait_again() {
                    self.slot.clear_wait_again(&response);
                    continue;
                }
                // an interrupt observed along the way is deferred, not
                // dropped: restore it unless the outcome is the interrupt
                if self.interrupted.load(Ordering::Acquire)
                    && !matches!(*response, Response::Interrupted)
                {
                    interrupt::set_interrupted();
                }
                return response;
            }

            if !self.interrupted.load(Ordering::Acquire) && long_polling {
                let target = self.invocation.target();
                if self.invocation.is_remote() && target == self.invocation.local_address() {
                    // target flipped to this member mid-migration; the
                    // retry machinery will re-dispatch
                    continue;
                }

                warn!("no response for {} ms: {:?}", last_poll_ms, self);
                if !self.context.liveness().is_executing(&self.invocation) {
                    let failure = self
                        .invocation
                        .new_timeout_failure(poll_count.saturating_mul(poll_ms));
                    if self.slot.read().is_some() {
                        continue;
                    }
                    self.complete(Some(Response::failure(failure)));
                }
            }
        }

        if self.interrupted.load(Ordering::Acquire) {
            interrupt::set_interrupted();
        }
        Arc::new(Response::DeadlineExceeded)
    }

    /// Park until the slot is non-empty or `poll_ms` elapses. Returns
    /// `true` if the park was cut short by an interrupt (consuming the
    /// thread's interrupt status, like a wait that throws).
    fn park_for(&self, poll_ms: i64) -> bool {
        if poll_ms <= 0 || !self.slot.is_empty() {
            return false;
        }

        let start = Instant::now();
        let mut callbacks = self.monitor.callbacks.lock();
        loop {
            if !self.slot.is_empty() {
                return false;
            }
            if interrupt::take_interrupted() {
                return true;
            }
            let elapsed = elapsed_ms(start);
            if elapsed >= poll_ms {
                return false;
            }
            self.monitor
                .done
                .wait_for(&mut callbacks, Duration::from_millis((poll_ms - elapsed) as u64));
        }
    }

    /// Longest single park: call timeout plus a capped extension, so a
    /// reply that is merely late is not preempted by the probe, while a
    /// stuck invocation is still noticed.
    fn max_poll_ms(&self) -> i64 {
        let call_timeout = self.invocation.call_timeout_ms();
        if call_timeout <= 0 {
            return INFINITE_MS;
        }
        call_timeout.saturating_add(call_timeout.min(MAX_CALL_TIMEOUT_EXTENSION_MS))
    }
}

impl fmt::Debug for InvocationFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationFuture")
            .field("invocation", &format_args!("{}", self.invocation))
            .field("response", &self.slot.read())
            .field("done", &self.is_done())
            .finish()
    }
}

struct WaiterGuard<'a>(&'a AtomicU32);

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Map a raw slot value to the outcome a waiter or callback sees.
fn resolve(
    invocation: &Invocation,
    deserialize: bool,
    response: &Response,
) -> InvocationResult<Option<Payload>> {
    match response {
        Response::WaitAgain => unreachable!("wait-again is cleared before resolution"),
        Response::NullReply => Ok(None),
        Response::DeadlineExceeded => Err(InvocationError::Timeout {
            invocation: invocation.to_string(),
        }),
        Response::Interrupted => Err(InvocationError::Interrupted {
            invocation: invocation.to_string(),
        }),
        Response::Failure(failure) => Err(InvocationError::Execution(failure.stitch_local_trace())),
        Response::Payload(Payload::Serialized(data)) if deserialize => {
            match invocation.deserialize(data) {
                Ok(None) => Ok(None),
                Ok(Some(value)) => Ok(Some(Payload::Value(value))),
                Err(source) => Err(InvocationError::Codec {
                    invocation: invocation.to_string(),
                    source,
                }),
            }
        }
        Response::Payload(payload) => Ok(Some(payload.clone())),
    }
}

fn to_millis_clamped(timeout: Option<Duration>) -> i64 {
    match timeout {
        None => INFINITE_MS,
        Some(duration) => i64::try_from(duration.as_millis()).unwrap_or(INFINITE_MS),
    }
}

/// Budget left out of `budget_ms` after `elapsed_ms` of waiting. The
/// infinite budget never decrements; a finite one goes negative once the
/// wall clock passes it, which is what ends the wait loop.
fn remaining_budget(budget_ms: i64, elapsed_ms: i64) -> i64 {
    if budget_ms == INFINITE_MS {
        budget_ms
    } else {
        budget_ms.saturating_sub(elapsed_ms)
    }
}

fn elapsed_ms(start: Instant) -> i64 {
    i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Address;
    use serde_json::json;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn future(call_timeout_ms: i64) -> InvocationFuture {
        let context = Arc::new(ServiceContext::with_defaults());
        let invocation = Arc::new(Invocation::new(
            context.registry().next_call_id(),
            "map.get",
            addr("10.0.0.2:5701"),
            addr("10.0.0.1:5701"),
            call_timeout_ms,
        ));
        context.registry().register(invocation.clone());
        InvocationFuture::new(context, invocation, false)
    }

    #[test]
    fn completed_future_resolves_on_the_fast_path() {
        let fut = future(0);
        assert!(fut.complete(Some(Response::value(json!("ok")))));
        assert!(fut.is_done());
        assert_eq!(
            fut.get().unwrap(),
            Some(Payload::Value(json!("ok")))
        );
    }

    #[test]
    fn budget_preserves_infinity_and_expires_past_zero() {
        assert_eq!(remaining_budget(INFINITE_MS, 10_000), INFINITE_MS);
        assert_eq!(remaining_budget(100, 30), 70);
        assert!(remaining_budget(100, 300) < 0);
    }

    #[test]
    fn max_poll_extension_is_capped() {
        assert_eq!(future(0).max_poll_ms(), INFINITE_MS);
        assert_eq!(future(10_000).max_poll_ms(), 20_000);
        assert_eq!(future(500_000).max_poll_ms(), 560_000);
    }

    #[test]
    fn zero_timeout_is_a_single_probe() {
        let fut = future(0);
        let outcome = fut.wait_timeout(Duration::ZERO);
        assert!(outcome.is_err_and(|err| err.is_timeout()));
        assert!(!fut.is_done());
    }
}
