//! Circuit breaker registry (C4).
//!
//! One [`Breaker`] per destination `NodeId`, created lazily and retained for
//! the life of the transport. A breaker is a closed/open/half-open state
//! machine: it opens after `failure_threshold` consecutive failures, stays
//! open for a backoff window that doubles (capped) on each failed probe,
//! then allows exactly one half-open probe per window.

use raft_proto::NodeId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: State,
    consec_failures: u32,
    successes: u64,
    backoff: Duration,
    opened_at: Option<Instant>,
}

/// Failure-isolation device protecting outbound connect attempts to one
/// destination. Cheap to clone; clones share the same underlying state.
#[derive(Debug, Clone)]
pub struct Breaker {
    inner: Arc<Mutex<Inner>>,
    failure_threshold: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

/// A point-in-time read of a breaker's failure-streak counters, taken at the
/// top of a connect attempt so the log-suppression heuristic in
/// `just_recovered` sees the state from *before* this attempt's outcome.
#[derive(Debug, Clone, Copy)]
pub struct BreakerCounters {
    pub successes: u64,
    pub consec_failures: u32,
}

impl BreakerCounters {
    /// True if this connect attempt is either the very first success this
    /// breaker has ever recorded, or follows a failure streak. Used to
    /// suppress the "stream established" info log on routine steady-state
    /// reconnects while still logging real recoveries.
    pub fn just_recovered(&self) -> bool {
        self.successes == 0 || self.consec_failures > 0
    }
}

impl Breaker {
    fn new(failure_threshold: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Closed,
                consec_failures: 0,
                successes: 0,
                backoff: initial_backoff,
                opened_at: None,
            })),
            failure_threshold,
            initial_backoff,
            max_backoff,
        }
    }

    /// Snapshots `successes` and `consec_failures` without changing state.
    /// Callers use this once at the top of a connect attempt (see the design
    /// note on why `Ready` is not re-checked here).
    pub fn counters(&self) -> BreakerCounters {
        let inner = self.inner.lock().unwrap();
        BreakerCounters {
            successes: inner.successes,
            consec_failures: inner.consec_failures,
        }
    }

    /// True if a caller may attempt to use this destination right now.
    /// Transitions `Open` -> `HalfOpen` when the backoff window has elapsed,
    /// allowing exactly one probe through until that probe resolves.
    pub fn ready(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed | State::HalfOpen => true,
            State::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed() >= inner.backoff)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.successes += 1;
        inner.consec_failures = 0;
        inner.state = State::Closed;
        inner.backoff = self.initial_backoff;
        inner.opened_at = None;
    }

    pub fn fail(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consec_failures += 1;
        if inner.state == State::HalfOpen {
            // The probe failed: double the backoff (capped) before the next one.
            inner.backoff = (inner.backoff * 2).min(self.max_backoff);
        }
        if inner.consec_failures >= self.failure_threshold {
            inner.state = State::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    /// Runs `f` only if `ready()`. The connect attempt inside `f` *is* the
    /// half-open probe, so `Call` is appropriate for one-shot paths like
    /// `SendSnapshot` where there is no separate owner of the probe.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.ready() {
            return Err(CallError::Open);
        }
        match f().await {
            Ok(v) => {
                self.success();
                Ok(v)
            }
            Err(e) => {
                self.fail();
                Err(CallError::Inner(e))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CallError<E> {
    #[error("circuit breaker is open")]
    Open,
    #[error(transparent)]
    Inner(E),
}

/// Lazily creates and retains one [`Breaker`] per destination.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<NodeId, Breaker>>,
    failure_threshold: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl BreakerRegistry {
    pub fn new(failure_threshold: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            failure_threshold,
            initial_backoff,
            max_backoff,
        }
    }

    pub fn get(&self, node_id: NodeId) -> Breaker {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(node_id)
            .or_insert_with(|| {
                Breaker::new(self.failure_threshold, self.initial_backoff, self.max_backoff)
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_breaker_is_ready_and_stays_closed_on_success() {
        let b = Breaker::new(1, Duration::from_millis(10), Duration::from_secs(1));
        assert!(b.ready());
        b.success();
        assert!(b.ready());
        assert!(b.counters().just_recovered());
    }

    #[test]
    fn single_failure_opens_breaker_with_threshold_one() {
        let b = Breaker::new(1, Duration::from_millis(50), Duration::from_secs(1));
        b.fail();
        assert!(!b.ready());
    }

    #[test]
    fn breaker_reopens_for_half_open_probe_after_backoff() {
        let b = Breaker::new(1, Duration::from_millis(10), Duration::from_secs(1));
        b.fail();
        assert!(!b.ready());
        std::thread::sleep(Duration::from_millis(20));
        assert!(b.ready());
    }

    #[test]
    fn failed_probe_doubles_backoff_up_to_cap() {
        let b = Breaker::new(1, Duration::from_millis(5), Duration::from_millis(12));
        b.fail(); // opens, backoff stays at initial (5ms) until a half-open probe fails
        std::thread::sleep(Duration::from_millis(8));
        assert!(b.ready()); // half-open
        b.fail(); // probe failed: backoff doubles to 10ms (under the 12ms cap)
        assert!(!b.ready());
        std::thread::sleep(Duration::from_millis(8));
        assert!(!b.ready()); // not yet: needs ~10ms, not 8ms
        std::thread::sleep(Duration::from_millis(6));
        assert!(b.ready());
    }

    #[test]
    fn registry_retains_the_same_breaker_per_node() {
        let reg = BreakerRegistry::new(1, Duration::from_millis(10), Duration::from_secs(1));
        let a = reg.get(NodeId(1));
        a.fail();
        let b = reg.get(NodeId(1));
        assert!(!b.ready());
        let c = reg.get(NodeId(2));
        assert!(c.ready());
    }
}
