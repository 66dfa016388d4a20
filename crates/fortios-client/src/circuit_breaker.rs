//! Circuit breaker for appliance targets
//!
//! One breaker exists per logical target (transport identity plus VDOM).
//!
//! ```text
//! Closed    → Open:      consecutive failures reach the threshold
//! Open      → Half-open: next call after the cool-down elapses (that call is the probe)
//! Half-open → Closed:    the probe succeeds
//! Half-open → Open:      the probe fails; the cool-down restarts
//! ```
//!
//! While half-open exactly one probe is in flight; every other call is
//! short-circuited. A probe permit dropped without an outcome (for example a
//! cancelled future) is recorded as a failure.

use crate::error::ApiError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Runtime breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker threshold and cool-down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// A configuration that never opens
    pub fn disabled() -> Self {
        Self {
            failure_threshold: u32::MAX,
            open_timeout: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            last_failure_at: None,
            probe_in_flight: false,
        }
    }
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub target: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub failure_threshold: u32,
    pub open_timeout_ms: u64,
}

/// Thread-safe breaker for a single target
#[derive(Debug)]
pub struct CircuitBreaker {
    target: String,
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(target: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            target: target.into(),
            config,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    /// Target this breaker guards
    pub fn target(&self) -> &str {
        &self.target
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask for permission to send one request.
    ///
    /// Returns `CircuitOpen` without side effects when the call must be shed.
    pub fn try_acquire(self: &Arc<Self>) -> Result<Permit, ApiError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::new(Arc::clone(self), false)),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|opened_at| opened_at.elapsed())
                    .unwrap_or(self.config.open_timeout);

                if elapsed >= self.config.open_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    info!("Circuit for {} half-open; sending probe", self.target);
                    Ok(Permit::new(Arc::clone(self), true))
                } else {
                    Err(ApiError::CircuitOpen {
                        target: self.target.clone(),
                        retry_after: self.config.open_timeout - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(ApiError::CircuitOpen {
                        target: self.target.clone(),
                        retry_after: Duration::ZERO,
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(Permit::new(Arc::clone(self), true))
                }
            }
        }
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen if probe => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.probe_in_flight = false;
                info!("Circuit for {} closed after successful probe", self.target);
            }
            // Late completions of calls admitted before the breaker opened
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn on_failure(&self, probe: bool) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_at = Some(Utc::now());

        match inner.state {
            CircuitState::HalfOpen if probe => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                warn!("Probe for {} failed; circuit re-opened", self.target);
            }
            CircuitState::Closed if inner.consecutive_failures >= self.config.failure_threshold => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                warn!(
                    "Circuit for {} opened after {} consecutive failures",
                    self.target, inner.consecutive_failures
                );
            }
            _ => {}
        }
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Failures since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Force the breaker back to closed
    pub fn reset(&self) {
        *self.lock() = CircuitInner::default();
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            target: self.target.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_failure_at: inner.last_failure_at,
            failure_threshold: self.config.failure_threshold,
            open_timeout_ms: u64::try_from(self.config.open_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Admission for one request; must be settled with an outcome
#[derive(Debug)]
#[must_use = "a permit must be settled with succeed() or fail()"]
pub struct Permit {
    breaker: Arc<CircuitBreaker>,
    probe: bool,
    settled: bool,
}

impl Permit {
    fn new(breaker: Arc<CircuitBreaker>, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    /// Whether this request is the half-open probe
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// Record that the target answered (any status below 500)
    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    /// Record a transport failure or 5xx response
    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_failure(self.probe);
        }
    }
}

/// Breakers keyed by target, owned by one client instance
#[derive(Debug)]
pub struct CircuitBreakers {
    config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakers {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Breaker for `target`, created closed on first use
    pub fn for_target(&self, target: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            breakers
                .entry(target.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(target, self.config))),
        )
    }

    /// State of every breaker created so far, ordered by target
    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut snapshots: Vec<CircuitSnapshot> = breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.target.cmp(&b.target));
        snapshots
    }

    /// Reset one target; returns false if it has no breaker yet
    pub fn reset(&self, target: &str) -> bool {
        let breaker = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .cloned();
        match breaker {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, open_timeout: Duration) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "fw.example.net/root",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                open_timeout,
            },
        ))
    }

    fn fail_once(breaker: &Arc<CircuitBreaker>) {
        breaker.try_acquire().expect("call should be admitted").fail();
    }

    #[test]
    fn concurrent_failures_are_all_counted() {
        let breaker = breaker(1_000, Duration::from_secs(60));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        fail_once(&breaker);
                    }
                });
            }
        });

        assert_eq!(breaker.consecutive_failures(), 400);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn concurrent_callers_open_the_breaker_once() {
        let breaker = breaker(100, Duration::from_secs(60));
        let admitted = std::sync::atomic::AtomicU32::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        if let Ok(permit) = breaker.try_acquire() {
                            admitted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                            permit.fail();
                        }
                    }
                });
            }
        });

        let admitted = admitted.into_inner();
        assert!(admitted >= 100);
        assert_eq!(breaker.consecutive_failures(), admitted);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn concurrent_half_open_admits_a_single_probe() {
        let breaker = breaker(1, Duration::ZERO);
        fail_once(&breaker);
        let barrier = std::sync::Barrier::new(8);

        let outcomes: Vec<Result<Permit, ApiError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        breaker.try_acquire()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("thread completes"))
                .collect()
        });

        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = breaker(2, Duration::from_secs(60));

        assert_eq!(breaker.state(), CircuitState::Closed);
        fail_once(&breaker);
        assert_eq!(breaker.state(), CircuitState::Closed);
        fail_once(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = breaker.try_acquire().expect_err("must short-circuit");
        assert!(matches!(err, ApiError::CircuitOpen { .. }));
    }

    #[test]
    fn success_resets_counter_while_closed() {
        let breaker = breaker(3, Duration::from_secs(60));

        fail_once(&breaker);
        fail_once(&breaker);
        breaker.try_acquire().expect("admitted").succeed();

        assert_eq!(breaker.consecutive_failures(), 0);
        fail_once(&breaker);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_admits_exactly_one_probe() {
        let breaker = breaker(1, Duration::from_millis(5));
        fail_once(&breaker);

        std::thread::sleep(Duration::from_millis(10));
        let probe = breaker.try_acquire().expect("probe admitted");
        assert!(probe.is_probe());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let err = breaker.try_acquire().expect_err("second caller shed");
        assert!(matches!(err, ApiError::CircuitOpen { .. }));

        probe.succeed();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[test]
    fn failed_probe_reopens_and_restarts_cool_down() {
        let breaker = breaker(1, Duration::from_millis(20));
        fail_once(&breaker);

        std::thread::sleep(Duration::from_millis(25));
        breaker.try_acquire().expect("probe admitted").fail();
        assert_eq!(breaker.state(), CircuitState::Open);

        match breaker.try_acquire() {
            Err(ApiError::CircuitOpen { retry_after, .. }) => {
                assert!(retry_after > Duration::ZERO);
            }
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
    }

    #[test]
    fn dropped_probe_counts_as_failure() {
        let breaker = breaker(1, Duration::from_millis(1));
        fail_once(&breaker);

        std::thread::sleep(Duration::from_millis(5));
        drop(breaker.try_acquire().expect("probe admitted"));

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.consecutive_failures(), 2);
    }

    #[test]
    fn late_success_does_not_close_open_breaker() {
        let breaker = breaker(1, Duration::from_secs(60));
        let early = breaker.try_acquire().expect("admitted");
        fail_once(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);

        early.succeed();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn disabled_config_never_opens() {
        let breaker = Arc::new(CircuitBreaker::new("t", CircuitBreakerConfig::disabled()));
        for _ in 0..1000 {
            fail_once(&breaker);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn registry_isolates_targets() {
        let registry = CircuitBreakers::new(CircuitBreakerConfig {
            failure_threshold: 1,
            open_timeout: Duration::from_secs(60),
        });

        fail_once(&registry.for_target("fw1/root"));
        assert_eq!(registry.for_target("fw1/root").state(), CircuitState::Open);
        assert_eq!(registry.for_target("fw1/dmz").state(), CircuitState::Closed);

        let snapshots = registry.snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].target, "fw1/dmz");
        assert!(snapshots[1].last_failure_at.is_some());

        assert!(registry.reset("fw1/root"));
        assert_eq!(registry.for_target("fw1/root").state(), CircuitState::Closed);
        assert!(!registry.reset("unknown"));
    }
}
