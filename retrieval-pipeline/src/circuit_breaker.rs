//! Model-runtime health monitor and circuit breaker (C14).
//!
//! Deliberately not a textbook three-state breaker: `Degraded` is just "at
//! least one recent failure, still under threshold," and there is no
//! separate half-open state — the post-cooldown probe IS the half-open
//! trial, folded into `allow()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::model_client::ModelRuntime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Healthy,
    Degraded,
    Unavailable,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Healthy,
                consecutive_failures: 0,
                opened_at: None,
            }),
            threshold,
            cooldown,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).consecutive_failures
    }

    /// Whether a model call should be attempted right now. Always true
    /// outside `Unavailable`; once open, true only after `cooldown` has
    /// elapsed since the breaker tripped (the probe window).
    pub fn allow(&self) -> bool {
        let guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match guard.state {
            BreakerState::Unavailable => matches!(guard.opened_at, Some(opened) if opened.elapsed() >= self.cooldown),
            _ => true,
        }
    }

    pub fn record_success(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        guard.consecutive_failures = 0;
        guard.state = BreakerState::Healthy;
        guard.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        guard.consecutive_failures = guard.consecutive_failures.saturating_add(1);
        if guard.consecutive_failures >= self.threshold {
            guard.state = BreakerState::Unavailable;
            if guard.opened_at.is_none() {
                guard.opened_at = Some(Instant::now());
            }
        } else {
            guard.state = BreakerState::Degraded;
        }
    }

    /// Probes `client.health()` at a fixed interval until `running` clears.
    /// Intended to be spawned as its own background task from the
    /// composition root.
    pub async fn run_prober(self: Arc<Self>, client: Arc<dyn ModelRuntime>, interval: Duration, running: Arc<AtomicBool>) {
        let mut ticker = tokio::time::interval(interval);
        while running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !running.load(Ordering::SeqCst) {
                break;
            }
            if client.health().await {
                self.record_success();
            } else {
                self.record_failure();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(5, Duration::from_millis(40))
    }

    #[test]
    fn stays_degraded_below_threshold() {
        let cb = breaker();
        for _ in 0..4 {
            cb.record_failure();
            assert_eq!(cb.state(), BreakerState::Degraded);
        }
    }

    #[test]
    fn opens_at_threshold_consecutive_failures() {
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), BreakerState::Unavailable);
        assert_eq!(cb.consecutive_failures(), 5);
    }

    #[test]
    fn success_resets_to_healthy_from_any_state() {
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Healthy);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn allow_is_false_while_open_and_true_after_cooldown() {
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        assert!(!cb.allow());
        std::thread::sleep(Duration::from_millis(60));
        assert!(cb.allow());
    }

    #[test]
    fn allow_is_always_true_when_healthy_or_degraded() {
        let cb = breaker();
        assert!(cb.allow());
        cb.record_failure();
        assert!(cb.allow());
    }
}
