//! Per-client rate limiting (C15) on costly endpoints.
//!
//! Configured limits look like `"5/minute"`; each endpoint gets its own
//! keyed limiter, keyed by client address, so one noisy client never starves
//! another. Built on `governor`'s GCRA implementation rather than a
//! hand-rolled sliding window — same external contract (an admit/reject
//! decision plus a retry-after hint), a well-tested algorithm underneath.

use std::collections::HashMap;
use std::num::NonZeroU32;

use common::error::{AppError, Result};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota};

pub struct RateLimiter {
    limiters: HashMap<String, DefaultKeyedRateLimiter<String>>,
    clock: DefaultClock,
}

impl RateLimiter {
    /// Builds one limiter per `(endpoint, spec)` pair in `limits`, where
    /// `spec` is `"<count>/second"` or `"<count>/minute"`.
    pub fn from_config(limits: &HashMap<String, String>) -> Result<Self> {
        let mut limiters = HashMap::new();
        for (endpoint, spec) in limits {
            let quota = parse_quota(spec)?;
            limiters.insert(endpoint.clone(), governor::RateLimiter::keyed(quota));
        }
        Ok(Self {
            limiters,
            clock: DefaultClock::default(),
        })
    }

    /// Admits a request for `client` against `endpoint`'s configured quota.
    /// Endpoints with no configured limit are always admitted.
    pub fn check(&self, endpoint: &str, client: &str) -> Result<()> {
        let Some(limiter) = self.limiters.get(endpoint) else {
            return Ok(());
        };
        match limiter.check_key(&client.to_string()) {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let retry_after = not_until.wait_time_from(self.clock.now());
                Err(AppError::RateLimited {
                    retry_after_secs: retry_after.as_secs().max(1),
                })
            }
        }
    }
}

fn parse_quota(spec: &str) -> Result<Quota> {
    let (count_str, unit) = spec
        .split_once('/')
        .ok_or_else(|| AppError::StorageError(format!("invalid rate limit spec: {spec}")))?;
    let count: u32 = count_str
        .trim()
        .parse()
        .map_err(|_| AppError::StorageError(format!("invalid rate limit count: {spec}")))?;
    let count = NonZeroU32::new(count)
        .ok_or_else(|| AppError::StorageError(format!("rate limit count must be positive: {spec}")))?;
    match unit.trim() {
        "second" | "sec" | "s" => Ok(Quota::per_second(count)),
        "minute" | "min" | "m" => Ok(Quota::per_minute(count)),
        other => Err(AppError::StorageError(format!("unknown rate limit unit: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(endpoint: &str, spec: &str) -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert(endpoint.to_string(), spec.to_string());
        m
    }

    #[test]
    fn unconfigured_endpoint_always_admits() {
        let limiter = RateLimiter::from_config(&limits("search", "1/second")).expect("build");
        for _ in 0..50 {
            assert!(limiter.check("other", "client-a").is_ok());
        }
    }

    #[test]
    fn exceeding_quota_rejects_with_retry_after() {
        let limiter = RateLimiter::from_config(&limits("ask", "1/second")).expect("build");
        assert!(limiter.check("ask", "client-a").is_ok());
        let err = limiter.check("ask", "client-a").expect_err("second call within the same second rejects");
        match err {
            AppError::RateLimited { retry_after_secs } => assert!(retry_after_secs >= 1),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn clients_are_isolated() {
        let limiter = RateLimiter::from_config(&limits("ask", "1/second")).expect("build");
        assert!(limiter.check("ask", "client-a").is_ok());
        assert!(limiter.check("ask", "client-b").is_ok());
    }

    #[test]
    fn rejects_malformed_spec() {
        assert!(RateLimiter::from_config(&limits("ask", "garbage")).is_err());
        assert!(RateLimiter::from_config(&limits("ask", "0/second")).is_err());
        assert!(RateLimiter::from_config(&limits("ask", "5/fortnight")).is_err());
    }
}
