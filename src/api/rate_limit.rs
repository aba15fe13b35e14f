//! Adaptive token-bucket rate limiter for outbound API calls.

use crate::config::RateLimitSettings;
use serde::Serialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Token bucket state. Exposed so the refill arithmetic can be driven with
/// explicit instants.
#[derive(Debug, Clone)]
pub struct RateBucket {
    pub tokens: f64,
    pub capacity: f64,
    pub refill_rate: f64,
    pub last_refill: Instant,
    /// Multiplier >= 1.0 dividing the refill rate while upstream pushes back.
    pub backoff: f64,
    pub consecutive_successes: u32,
}

impl RateBucket {
    pub fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_rate,
            last_refill: now,
            backoff: 1.0,
            consecutive_successes: 0,
        }
    }

    pub fn effective_rate(&self) -> f64 {
        self.refill_rate / self.backoff
    }

    fn refill(&mut self, now: Instant) {
        // last_refill may sit in the future when a reservation was made ahead
        if now > self.last_refill {
            let elapsed = now.duration_since(self.last_refill).as_secs_f64();
            self.tokens = (self.tokens + elapsed * self.effective_rate()).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Take one token, returning how long the caller must wait before using it.
    pub fn reserve(&mut self, now: Instant) -> Duration {
        self.refill(now);

        if self.last_refill <= now && self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Duration::ZERO;
        }

        let rate = self.effective_rate();
        let base = self.last_refill.max(now);
        let deficit = (1.0 - self.tokens).max(0.0);
        let ready_at = base + Duration::from_secs_f64(deficit / rate);

        self.tokens = 0.0;
        self.last_refill = ready_at;

        ready_at.saturating_duration_since(now)
    }
}

/// Counters reported by [`RateLimiter::stats`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RateLimiterStats {
    pub acquired: u64,
    pub waited: u64,
    pub total_wait_ms: u64,
    pub throttle_signals: u64,
    pub backoff: f64,
}

/// Shared limiter. Concurrent callers serialize on the bucket so that
/// tokens are never double-spent.
pub struct RateLimiter {
    bucket: Mutex<RateBucket>,
    stats: Mutex<RateLimiterStats>,
    backoff_factor: f64,
    max_backoff: f64,
    recovery_successes: u32,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        let capacity = settings.capacity.max(1.0);
        let refill = if settings.refill_per_second > 0.0 {
            settings.refill_per_second
        } else {
            1.0
        };

        Self {
            bucket: Mutex::new(RateBucket::new(capacity, refill, Instant::now())),
            stats: Mutex::new(RateLimiterStats {
                backoff: 1.0,
                ..Default::default()
            }),
            backoff_factor: settings.backoff_factor.max(1.0),
            max_backoff: settings.max_backoff.max(1.0),
            recovery_successes: settings.recovery_successes.max(1),
        }
    }

    /// Reserve a token at `now`. Returns the delay until it may be used.
    pub fn reserve_at(&self, now: Instant) -> Duration {
        let wait = match self.bucket.lock() {
            Ok(mut bucket) => bucket.reserve(now),
            Err(poisoned) => poisoned.into_inner().reserve(now),
        };

        self.update_stats(|s| {
            s.acquired += 1;
            if !wait.is_zero() {
                s.waited += 1;
                s.total_wait_ms += wait.as_millis() as u64;
            }
        });

        wait
    }

    /// Wait until a token is available.
    pub async fn acquire(&self) {
        let wait = self.reserve_at(Instant::now());
        if !wait.is_zero() {
            debug!("Rate limiter waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Upstream signalled throttling: slow down and drop any burst allowance.
    pub fn report_throttled(&self) {
        let backoff = self.with_bucket(|bucket| {
            bucket.backoff = (bucket.backoff * self.backoff_factor).min(self.max_backoff);
            bucket.consecutive_successes = 0;
            bucket.tokens = 0.0;
            bucket.backoff
        });

        warn!("Upstream throttled request, backoff now {:.2}x", backoff);
        self.update_stats(|s| {
            s.throttle_signals += 1;
            s.backoff = backoff;
        });
    }

    /// A request went through; decay the backoff after a run of successes.
    pub fn report_success(&self) {
        let recovered = self.with_bucket(|bucket| {
            if bucket.backoff <= 1.0 {
                return None;
            }
            bucket.consecutive_successes += 1;
            if bucket.consecutive_successes < self.recovery_successes {
                return None;
            }
            bucket.consecutive_successes = 0;
            bucket.backoff = 1.0 + (bucket.backoff - 1.0) * 0.5;
            if bucket.backoff < 1.01 {
                bucket.backoff = 1.0;
            }
            Some(bucket.backoff)
        });

        if let Some(backoff) = recovered {
            info!("Rate limiter recovering, backoff now {:.2}x", backoff);
            self.update_stats(|s| s.backoff = backoff);
        }
    }

    pub fn current_backoff(&self) -> f64 {
        self.with_bucket(|bucket| bucket.backoff)
    }

    pub fn stats(&self) -> RateLimiterStats {
        match self.stats.lock() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn with_bucket<T>(&self, f: impl FnOnce(&mut RateBucket) -> T) -> T {
        match self.bucket.lock() {
            Ok(mut bucket) => f(&mut bucket),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn update_stats(&self, f: impl FnOnce(&mut RateLimiterStats)) {
        match self.stats.lock() {
            Ok(mut s) => f(&mut s),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}
