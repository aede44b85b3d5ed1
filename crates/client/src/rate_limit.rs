//! Admission control for calls to the authoritative store.

use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};

/// Token bucket counted in thousandths of a call so slow refill rates do
/// not lose fractional tokens between reservations.
#[derive(Debug, Clone)]
pub(crate) struct TokenBucket {
    refill_per_sec: u64,
    capacity_milli: u64,
    available_milli: u64,
    last_refill: Instant,
}

impl TokenBucket {
    pub(crate) fn new(capacity: u32, refill_per_sec: u32, now: Instant) -> Self {
        let capacity_milli = u64::from(capacity.max(1)) * 1000;
        Self {
            refill_per_sec: u64::from(refill_per_sec),
            capacity_milli,
            available_milli: capacity_milli,
            last_refill: now,
        }
    }

    /// Takes one token, returning how long the caller must wait for it.
    pub(crate) fn reserve_at(&mut self, now: Instant) -> Duration {
        if self.refill_per_sec == 0 {
            self.last_refill = now;
            return Duration::ZERO;
        }

        if now > self.last_refill {
            let elapsed_ms = now.duration_since(self.last_refill).as_millis() as u64;
            let added = self.refill_per_sec.saturating_mul(elapsed_ms);
            self.available_milli = self
                .available_milli
                .saturating_add(added)
                .min(self.capacity_milli);
            self.last_refill = now;
        }

        if self.available_milli >= 1000 {
            self.available_milli -= 1000;
            return Duration::ZERO;
        }

        let deficit = 1000 - self.available_milli;
        self.available_milli = 0;
        let wait_ms = deficit.div_ceil(self.refill_per_sec);
        let wait = Duration::from_millis(wait_ms);
        self.last_refill = now + wait;
        wait
    }
}

#[derive(Debug)]
struct Admission {
    bucket: TokenBucket,
    min_interval: Duration,
    next_slot: Option<Instant>,
}

impl Admission {
    fn reserve_at(&mut self, now: Instant) -> Duration {
        let bucket_wait = self.bucket.reserve_at(now);
        let spacing_wait = self
            .next_slot
            .map_or(Duration::ZERO, |slot| slot.saturating_duration_since(now));
        let wait = bucket_wait.max(spacing_wait);
        self.next_slot = Some(now + wait + self.min_interval);
        wait
    }
}

/// Shared by every group of a drain, so the budget is global.
#[derive(Debug)]
pub struct RateLimiter {
    inner: Mutex<Admission>,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_per_sec: u32, min_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(Admission {
                bucket: TokenBucket::new(capacity, refill_per_sec, Instant::now()),
                min_interval,
                next_slot: None,
            }),
        }
    }

    /// Waits until one more call may be dispatched.
    pub async fn acquire(&self) {
        let wait = self.inner.lock().await.reserve_at(Instant::now());
        if !wait.is_zero() {
            tracing::trace!(wait_ms = wait.as_millis() as u64, "rate limited");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_waits_for_deficit() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(2, 4, start);

        assert_eq!(bucket.reserve_at(start), Duration::ZERO);
        assert_eq!(bucket.reserve_at(start), Duration::ZERO);
        assert_eq!(bucket.reserve_at(start), Duration::from_millis(250));

        let later = start + Duration::from_millis(250 + 500);
        assert_eq!(bucket.reserve_at(later), Duration::ZERO);
        assert_eq!(bucket.reserve_at(later), Duration::ZERO);
    }

    #[test]
    fn zero_rate_disables_bucket() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(1, 0, now);
        for _ in 0..100 {
            assert_eq!(bucket.reserve_at(now), Duration::ZERO);
        }
    }

    #[test]
    fn minimum_interval_spaces_calls() {
        let now = Instant::now();
        let mut admission = Admission {
            bucket: TokenBucket::new(10, 0, now),
            min_interval: Duration::from_millis(40),
            next_slot: None,
        };
        assert_eq!(admission.reserve_at(now), Duration::ZERO);
        assert_eq!(admission.reserve_at(now), Duration::from_millis(40));
        assert_eq!(admission.reserve_at(now), Duration::from_millis(80));
    }

    #[tokio::test]
    async fn acquire_sleeps_when_exhausted() {
        let limiter = RateLimiter::new(1, 10, Duration::ZERO);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
