//! In-process token bucket.
//!
//! Two places run one of these: the dispatcher's global admission control
//! (100 tokens/s, burst 100) and the per-courier location limiter (1 token
//! per 2 s, burst 1). The bucket refills continuously; `try_acquire` never
//! blocks, `acquire_until` waits but respects a deadline, so an admission
//! wait can never outlive the request it is gating.
//!
//! Built on `tokio::time::Instant` so tests can drive it with paused time.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket with continuous refill.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// A bucket refilling at `rate_per_sec` tokens per second, holding at
    /// most `burst` tokens. Starts full.
    #[must_use]
    pub fn new(rate_per_sec: f64, burst: f64) -> Self {
        Self {
            capacity: burst,
            refill_per_sec: rate_per_sec,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// A bucket granting one token per `interval`, holding at most `burst`.
    /// The shape the per-courier location limit uses (1 per 2 s, burst 1).
    #[must_use]
    pub fn per_interval(interval: Duration, burst: f64) -> Self {
        Self::new(1.0 / interval.as_secs_f64(), burst)
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        state.tokens =
            (state.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }

    /// Take a token if one is available right now.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().expect("lock poisoned");
        self.refill(&mut state, Instant::now());
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait for a token, giving up at `deadline`.
    ///
    /// Returns `false` when the deadline passes first. The wait is a plain
    /// `sleep_until`, so dropping the future (request canceled) costs
    /// nothing and takes no token.
    pub async fn acquire_until(&self, deadline: Instant) -> bool {
        loop {
            let wait = {
                let mut state = self.state.lock().expect("lock poisoned");
                let now = Instant::now();
                self.refill(&mut state, now);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return true;
                }
                let missing = 1.0 - state.tokens;
                Duration::from_secs_f64(missing / self.refill_per_sec)
            };

            let ready_at = Instant::now() + wait;
            if ready_at > deadline {
                tokio::time::sleep_until(deadline).await;
                return self.try_acquire();
            }
            tokio::time::sleep_until(ready_at).await;
        }
    }
}
