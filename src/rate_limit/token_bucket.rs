use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

/// Classic token bucket: `capacity` is the burst, `refill_rate` the
/// sustained requests per second. A fresh bucket starts full.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(refill_rate: f64, capacity: u32) -> Self {
        let now = Instant::now();
        Self {
            capacity: f64::from(capacity),
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: now,
                last_seen: now,
            }),
        }
    }

    /// Refills for the elapsed time, then takes one token if available.
    /// A denied call only applies the refill.
    pub fn allow(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        state.last_seen = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens available right now, after refill.
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// True when the bucket has not been used for `max_idle` and would be
    /// full by now, so dropping it cannot change any admission decision.
    pub(crate) fn is_idle(&self, now: Instant, max_idle: Duration) -> bool {
        let state = self.state.lock();
        let idle_for = now.saturating_duration_since(state.last_seen);
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        let projected = state.tokens + elapsed * self.refill_rate;
        idle_for >= max_idle && projected >= self.capacity
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }
}
