use std::time::Duration;
use tokio::time::Instant;

/// Token bucket tracking politeness for a single host
///
/// The bucket holds at most `burst` tokens and refills continuously at
/// `rate` tokens per second. Each request consumes one token.
#[derive(Debug, Clone)]
pub struct HostState {
    /// Tokens currently available
    tokens: f64,

    /// When `tokens` was last brought up to date
    last_refill: Instant,

    /// Number of requests admitted for this host in the current run
    pub request_count: u64,
}

impl HostState {
    /// Creates a full bucket
    pub fn new(burst: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(burst),
            last_refill: now,
            request_count: 0,
        }
    }

    fn refill(&mut self, rate: f64, burst: u32, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(f64::from(burst));
        self.last_refill = now;
    }

    /// Tries to take one token
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The request may proceed now
    /// * `Err(Duration)` - How long to wait before a token becomes available
    pub fn try_acquire(&mut self, rate: f64, burst: u32, now: Instant) -> Result<(), Duration> {
        self.refill(rate, burst, now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            self.request_count += 1;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::try_from_secs_f64(missing / rate).unwrap_or(Duration::MAX))
        }
    }

    /// Tokens available right now (after refilling)
    pub fn available(&mut self, rate: f64, burst: u32, now: Instant) -> f64 {
        self.refill(rate, burst, now);
        self.tokens
    }
}
