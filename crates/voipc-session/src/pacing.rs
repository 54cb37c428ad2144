//! Wall-clock pacing: a periodic ticker for PUNCH/keepalive/metadata cadence,
//! and a rate limiter bounding how often a given call site may log a warning.

use std::time::{Duration, Instant};

/// Fires at most once per `interval`. Call `tick()` on every loop iteration;
/// it's cheap and non-blocking, so the caller stays responsive to shutdown.
pub struct Ticker {
    interval: Duration,
    last: Instant,
}

impl Ticker {
    /// A fresh ticker fires on its very first `tick()` call.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now() - interval,
        }
    }

    pub fn tick(&mut self) -> bool {
        if self.last.elapsed() >= self.interval {
            self.last = Instant::now();
            true
        } else {
            false
        }
    }

    /// Restart the interval from now without firing.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }
}

/// Caps a call site to at most one `allow() == true` per `min_interval`,
/// matching the ≤1/2s rate-limited `warn!` policy (fragment loss, decryption
/// failure). A simple last-logged-instant guard, not a token bucket — bursts
/// within the window are simply suppressed, not queued.
pub struct RateLimiter {
    min_interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn ticker_fires_on_first_call() {
        let mut t = Ticker::new(Duration::from_secs(10));
        assert!(t.tick());
    }

    #[test]
    fn ticker_does_not_fire_again_before_interval_elapses() {
        let mut t = Ticker::new(Duration::from_millis(50));
        assert!(t.tick());
        assert!(!t.tick());
    }

    #[test]
    fn ticker_fires_again_after_interval_elapses() {
        let mut t = Ticker::new(Duration::from_millis(10));
        assert!(t.tick());
        sleep(Duration::from_millis(15));
        assert!(t.tick());
    }

    #[test]
    fn rate_limiter_allows_first_call() {
        let mut rl = RateLimiter::new(Duration::from_secs(2));
        assert!(rl.allow());
    }

    #[test]
    fn rate_limiter_blocks_rapid_repeat_calls() {
        let mut rl = RateLimiter::new(Duration::from_secs(2));
        assert!(rl.allow());
        assert!(!rl.allow());
        assert!(!rl.allow());
    }

    #[test]
    fn rate_limiter_allows_again_after_interval() {
        let mut rl = RateLimiter::new(Duration::from_millis(10));
        assert!(rl.allow());
        sleep(Duration::from_millis(15));
        assert!(rl.allow());
    }
}
