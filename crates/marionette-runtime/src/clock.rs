//! Session clock
//!
//! All animation math works in seconds since the controller was created.
//! Backed by `tokio::time::Instant` so paused-time tests drive it.

use tokio::time::Instant;

/// Monotonic session time in seconds
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    origin: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        SessionClock {
            origin: Instant::now(),
        }
    }

    /// Seconds since the clock was created
    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_follows_paused_time() {
        let clock = SessionClock::new();
        assert_eq!(clock.now(), 0.0);
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!((clock.now() - 1.5).abs() < 1e-9);
    }
}
