//! Frame timing

use std::collections::VecDeque;
use std::time::Duration;

/// Samples needed before an FPS figure is reported
pub const MIN_FPS_SAMPLES: usize = 10;

/// Rolling window of frame intervals
#[derive(Debug, Clone)]
pub struct FrameTimer {
    samples: VecDeque<Duration>,
    capacity: usize,
    total: Duration,
}

impl FrameTimer {
    /// Window size is raised to at least `MIN_FPS_SAMPLES`
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_FPS_SAMPLES);
        FrameTimer {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            total: Duration::ZERO,
        }
    }

    pub fn record(&mut self, frame: Duration) {
        if self.samples.len() == self.capacity {
            if let Some(oldest) = self.samples.pop_front() {
                self.total -= oldest;
            }
        }
        self.samples.push_back(frame);
        self.total += frame;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.total / self.samples.len() as u32)
    }

    /// Frames per second over the window; 0 until enough samples exist
    pub fn fps(&self) -> f64 {
        if self.samples.len() < MIN_FPS_SAMPLES {
            return 0.0;
        }
        match self.average() {
            Some(avg) if !avg.is_zero() => 1.0 / avg.as_secs_f64(),
            _ => 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.total = Duration::ZERO;
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        FrameTimer::new(60)
    }
}
