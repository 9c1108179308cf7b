use std::time::{Duration, Instant};

/// Frame delta plus an exponentially smoothed frame time for status display.
pub struct FrameTimer {
    last: Instant,
    delta: Duration,
    smoothed_ms: f32,
    frames: u64,
}

const SMOOTHING: f32 = 0.1;

impl FrameTimer {
    pub fn new() -> Self {
        Self { last: Instant::now(), delta: Duration::ZERO, smoothed_ms: 0.0, frames: 0 }
    }

    pub fn tick(&mut self) {
        let now = Instant::now();
        self.record(now - self.last);
        self.last = now;
    }

    fn record(&mut self, delta: Duration) {
        self.delta = delta;
        let ms = delta.as_secs_f32() * 1000.0;
        self.smoothed_ms = if self.frames == 0 { ms } else { self.smoothed_ms + (ms - self.smoothed_ms) * SMOOTHING };
        self.frames += 1;
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn smoothed_ms(&self) -> f32 {
        self.smoothed_ms
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoothing_starts_at_first_sample_and_converges() {
        let mut timer = FrameTimer::new();
        timer.record(Duration::from_millis(20));
        assert!((timer.smoothed_ms() - 20.0).abs() < 1e-3);
        for _ in 0..200 {
            timer.record(Duration::from_millis(10));
        }
        assert!((timer.smoothed_ms() - 10.0).abs() < 0.01);
        assert_eq!(timer.frames(), 201);
        assert!((timer.delta_seconds() - 0.01).abs() < 1e-6);
    }
}
