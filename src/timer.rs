use std::time::{Duration, Instant};

/// Wall clock for the render loop. Time spent stopped is excluded from the total.
#[derive(Debug, Clone)]
pub struct Timer {
    base: Instant,
    previous: Instant,
    stopped_at: Option<Instant>,
    paused: Duration,
    delta: Duration,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        let now = Instant::now();
        Timer {
            base: now,
            previous: now,
            stopped_at: None,
            paused: Duration::ZERO,
            delta: Duration::ZERO,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn start(&mut self) {
        if let Some(stopped_at) = self.stopped_at.take() {
            let now = Instant::now();
            self.paused += now - stopped_at;
            self.previous = now;
        }
    }

    pub fn stop(&mut self) {
        if self.stopped_at.is_none() {
            self.stopped_at = Some(Instant::now());
        }
    }

    pub fn is_running(&self) -> bool {
        self.stopped_at.is_none()
    }

    pub fn tick(&mut self) {
        if !self.is_running() {
            self.delta = Duration::ZERO;
            return;
        }

        let now = Instant::now();
        self.delta = now.saturating_duration_since(self.previous);
        self.previous = now;
    }

    /// Seconds between the last two ticks
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn total_seconds(&self) -> f32 {
        let end = self.stopped_at.unwrap_or_else(Instant::now);
        (end - self.base).saturating_sub(self.paused).as_secs_f32()
    }
}

/// Frames per second, averaged over one second windows
#[derive(Debug, Default)]
pub struct FrameStats {
    frames: u32,
    window_start: f32,
}

impl FrameStats {
    /// Counts a frame. Returns `(fps, milliseconds per frame)` once a second has passed.
    pub fn frame(&mut self, total_seconds: f32) -> Option<(f32, f32)> {
        self.frames += 1;

        let elapsed = total_seconds - self.window_start;
        if elapsed <= 1.0 {
            return None;
        }

        let fps = self.frames as f32 / elapsed;
        self.frames = 0;
        self.window_start = total_seconds;
        Some((fps, 1000.0 / fps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn stopped_timer_has_no_delta() {
        let mut timer = Timer::new();
        timer.stop();
        thread::sleep(Duration::from_millis(5));
        timer.tick();
        assert_eq!(timer.delta_seconds(), 0.0);
        assert!(!timer.is_running());
    }

    #[test]
    fn paused_time_is_excluded() {
        let mut timer = Timer::new();
        timer.stop();
        thread::sleep(Duration::from_millis(50));
        timer.start();
        assert!(timer.total_seconds() < 0.04);
    }

    #[test]
    fn tick_measures_delta() {
        let mut timer = Timer::new();
        thread::sleep(Duration::from_millis(10));
        timer.tick();
        assert!(timer.delta_seconds() >= 0.01);
    }

    #[test]
    fn stats_report_once_per_second() {
        let mut stats = FrameStats::default();
        for frame in 0..59 {
            assert!(stats.frame(frame as f32 / 60.0).is_none());
        }
        assert!(stats.frame(1.0).is_none());

        let (fps, frame_time) = stats.frame(1.25).unwrap();
        assert!((fps - 61.0 / 1.25).abs() < 1e-3);
        assert!((frame_time - 1000.0 / fps).abs() < 1e-3);
        assert!(stats.frame(1.5).is_none());
    }
}
