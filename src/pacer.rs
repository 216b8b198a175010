//! Frame pacing without vsync
//!
//! Frames are counted inside a rolling one-second window. Whenever the
//! frame count gets ahead of where the target rate says it should be, the
//! loop sleeps off the difference. Crossing the window boundary resets both
//! the counter and the window start, so any error is discarded every second
//! instead of accumulating.

use std::thread;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct FramePacer {
    fps: f64,
    mark: Option<Instant>,
    frames: u32,
}

impl FramePacer {
    /// Pacer targeting `fps` frames per second (at least 1)
    pub fn new(fps: u32) -> Self {
        Self {
            fps: f64::from(fps.max(1)),
            mark: None,
            frames: 0,
        }
    }

    /// Frames counted so far in the current window
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// How long to wait before rendering the frame that starts at `now`
    pub fn delay(&mut self, now: Instant) -> Option<Duration> {
        let mark = match self.mark {
            Some(mark) if now.saturating_duration_since(mark) < WINDOW => mark,
            _ => {
                self.frames = 0;
                self.mark = Some(now);
                return None;
            }
        };

        self.frames += 1;
        let since_mark = now.saturating_duration_since(mark).as_secs_f64();

        let expected_frames = (since_mark * self.fps).floor();
        let expected_position = expected_frames / self.fps;
        let actual_position = f64::from(self.frames) / self.fps;

        if actual_position > expected_position {
            // Round up so the frame never lands before its slot.
            let nanos = ((actual_position - expected_position) * 1e9).ceil();
            Some(Duration::from_nanos(nanos as u64))
        } else {
            None
        }
    }

    /// Sleep as needed to hold the target rate
    pub fn pace(&mut self) {
        if let Some(delay) = self.delay(Instant::now()) {
            thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the pacer with a zero-cost frame on a simulated clock, returning
    /// each frame's render time relative to the start.
    fn simulate(fps: u32, seconds: u64) -> (Vec<Duration>, u32) {
        let mut pacer = FramePacer::new(fps);
        let start = Instant::now();
        let mut now = start;
        let mut renders = Vec::new();
        let mut max_frames = 0;

        for _ in 0..100_000 {
            if let Some(delay) = pacer.delay(now) {
                now += delay;
            }
            max_frames = max_frames.max(pacer.frames());
            let at = now - start;
            if at >= Duration::from_secs(seconds) {
                break;
            }
            renders.push(at);
        }
        (renders, max_frames)
    }

    #[test]
    fn test_first_frame_starts_window() {
        let mut pacer = FramePacer::new(60);
        assert_eq!(pacer.delay(Instant::now()), None);
        assert_eq!(pacer.frames(), 0);
    }

    #[test]
    fn test_running_ahead_sleeps() {
        let mut pacer = FramePacer::new(10);
        let start = Instant::now();
        assert_eq!(pacer.delay(start), None);

        // Second frame at the same instant is one slot ahead.
        let delay = pacer.delay(start).unwrap();
        assert!(delay >= Duration::from_millis(100));
        assert!(delay < Duration::from_millis(101));
    }

    #[test]
    fn test_running_behind_does_not_sleep() {
        let mut pacer = FramePacer::new(10);
        let start = Instant::now();
        pacer.delay(start);

        // Frame 1 arriving at 350ms is behind its 100ms slot.
        assert_eq!(pacer.delay(start + Duration::from_millis(350)), None);
    }

    #[test]
    fn test_window_boundary_resets() {
        let mut pacer = FramePacer::new(30);
        let start = Instant::now();
        pacer.delay(start);
        pacer.delay(start + Duration::from_millis(10));
        assert_eq!(pacer.frames(), 1);

        assert_eq!(pacer.delay(start + Duration::from_millis(1000)), None);
        assert_eq!(pacer.frames(), 0);
    }

    #[test]
    fn test_frame_count_bounded_by_rate() {
        for fps in [1, 24, 30, 60, 144] {
            let (renders, max_frames) = simulate(fps, 3);
            assert!(max_frames <= fps, "fps {}: counter reached {}", fps, max_frames);

            // Per pacing window the count never exceeds fps (checked above).
            // Frame fps of a window is due exactly at its one-second mark,
            // so a wall-clock second can still see fps + 1 renders.
            for second in 0..3u64 {
                let lo = Duration::from_secs(second);
                let hi = Duration::from_secs(second + 1);
                let count = renders.iter().filter(|t| **t >= lo && **t < hi).count();
                assert!(count as u32 <= fps + 1, "fps {}: {} frames in second {}", fps, count, second);
                assert!(count as u32 + 2 >= fps, "fps {}: only {} frames in second {}", fps, count, second);
            }
        }
    }

    #[test]
    fn test_zero_fps_is_clamped() {
        let mut pacer = FramePacer::new(0);
        let start = Instant::now();
        pacer.delay(start);
        assert!(pacer.delay(start).is_some());
    }
}
