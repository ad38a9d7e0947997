//! Synthetic capture device for development without a camera.

use std::thread;
use std::time::{Duration, Instant};

use super::frame_utils::mirror_horizontal;
use super::types::{Frame, Resolution};
use super::CaptureDevice;

/// Moving RGB gradient paced at a fixed frame rate.
pub struct TestPattern {
    resolution: Resolution,
    fps: u32,
    frame_index: u64,
    next_due: Instant,
    mirror: bool,
    released: bool,
}

impl TestPattern {
    pub fn new(resolution: Resolution, fps: u32) -> Self {
        Self {
            resolution,
            fps: fps.max(1),
            frame_index: 0,
            next_due: Instant::now(),
            mirror: false,
            released: false,
        }
    }

    /// Flip frames horizontally
    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps))
    }

    /// Render frame number `index` without pacing.
    pub fn render(&self, index: u64) -> Frame {
        let Resolution { width, height } = self.resolution;
        let shift = (index % 256) as u32;
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                let r = ((x * 255) / width.max(1) + shift) % 256;
                let g = ((y * 255) / height.max(1) + shift) % 256;
                let b = (shift * 2) % 256;
                data.extend_from_slice(&[r as u8, g as u8, b as u8]);
            }
        }
        Frame {
            data,
            width,
            height,
            format: super::FrameFormat::Rgb,
            timestamp: Instant::now(),
        }
    }
}

impl CaptureDevice for TestPattern {
    fn read_frame(&mut self) -> Option<Frame> {
        if self.released {
            return None;
        }

        let now = Instant::now();
        if self.next_due > now {
            thread::sleep(self.next_due - now);
        }
        // Don't try to catch up after a stall
        self.next_due = Instant::now().max(self.next_due) + self.frame_interval();

        let mut frame = self.render(self.frame_index);
        if self.mirror {
            mirror_horizontal(&mut frame);
        }
        self.frame_index += 1;
        Some(frame)
    }

    fn nominal_fps(&self) -> Option<f64> {
        Some(f64::from(self.fps))
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn describe(&self) -> String {
        format!("test-pattern:{}@{}", self.resolution, self.fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_dimensions() {
        let pattern = TestPattern::new(Resolution::LOW, 30);
        let frame = pattern.render(0);
        assert_eq!(frame.width, 320);
        assert_eq!(frame.height, 240);
        assert_eq!(frame.data.len(), 320 * 240 * 3);
    }

    #[test]
    fn test_frames_change_over_time() {
        let pattern = TestPattern::new(Resolution { width: 4, height: 4 }, 30);
        assert_ne!(pattern.render(0).data, pattern.render(1).data);
    }

    #[test]
    fn test_pacing_and_release() {
        let mut pattern = TestPattern::new(Resolution { width: 2, height: 2 }, 50);
        let start = Instant::now();
        for _ in 0..3 {
            assert!(pattern.read_frame().is_some());
        }
        // first frame is immediate, the next two wait ~20ms each
        assert!(start.elapsed() >= Duration::from_millis(35));

        pattern.release();
        assert!(pattern.read_frame().is_none());
        assert_eq!(pattern.nominal_fps(), Some(50.0));
    }
}
