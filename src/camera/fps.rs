//! Smoothed frames-per-second estimation.

use std::collections::VecDeque;
use std::time::Instant;

/// Sliding-window FPS estimator.
///
/// Holds the reciprocals of the most recent inter-frame intervals; the
/// estimate is their arithmetic mean. Intervals that are zero or negative
/// never enter the window. Until the first interval is recorded the
/// estimate is the nominal rate given at construction.
#[derive(Debug, Clone)]
pub struct FpsEstimator {
    window: VecDeque<f64>,
    capacity: usize,
    last_frame: Instant,
    fps: f64,
}

impl FpsEstimator {
    /// Create an estimator whose interval clock starts at `started`.
    pub fn new(capacity: usize, nominal: f64, started: Instant) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            last_frame: started,
            fps: nominal,
        }
    }

    /// Mark a read attempt at `now`.
    ///
    /// The interval since the previous read contributes when it is positive.
    /// The last-read time is updated unconditionally, so a failed read still
    /// resets the clock and a long gap doesn't produce a spike.
    pub fn tick(&mut self, now: Instant) {
        let interval = now.saturating_duration_since(self.last_frame).as_secs_f64();
        self.record_interval(interval);
        self.last_frame = now;
    }

    /// Add one interval (in seconds) to the window.
    ///
    /// Returns `false` when the interval was rejected.
    pub fn record_interval(&mut self, interval: f64) -> bool {
        if !interval.is_finite() || interval <= 0.0 {
            return false;
        }
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(1.0 / interval);
        self.fps = self.window.iter().sum::<f64>() / self.window.len() as f64;
        true
    }

    /// Current estimate.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Number of samples currently in the window.
    pub fn samples(&self) -> usize {
        self.window.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_initial_estimate_is_nominal() {
        let est = FpsEstimator::new(5, 25.0, Instant::now());
        assert_eq!(est.fps(), 25.0);
        assert_eq!(est.samples(), 0);
    }

    #[test]
    fn test_mean_of_reciprocals() {
        let mut est = FpsEstimator::new(5, 30.0, Instant::now());
        est.record_interval(0.1);
        est.record_interval(0.05);
        // mean(10, 20)
        assert!(approx(est.fps(), 15.0));
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut est = FpsEstimator::new(3, 30.0, Instant::now());
        for interval in [1.0, 0.5, 0.25, 0.125] {
            est.record_interval(interval);
        }
        assert_eq!(est.samples(), 3);
        // window holds 2, 4, 8
        assert!(approx(est.fps(), 14.0 / 3.0));
    }

    #[test]
    fn test_non_positive_intervals_rejected() {
        let mut est = FpsEstimator::new(3, 30.0, Instant::now());
        assert!(!est.record_interval(0.0));
        assert!(!est.record_interval(-0.5));
        assert!(!est.record_interval(f64::NAN));
        assert_eq!(est.samples(), 0);
        assert_eq!(est.fps(), 30.0);
    }

    #[test]
    fn test_tick_with_same_instant_records_nothing() {
        let start = Instant::now();
        let mut est = FpsEstimator::new(4, 30.0, start);
        est.tick(start);
        est.tick(start);
        assert_eq!(est.samples(), 0);
    }

    #[test]
    fn test_tick_records_elapsed_interval() {
        let start = Instant::now();
        let mut est = FpsEstimator::new(4, 30.0, start);
        est.tick(start + Duration::from_millis(50));
        est.tick(start + Duration::from_millis(100));
        assert_eq!(est.samples(), 2);
        assert!((est.fps() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut est = FpsEstimator::new(0, 30.0, Instant::now());
        est.record_interval(0.5);
        est.record_interval(0.25);
        assert_eq!(est.capacity(), 1);
        assert!(approx(est.fps(), 4.0));
    }
}
