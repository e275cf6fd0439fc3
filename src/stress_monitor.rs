//! Stress detection with hysteresis
//!
//! A stress monitor turns a stream of raw health readings into a stable
//! stressed/relieved verdict. Two thresholds bound a dead zone and a verdict
//! only flips after `consecutive` valid readings in a row land past the
//! relevant threshold, so a single noisy sample never flaps the tracer.
//!
//! ```text
//!   1.0 ┤
//!       │  ██ ██ ██            stress threshold: high_streak counts here
//!  0.95 ┼──────────────────────
//!       │        dead zone     both streaks reset, verdict unchanged
//!  0.70 ┼──────────────────────
//!       │                ██ ██ relief threshold: low_streak counts here
//!   0.0 ┤
//! ```
//!
//! Non-finite readings (NaN, ±inf) mean "no data" and are dropped before they
//! can touch either streak.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Failures while sampling a health signal
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to read {path}: {source}")]
    ReadError {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {detail}")]
    ParseError { path: String, detail: String },

    #[error("Health signal unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;

/// Periodically polled health signal with a hysteretic verdict.
///
/// `is_under_stress` and `is_stress_relieved` each consume one fresh
/// measurement; their results are always logical negations of each other.
pub trait StressMonitor: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    fn is_under_stress(&self) -> Result<bool>;

    fn is_stress_relieved(&self) -> Result<bool>;

    /// Human readable configuration and state, for diagnostics only
    fn stress_detection_info(&self) -> String;
}

/// Thresholds of the hysteresis state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressThresholds {
    /// Readings at or above this count towards stress
    pub stress: f64,
    /// Readings at or below this count towards relief
    pub relief: f64,
    /// Consecutive readings required to flip the verdict
    pub consecutive: usize,
}

impl StressThresholds {
    /// A `consecutive` of zero is treated as one.
    pub fn new(stress: f64, relief: f64, consecutive: usize) -> Self {
        Self {
            stress,
            relief,
            consecutive: consecutive.max(1),
        }
    }
}

/// Hysteresis state machine over raw readings
#[derive(Debug, Clone)]
pub struct HysteresisDetector {
    thresholds: StressThresholds,
    high_streak: usize,
    low_streak: usize,
    stressed: bool,
}

impl HysteresisDetector {
    pub fn new(thresholds: StressThresholds) -> Self {
        Self {
            thresholds,
            high_streak: 0,
            low_streak: 0,
            stressed: false,
        }
    }

    /// Feed one reading and return the resulting verdict
    pub fn observe(&mut self, reading: f64) -> bool {
        if !reading.is_finite() {
            return self.stressed;
        }

        if reading >= self.thresholds.stress {
            self.high_streak += 1;
        } else {
            self.high_streak = 0;
        }
        if reading <= self.thresholds.relief {
            self.low_streak += 1;
        } else {
            self.low_streak = 0;
        }

        let required = self.thresholds.consecutive;
        if !self.stressed && self.high_streak >= required {
            self.stressed = true;
            self.low_streak = 0;
        } else if self.stressed && self.low_streak >= required {
            self.stressed = false;
            self.high_streak = 0;
        }
        self.stressed
    }

    pub fn is_stressed(&self) -> bool {
        self.stressed
    }

    pub fn high_streak(&self) -> usize {
        self.high_streak
    }

    pub fn low_streak(&self) -> usize {
        self.low_streak
    }

    pub fn thresholds(&self) -> StressThresholds {
        self.thresholds
    }
}

/// Source of raw readings for a [`ThresholdStressMonitor`]
pub trait SampleSource: Send {
    /// Take one fresh reading.
    ///
    /// NaN or a negative value means the signal is currently unavailable.
    fn sample(&mut self) -> Result<f64>;
}

impl<F> SampleSource for F
where
    F: FnMut() -> f64 + Send,
{
    fn sample(&mut self) -> Result<f64> {
        Ok(self())
    }
}

struct MonitorState<S> {
    source: S,
    detector: HysteresisDetector,
}

/// Stress monitor driving a [`HysteresisDetector`] from a [`SampleSource`].
///
/// A sampling error is logged and handled like an invalid reading: the
/// verdict is left as it was.
pub struct ThresholdStressMonitor<S> {
    name: String,
    state: Mutex<MonitorState<S>>,
}

impl<S: SampleSource> ThresholdStressMonitor<S> {
    pub fn new(name: impl Into<String>, source: S, thresholds: StressThresholds) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MonitorState {
                source,
                detector: HysteresisDetector::new(thresholds),
            }),
        }
    }

    /// Take one measurement and return whether the monitor is stressed
    fn poll(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let reading = match state.source.sample() {
            Ok(reading) if reading < 0.0 => f64::NAN,
            Ok(reading) => reading,
            Err(e) => {
                tracing::debug!("{}: discarding failed measurement: {}", self.name, e);
                f64::NAN
            }
        };
        let was_stressed = state.detector.is_stressed();
        let stressed = state.detector.observe(reading);
        if stressed != was_stressed {
            tracing::info!(
                "{}: {} (reading {:.3})",
                self.name,
                if stressed { "stress detected" } else { "stress relieved" },
                reading
            );
        }
        stressed
    }

    /// Current verdict without taking a measurement
    pub fn is_stressed(&self) -> bool {
        self.detector_snapshot().is_stressed()
    }

    pub fn detector_snapshot(&self) -> HysteresisDetector {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detector
            .clone()
    }
}

impl<S: SampleSource> StressMonitor for ThresholdStressMonitor<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_under_stress(&self) -> Result<bool> {
        Ok(self.poll())
    }

    fn is_stress_relieved(&self) -> Result<bool> {
        Ok(!self.poll())
    }

    fn stress_detection_info(&self) -> String {
        let detector = self.detector_snapshot();
        let thresholds = detector.thresholds();
        format!(
            "{}: stressed={}, stress_threshold={}, relief_threshold={}, consecutive={}, \
             high_streak={}, low_streak={}",
            self.name,
            detector.is_stressed(),
            thresholds.stress,
            thresholds.relief,
            thresholds.consecutive,
            detector.high_streak(),
            detector.low_streak(),
        )
    }
}

impl<S> fmt::Debug for ThresholdStressMonitor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThresholdStressMonitor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Read a procfs file as a string
pub(crate) fn read_proc_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| MonitorError::ReadError {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(consecutive: usize) -> HysteresisDetector {
        HysteresisDetector::new(StressThresholds::new(0.95, 0.70, consecutive))
    }

    fn scripted(samples: Vec<f64>) -> impl FnMut() -> f64 + Send {
        let mut samples = samples.into_iter();
        move || samples.next().unwrap_or(f64::NAN)
    }

    #[test]
    fn test_reference_sequence() {
        let samples = [
            0.4, 0.5, 0.99, 1.0, 1.0, 1.0, 0.6, 0.7, 0.98, 0.6, 0.7, 0.7, 0.99,
        ];
        let expected = [
            false, false, false, false, true, true, true, true, true, true, true, false, false,
        ];

        let mut d = detector(3);
        let verdicts: Vec<bool> = samples.iter().map(|&s| d.observe(s)).collect();
        assert_eq!(verdicts, expected);
    }

    #[test]
    fn test_dead_zone_resets_streaks() {
        let mut d = detector(3);
        d.observe(0.99);
        d.observe(0.99);
        assert_eq!(d.high_streak(), 2);

        d.observe(0.8);
        assert_eq!(d.high_streak(), 0);
        assert_eq!(d.low_streak(), 0);
        assert!(!d.is_stressed());

        d.observe(0.99);
        d.observe(0.99);
        assert!(!d.is_stressed());
        d.observe(0.99);
        assert!(d.is_stressed());
    }

    #[test]
    fn test_non_finite_readings_are_ignored() {
        let mut d = detector(2);
        d.observe(0.99);
        d.observe(f64::NAN);
        d.observe(f64::INFINITY);
        assert_eq!(d.high_streak(), 1);
        assert!(!d.is_stressed());

        d.observe(0.99);
        assert!(d.is_stressed());

        d.observe(f64::NEG_INFINITY);
        assert!(d.is_stressed());
        assert_eq!(d.low_streak(), 0);
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let mut d = detector(1);
        assert!(d.observe(0.95));
        assert!(!d.observe(0.70));
    }

    #[test]
    fn test_zero_consecutive_treated_as_one() {
        let mut d = detector(0);
        assert!(!d.observe(0.5));
        assert!(d.observe(0.99));
    }

    #[test]
    fn test_monitor_observers_are_negations() {
        let monitor = ThresholdStressMonitor::new(
            "test",
            scripted(vec![0.99, 0.99, 0.1, 0.1]),
            StressThresholds::new(0.95, 0.70, 2),
        );

        assert!(monitor.is_stress_relieved().unwrap());
        assert!(monitor.is_under_stress().unwrap());
        assert!(!monitor.is_stress_relieved().unwrap());
        assert!(!monitor.is_under_stress().unwrap());
    }

    #[test]
    fn test_negative_reading_means_unavailable() {
        let monitor = ThresholdStressMonitor::new(
            "test",
            scripted(vec![0.99, -1.0, 0.99]),
            StressThresholds::new(0.95, 0.70, 2),
        );
        assert!(!monitor.is_under_stress().unwrap());
        assert!(!monitor.is_under_stress().unwrap());
        assert_eq!(monitor.detector_snapshot().high_streak(), 1);
        assert!(monitor.is_under_stress().unwrap());
    }

    #[test]
    fn test_failed_sample_keeps_verdict() {
        struct Flaky(u32);
        impl SampleSource for Flaky {
            fn sample(&mut self) -> Result<f64> {
                self.0 += 1;
                if self.0 == 2 {
                    Err(MonitorError::Unavailable("sensor offline".to_string()))
                } else {
                    Ok(0.99)
                }
            }
        }

        let monitor = ThresholdStressMonitor::new(
            "flaky",
            Flaky(0),
            StressThresholds::new(0.95, 0.70, 2),
        );
        assert!(!monitor.is_under_stress().unwrap());
        assert!(!monitor.is_under_stress().unwrap());
        assert!(monitor.is_under_stress().unwrap());
    }

    #[test]
    fn test_stress_detection_info() {
        let monitor = ThresholdStressMonitor::new(
            "system-cpu",
            scripted(vec![]),
            StressThresholds::new(0.95, 0.8, 12),
        );
        let info = monitor.stress_detection_info();
        assert!(info.starts_with("system-cpu"));
        assert!(info.contains("stressed=false"));
        assert!(info.contains("consecutive=12"));
    }
}
