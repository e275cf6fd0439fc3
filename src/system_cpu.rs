//! System CPU stress monitor
//!
//! Reads aggregate CPU time counters from `/proc/stat` and reports the busy
//! ratio over the interval since the previous poll. The first poll has no
//! baseline and reports NaN, which the detector discards.

use crate::stress_monitor::{
    read_proc_file, MonitorError, Result, SampleSource, StressMonitor, StressThresholds,
    ThresholdStressMonitor,
};
use std::path::PathBuf;

const PROC_STAT: &str = "/proc/stat";

/// Cumulative CPU time counters of the aggregate `cpu` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub busy: u64,
    pub total: u64,
}

impl CpuTimes {
    /// Busy ratio between `earlier` and `self`, NaN if no time elapsed
    pub fn load_since(&self, earlier: &CpuTimes) -> f64 {
        let total = self.total.saturating_sub(earlier.total);
        if total == 0 {
            return f64::NAN;
        }
        let busy = self.busy.saturating_sub(earlier.busy);
        (busy as f64 / total as f64).clamp(0.0, 1.0)
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
///
/// Format: `cpu user nice system idle iowait irq softirq steal guest guest_nice`.
/// Guest time is already included in user time and is not added again.
pub fn parse_proc_stat(content: &str) -> Option<CpuTimes> {
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(|f| f.parse().ok())
        .collect::<Option<_>>()?;
    if fields.len() < 4 {
        return None;
    }

    let total: u64 = fields.iter().sum();
    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        busy: total.saturating_sub(idle),
        total,
    })
}

/// System CPU load from `/proc/stat` deltas
#[derive(Debug)]
pub struct ProcStatCpuLoad {
    path: PathBuf,
    previous: Option<CpuTimes>,
}

impl ProcStatCpuLoad {
    pub fn new() -> Self {
        Self::with_path(PROC_STAT)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            previous: None,
        }
    }
}

impl Default for ProcStatCpuLoad {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for ProcStatCpuLoad {
    fn sample(&mut self) -> Result<f64> {
        let content = read_proc_file(&self.path)?;
        let current = parse_proc_stat(&content).ok_or_else(|| MonitorError::ParseError {
            path: self.path.display().to_string(),
            detail: "missing or malformed aggregate cpu line".to_string(),
        })?;

        let load = match self.previous {
            Some(previous) => current.load_since(&previous),
            None => f64::NAN,
        };
        self.previous = Some(current);
        Ok(load)
    }
}

/// Stress monitor over the host's CPU load
pub struct SystemCpuStressMonitor<S = ProcStatCpuLoad> {
    inner: ThresholdStressMonitor<S>,
}

impl SystemCpuStressMonitor<ProcStatCpuLoad> {
    pub fn new(thresholds: StressThresholds) -> Self {
        Self::with_source(ProcStatCpuLoad::new(), thresholds)
    }
}

impl<S: SampleSource> SystemCpuStressMonitor<S> {
    pub fn with_source(source: S, thresholds: StressThresholds) -> Self {
        Self {
            inner: ThresholdStressMonitor::new("system-cpu", source, thresholds),
        }
    }

    pub fn is_stressed(&self) -> bool {
        self.inner.is_stressed()
    }
}

impl<S: SampleSource> StressMonitor for SystemCpuStressMonitor<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_under_stress(&self) -> Result<bool> {
        self.inner.is_under_stress()
    }

    fn is_stress_relieved(&self) -> Result<bool> {
        self.inner.is_stress_relieved()
    }

    fn stress_detection_info(&self) -> String {
        self.inner.stress_detection_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const STAT_A: &str = "cpu  100 0 100 700 100 0 0 0 0 0\ncpu0 50 0 50 350 50 0 0 0 0 0\nintr 1\n";
    const STAT_B: &str = "cpu  250 0 150 750 150 0 0 0 0 0\ncpu0 125 0 75 375 75 0 0 0 0 0\nintr 2\n";

    #[test]
    fn test_parse_proc_stat() {
        let times = parse_proc_stat(STAT_A).unwrap();
        assert_eq!(times.total, 1000);
        assert_eq!(times.busy, 200);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_proc_stat("intr 1 2 3\n").is_none());
        assert!(parse_proc_stat("cpu  1 x 3 4\n").is_none());
        assert!(parse_proc_stat("cpu  1 2\n").is_none());
    }

    #[test]
    fn test_load_since() {
        let a = parse_proc_stat(STAT_A).unwrap();
        let b = parse_proc_stat(STAT_B).unwrap();
        // busy 200 -> 400, total 1000 -> 1300
        assert!((b.load_since(&a) - 200.0 / 300.0).abs() < 1e-9);
        assert!(a.load_since(&a).is_nan());
    }

    #[test]
    fn test_proc_stat_source_needs_baseline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(STAT_A.as_bytes()).unwrap();

        let mut source = ProcStatCpuLoad::with_path(file.path());
        assert!(source.sample().unwrap().is_nan());

        std::fs::write(file.path(), STAT_B).unwrap();
        let load = source.sample().unwrap();
        assert!((load - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_proc_stat_is_error() {
        let mut source = ProcStatCpuLoad::with_path("/nonexistent/stat");
        assert!(matches!(
            source.sample(),
            Err(MonitorError::ReadError { .. })
        ));
    }

    #[test]
    fn test_monitor_with_scripted_load() {
        let mut loads = vec![0.97, 0.98, 0.99, 0.2, 0.1, 0.1].into_iter();
        let monitor = SystemCpuStressMonitor::with_source(
            move || loads.next().unwrap_or(f64::NAN),
            StressThresholds::new(0.95, 0.80, 3),
        );

        assert!(!monitor.is_under_stress().unwrap());
        assert!(!monitor.is_under_stress().unwrap());
        assert!(monitor.is_under_stress().unwrap());
        assert!(!monitor.is_stress_relieved().unwrap());
        assert!(!monitor.is_stress_relieved().unwrap());
        assert!(monitor.is_stress_relieved().unwrap());
        assert_eq!(monitor.name(), "system-cpu");
    }

    #[test]
    fn test_unavailable_source_never_stresses() {
        let monitor = SystemCpuStressMonitor::with_source(
            ProcStatCpuLoad::with_path("/nonexistent/stat"),
            StressThresholds::new(0.95, 0.80, 1),
        );
        for _ in 0..5 {
            assert!(!monitor.is_under_stress().unwrap());
        }
    }
}
