//! Host memory stress monitor
//!
//! Reports the used-memory ratio `1 - MemAvailable / MemTotal` from
//! `/proc/meminfo`. Unlike CPU load this is a level, not a rate, so every
//! poll is a valid reading on its own.

use crate::stress_monitor::{
    read_proc_file, MonitorError, Result, SampleSource, StressMonitor, StressThresholds,
    ThresholdStressMonitor,
};
use std::path::PathBuf;

const PROC_MEMINFO: &str = "/proc/meminfo";

/// Used-memory ratio from a meminfo document, `None` if a field is missing
pub fn parse_meminfo(content: &str) -> Option<f64> {
    let field = |name: &str| -> Option<u64> {
        content
            .lines()
            .find_map(|line| line.strip_prefix(name)?.strip_prefix(':'))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|value| value.parse().ok())
    };

    let total = field("MemTotal")?;
    let available = field("MemAvailable")?;
    if total == 0 {
        return None;
    }
    Some(1.0 - (available.min(total) as f64 / total as f64))
}

/// Used-memory ratio read from `/proc/meminfo`
#[derive(Debug)]
pub struct MemInfoUsage {
    path: PathBuf,
}

impl MemInfoUsage {
    pub fn new() -> Self {
        Self::with_path(PROC_MEMINFO)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for MemInfoUsage {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for MemInfoUsage {
    fn sample(&mut self) -> Result<f64> {
        let content = read_proc_file(&self.path)?;
        parse_meminfo(&content).ok_or_else(|| MonitorError::ParseError {
            path: self.path.display().to_string(),
            detail: "MemTotal or MemAvailable missing".to_string(),
        })
    }
}

/// Stress monitor over the host's memory usage
pub struct MemoryStressMonitor<S = MemInfoUsage> {
    inner: ThresholdStressMonitor<S>,
}

impl MemoryStressMonitor<MemInfoUsage> {
    pub fn new(thresholds: StressThresholds) -> Self {
        Self::with_source(MemInfoUsage::new(), thresholds)
    }
}

impl<S: SampleSource> MemoryStressMonitor<S> {
    pub fn with_source(source: S, thresholds: StressThresholds) -> Self {
        Self {
            inner: ThresholdStressMonitor::new("memory", source, thresholds),
        }
    }
}

impl<S: SampleSource> StressMonitor for MemoryStressMonitor<S> {
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
