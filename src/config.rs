//! Configuration for pools and the circuit breaker
//!
//! Values are read from a TOML document; every field has a default so an
//! empty document is a valid configuration.
//!
//! ```toml
//! recording = true
//!
//! [circuit_breaker]
//! enabled = true
//! stress_monitoring_interval_ms = 5000
//! cpu_duration_threshold_ms = 60000
//! system_cpu_stress_threshold = 0.95
//! system_cpu_relief_threshold = 0.80
//!
//! [pools]
//! max_queue_size = 512
//! ```

use crate::stress_monitor::StressThresholds;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Shortest accepted poll interval
pub const MIN_POLL_INTERVAL_MS: u64 = 1_000;

/// Shortest accepted CPU stress duration
pub const MIN_CPU_DURATION_MS: u64 = 60_000;

/// Largest accepted pool capacity
pub const MAX_POOL_CAPACITY: usize = 1 << 16;

/// Errors raised while reading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{key} must be at least {min_ms}ms, got {actual_ms}ms")]
    DurationTooShort {
        key: &'static str,
        min_ms: u64,
        actual_ms: u64,
    },

    #[error("{key} must be within [0.0, 1.0], got {value}")]
    ThresholdOutOfRange { key: &'static str, value: f64 },

    #[error("{relief_key} ({relief}) must not exceed {stress_key} ({stress})")]
    InvertedThresholds {
        stress_key: &'static str,
        stress: f64,
        relief_key: &'static str,
        relief: f64,
    },

    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },

    #[error("{key} must be at most {max}, got {actual}")]
    CapacityTooLarge {
        key: &'static str,
        max: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Initial value of the external recording switch.
    ///
    /// When false the tracer starts PAUSED and stays there until recording is
    /// switched back on.
    pub recording: bool,
    pub circuit_breaker: CircuitBreakerConfig,
    pub pools: PoolConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            recording: true,
            circuit_breaker: CircuitBreakerConfig::default(),
            pools: PoolConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.circuit_breaker.validate()?;
        self.pools.validate()
    }
}

/// Circuit breaker and stress monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Poll the stress monitors and pause tracing under stress
    pub enabled: bool,

    /// Interval between two polls of the monitors
    pub stress_monitoring_interval_ms: u64,

    /// How long system CPU must stay past a threshold before the verdict flips.
    ///
    /// Converted to a number of consecutive measurements by dividing by the
    /// poll interval.
    pub cpu_duration_threshold_ms: u64,

    /// System CPU ratio at or above which a measurement counts as stressed
    pub system_cpu_stress_threshold: f64,

    /// System CPU ratio at or below which a measurement counts as relieved
    pub system_cpu_relief_threshold: f64,

    /// Used-memory ratio at or above which a measurement counts as stressed
    pub memory_stress_threshold: f64,

    /// Used-memory ratio at or below which a measurement counts as relieved
    pub memory_relief_threshold: f64,

    /// Consecutive memory measurements required to flip the verdict
    pub memory_consecutive_measurements: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            stress_monitoring_interval_ms: 5_000,
            cpu_duration_threshold_ms: 60_000,
            system_cpu_stress_threshold: 0.95,
            system_cpu_relief_threshold: 0.80,
            memory_stress_threshold: 0.95,
            memory_relief_threshold: 0.75,
            memory_consecutive_measurements: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.stress_monitoring_interval_ms)
    }

    /// Number of consecutive CPU measurements covering the duration threshold
    pub fn cpu_consecutive_measurements(&self) -> usize {
        let interval = self.stress_monitoring_interval_ms.max(1);
        (self.cpu_duration_threshold_ms / interval).max(1) as usize
    }

    pub fn cpu_thresholds(&self) -> StressThresholds {
        StressThresholds::new(
            self.system_cpu_stress_threshold,
            self.system_cpu_relief_threshold,
            self.cpu_consecutive_measurements(),
        )
    }

    pub fn memory_thresholds(&self) -> StressThresholds {
        StressThresholds::new(
            self.memory_stress_threshold,
            self.memory_relief_threshold,
            self.memory_consecutive_measurements,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.stress_monitoring_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(ConfigError::DurationTooShort {
                key: "stress_monitoring_interval_ms",
                min_ms: MIN_POLL_INTERVAL_MS,
                actual_ms: self.stress_monitoring_interval_ms,
            });
        }
        if self.cpu_duration_threshold_ms < MIN_CPU_DURATION_MS {
            return Err(ConfigError::DurationTooShort {
                key: "cpu_duration_threshold_ms",
                min_ms: MIN_CPU_DURATION_MS,
                actual_ms: self.cpu_duration_threshold_ms,
            });
        }
        if self.memory_consecutive_measurements == 0 {
            return Err(ConfigError::Zero {
                key: "memory_consecutive_measurements",
            });
        }
        check_pair(
            ("system_cpu_stress_threshold", self.system_cpu_stress_threshold),
            ("system_cpu_relief_threshold", self.system_cpu_relief_threshold),
        )?;
        check_pair(
            ("memory_stress_threshold", self.memory_stress_threshold),
            ("memory_relief_threshold", self.memory_relief_threshold),
        )
    }
}

fn check_ratio(key: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ThresholdOutOfRange { key, value })
    }
}

fn check_pair(stress: (&'static str, f64), relief: (&'static str, f64)) -> Result<()> {
    check_ratio(stress.0, stress.1)?;
    check_ratio(relief.0, relief.1)?;
    if relief.1 > stress.1 {
        return Err(ConfigError::InvertedThresholds {
            stress_key: stress.0,
            stress: stress.1,
            relief_key: relief.0,
            relief: relief.1,
        });
    }
    Ok(())
}

/// Pool capacities per record kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Reporter queue size the default capacities are derived from
    pub max_queue_size: usize,
    pub transaction_capacity: Option<usize>,
    pub span_capacity: Option<usize>,
    pub error_capacity: Option<usize>,
    pub span_link_capacity: Option<usize>,
    pub stack_trace_id_capacity: Option<usize>,
}

/// Upper bound on links per span, the span link pool holds ten spans' worth
pub const MAX_SPAN_LINKS_PER_SPAN: usize = 1_000;

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 512,
            transaction_capacity: None,
            span_capacity: None,
            error_capacity: None,
            span_link_capacity: None,
            stack_trace_id_capacity: None,
        }
    }
}

impl PoolConfig {
    fn max_pooled_elements(&self) -> usize {
        self.max_queue_size.saturating_mul(2)
    }

    pub fn transaction_capacity(&self) -> usize {
        self.transaction_capacity
            .unwrap_or_else(|| self.max_pooled_elements())
    }

    pub fn span_capacity(&self) -> usize {
        self.span_capacity
            .unwrap_or_else(|| self.max_pooled_elements())
    }

    pub fn error_capacity(&self) -> usize {
        self.error_capacity
            .unwrap_or_else(|| self.max_pooled_elements() / 2)
    }

    pub fn span_link_capacity(&self) -> usize {
        self.span_link_capacity
            .unwrap_or(MAX_SPAN_LINKS_PER_SPAN * 10)
    }

    pub fn stack_trace_id_capacity(&self) -> usize {
        self.stack_trace_id_capacity
            .unwrap_or_else(|| self.max_pooled_elements())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::Zero {
                key: "max_queue_size",
            });
        }
        let capacities = [
            ("transaction_capacity", self.transaction_capacity()),
            ("span_capacity", self.span_capacity()),
            ("error_capacity", self.error_capacity()),
            ("span_link_capacity", self.span_link_capacity()),
            ("stack_trace_id_capacity", self.stack_trace_id_capacity()),
        ];
        for (key, actual) in capacities {
            if actual > MAX_POOL_CAPACITY {
                return Err(ConfigError::CapacityTooLarge {
                    key,
                    max: MAX_POOL_CAPACITY,
                    actual,
                });
            }
        }
        Ok(())
    }
}
