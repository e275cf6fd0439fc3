//! Stress-driven circuit breaker
//!
//! A dedicated poller thread wakes up every `stress_monitoring_interval` and
//! evaluates every registered [`StressMonitor`]:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ POLLER THREAD                                                │
//! │   not under stress: ANY monitor stressed  → on_stress_detected│
//! │   under stress:     ALL monitors relieved → on_stress_relieved│
//! └──────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//!               TracerLifecycle (RUNNING/PAUSED)
//!                           │
//!                           ▼
//!        instrumentation checks is_running() on the hot path
//! ```
//!
//! The monitor set is a copy-on-write list behind an `ArcSwap`: registration
//! swaps in a new list while a poll in progress keeps iterating its own
//! snapshot. A monitor that fails or panics is logged and treated as having
//! produced no new information for that poll.

use crate::config::CircuitBreakerConfig;
use crate::lifecycle::{TracerLifecycle, TracerState};
use crate::memory_stress::MemoryStressMonitor;
use crate::stress_monitor::StressMonitor;
use crate::system_cpu::SystemCpuStressMonitor;
use arc_swap::ArcSwap;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

type MonitorList = Vec<Arc<dyn StressMonitor>>;

struct Shared {
    tracer: Arc<TracerLifecycle>,
    monitors: ArcSwap<MonitorList>,
    enabled: AtomicBool,
    /// Held for the duration of a poll; guards the breaker's stress verdict
    poll_state: Mutex<bool>,
}

struct Poller {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// Pauses and resumes the tracer based on registered stress monitors
pub struct CircuitBreaker {
    shared: Arc<Shared>,
    interval: Duration,
    poller: Mutex<Option<Poller>>,
}

impl CircuitBreaker {
    /// Create a breaker with no monitors registered
    pub fn new(config: &CircuitBreakerConfig, tracer: Arc<TracerLifecycle>) -> Self {
        Self {
            shared: Arc::new(Shared {
                tracer,
                monitors: ArcSwap::from_pointee(Vec::new()),
                enabled: AtomicBool::new(config.enabled),
                poll_state: Mutex::new(false),
            }),
            interval: config.poll_interval(),
            poller: Mutex::new(None),
        }
    }

    /// Create a breaker watching system CPU and host memory
    pub fn with_default_monitors(
        config: &CircuitBreakerConfig,
        tracer: Arc<TracerLifecycle>,
    ) -> Self {
        let breaker = Self::new(config, tracer);
        breaker.register_stress_monitor(Arc::new(SystemCpuStressMonitor::new(
            config.cpu_thresholds(),
        )));
        breaker.register_stress_monitor(Arc::new(MemoryStressMonitor::new(
            config.memory_thresholds(),
        )));
        breaker
    }

    pub fn register_stress_monitor(&self, monitor: Arc<dyn StressMonitor>) {
        tracing::debug!("Registering stress monitor {}", monitor.name());
        self.shared.monitors.rcu(|current| {
            let mut next = MonitorList::clone(current);
            next.push(monitor.clone());
            next
        });
    }

    /// Remove a monitor; returns whether it was registered
    pub fn unregister_stress_monitor(&self, monitor: &Arc<dyn StressMonitor>) -> bool {
        let target = Arc::as_ptr(monitor) as *const ();
        let previous = self.shared.monitors.rcu(|current| {
            current
                .iter()
                .filter(|m| Arc::as_ptr(m) as *const () != target)
                .cloned()
                .collect::<MonitorList>()
        });
        let removed = previous.iter().any(|m| Arc::as_ptr(m) as *const () == target);
        if removed {
            tracing::debug!("Unregistered stress monitor {}", monitor.name());
        }
        removed
    }

    pub fn monitor_count(&self) -> usize {
        self.shared.monitors.load().len()
    }

    /// Diagnostic description of every registered monitor
    pub fn stress_detection_info(&self) -> Vec<String> {
        self.shared
            .monitors
            .load()
            .iter()
            .map(|m| m.stress_detection_info())
            .collect()
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Enable or disable polling.
    ///
    /// Disabling while under stress hands the tracer a relief signal so it is
    /// not left paused by a breaker that no longer polls.
    pub fn set_enabled(&self, enabled: bool) {
        let mut under_stress = self.shared.lock_poll_state();
        self.shared.enabled.store(enabled, Ordering::Release);
        if !enabled && *under_stress {
            *under_stress = false;
            self.shared.tracer.on_stress_relieved();
        }
    }

    /// Whether the breaker currently holds the tracer paused for stress
    pub fn is_currently_under_stress(&self) -> bool {
        *self.shared.lock_poll_state()
    }

    pub fn currently_paused(&self) -> bool {
        self.shared.tracer.currently_paused()
    }

    pub fn state(&self) -> TracerState {
        self.shared.tracer.state()
    }

    /// Run one poll of every registered monitor
    pub fn poll_once(&self) {
        self.shared.poll();
    }

    /// Spawn the poller thread. Calling it again while running is a no-op.
    pub fn start(&self) -> std::io::Result<()> {
        let mut poller = self.lock_poller();
        if poller.is_some() {
            return Ok(());
        }

        let (shutdown, shutdown_rx) = channel::bounded::<()>(1);
        let shared = self.shared.clone();
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name("stress-monitor-poller".to_string())
            .spawn(move || loop {
                match shutdown_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => shared.poll(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        tracing::info!(
            "Circuit breaker polling every {:?} ({} monitors)",
            interval,
            self.monitor_count()
        );
        *poller = Some(Poller { shutdown, handle });
        Ok(())
    }

    /// Stop the poller thread and wait for an in-flight poll to finish.
    ///
    /// The tracer keeps whatever state the last poll left it in.
    pub fn stop(&self) {
        let Some(poller) = self.lock_poller().take() else {
            return;
        };
        let _ = poller.shutdown.send(());
        if poller.handle.join().is_err() {
            tracing::warn!("Stress monitor poller thread panicked");
        }
        tracing::debug!("Circuit breaker stopped");
    }

    pub fn is_polling(&self) -> bool {
        self.lock_poller().is_some()
    }

    fn lock_poller(&self) -> std::sync::MutexGuard<'_, Option<Poller>> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Shared {
    fn poll(&self) {
        let mut under_stress = self.lock_poll_state();
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }

        // Every monitor takes a sample on every poll, so no short-circuiting
        let monitors = self.monitors.load_full();
        if !*under_stress {
            let stressed = monitors
                .iter()
                .map(|m| check(m.as_ref(), "is_under_stress", |m| m.is_under_stress()))
                .fold(false, |any, s| any | s.unwrap_or(false));
            if stressed {
                tracing::info!("Stress detected, pausing tracer");
                *under_stress = true;
                self.tracer.on_stress_detected();
            }
        } else {
            let relieved = monitors
                .iter()
                .map(|m| check(m.as_ref(), "is_stress_relieved", |m| m.is_stress_relieved()))
                .fold(true, |all, r| all & r.unwrap_or(true));
            if relieved {
                tracing::info!("Stress relieved, resuming tracer");
                *under_stress = false;
                self.tracer.on_stress_relieved();
            }
        }
    }

    fn lock_poll_state(&self) -> std::sync::MutexGuard<'_, bool> {
        self.poll_state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ask one monitor; `None` if it failed or panicked.
///
/// A failed monitor has no say in the poll: it neither triggers stress nor
/// holds back relief.
fn check(
    monitor: &dyn StressMonitor,
    what: &str,
    ask: impl Fn(&dyn StressMonitor) -> crate::stress_monitor::Result<bool>,
) -> Option<bool> {
    match panic::catch_unwind(AssertUnwindSafe(|| ask(monitor))) {
        Ok(Ok(verdict)) => Some(verdict),
        Ok(Err(e)) => {
            tracing::warn!("Stress monitor {} failed in {}(): {}", monitor.name(), what, e);
            None
        }
        Err(_) => {
            tracing::warn!("Stress monitor {} panicked in {}()", monitor.name(), what);
            None
        }
    }
}

impl Drop for CircuitBreaker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("enabled", &self.is_enabled())
            .field("interval", &self.interval)
            .field("monitors", &self.monitor_count())
            .field("state", &self.state())
            .finish()
    }
}
