//! Tracer lifecycle: RUNNING/PAUSED gating
//!
//! Two independent inputs decide whether the tracer does any work:
//!
//! - the external recording switch (`set_recording`)
//! - automatic stress detection (`on_stress_detected`/`on_stress_relieved`)
//!
//! The tracer runs iff recording is on and no stress is reported. Either
//! input can pause the tracer and either can be the one that resumes it.
//! Transitions are serialized by a mutex; the hot path reads the state
//! through an atomic.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Tracer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TracerState {
    /// Not started yet
    Uninitialized,
    /// Fully functional
    Running,
    /// Idle and ready to resume quickly
    Paused,
    /// Stopped for good
    Stopped,
}

impl TracerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TracerState::Running,
            2 => TracerState::Paused,
            3 => TracerState::Stopped,
            _ => TracerState::Uninitialized,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            TracerState::Uninitialized => 0,
            TracerState::Running => 1,
            TracerState::Paused => 2,
            TracerState::Stopped => 3,
        }
    }
}

impl fmt::Display for TracerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TracerState::Uninitialized => "UNINITIALIZED",
            TracerState::Running => "RUNNING",
            TracerState::Paused => "PAUSED",
            TracerState::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// Callbacks on tracer state changes.
///
/// Errors are logged and suppressed; they never block a transition.
pub trait LifecycleListener: Send + Sync {
    fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn pause(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn resume(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct Control {
    recording: bool,
    under_stress: bool,
}

/// Owner of the tracer's RUNNING/PAUSED state
pub struct TracerLifecycle {
    state: AtomicU8,
    control: Mutex<Control>,
    listeners: RwLock<Vec<Arc<dyn LifecycleListener>>>,
}

impl TracerLifecycle {
    /// `recording` is the initial value of the external switch
    pub fn new(recording: bool) -> Self {
        Self {
            state: AtomicU8::new(TracerState::Uninitialized.as_u8()),
            control: Mutex::new(Control {
                recording,
                under_stress: false,
            }),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn LifecycleListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn state(&self) -> TracerState {
        TracerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether instrumentation should do tracing work
    pub fn is_running(&self) -> bool {
        self.state() == TracerState::Running
    }

    pub fn currently_paused(&self) -> bool {
        self.state() == TracerState::Paused
    }

    pub fn is_recording(&self) -> bool {
        self.lock_control().recording
    }

    pub fn is_under_stress(&self) -> bool {
        self.lock_control().under_stress
    }

    /// Move from UNINITIALIZED to RUNNING, or straight on to PAUSED when
    /// recording is off or stress was reported before start
    pub fn start(&self) {
        let control = self.lock_control();
        let state = self.state();
        if state != TracerState::Uninitialized {
            tracing::warn!("Trying to start an already initialized tracer ({})", state);
            return;
        }
        self.notify("start", |l| l.start());
        self.set_state(TracerState::Running);
        if control.recording && !control.under_stress {
            tracing::info!("Tracer switched to RUNNING state");
        } else {
            self.pause();
        }
    }

    /// Stop the tracer. STOPPED is final.
    pub fn stop(&self) {
        let _control = self.lock_control();
        if self.state() == TracerState::Stopped {
            return;
        }
        self.notify("stop", |l| l.stop());
        self.set_state(TracerState::Stopped);
        tracing::info!("Tracer switched to STOPPED state");
    }

    pub fn on_stress_detected(&self) {
        let mut control = self.lock_control();
        control.under_stress = true;
        if self.state() == TracerState::Running {
            self.pause();
        }
    }

    pub fn on_stress_relieved(&self) {
        let mut control = self.lock_control();
        control.under_stress = false;
        if self.state() == TracerState::Paused && control.recording {
            self.resume();
        }
    }

    /// Flip the external recording switch
    pub fn set_recording(&self, recording: bool) {
        let mut control = self.lock_control();
        let state = self.state();
        if control.recording && !recording && state == TracerState::Running {
            self.pause();
        } else if !control.recording
            && recording
            && state == TracerState::Paused
            && !control.under_stress
        {
            self.resume();
        }
        control.recording = recording;
    }

    // Callers hold the control lock.
    fn pause(&self) {
        let state = self.state();
        if state != TracerState::Running {
            tracing::warn!("Attempting to pause the tracer when it is in a {} state", state);
            return;
        }
        self.set_state(TracerState::Paused);
        tracing::info!("Tracer switched to PAUSED state");
        self.notify("pause", |l| l.pause());
    }

    // Callers hold the control lock.
    fn resume(&self) {
        let state = self.state();
        if state != TracerState::Paused {
            tracing::warn!("Attempting to resume the tracer when it is in a {} state", state);
            return;
        }
        self.notify("resume", |l| l.resume());
        self.set_state(TracerState::Running);
        tracing::info!("Tracer switched to RUNNING state");
    }

    fn notify(&self, event: &str, call: impl Fn(&dyn LifecycleListener) -> anyhow::Result<()>) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            if let Err(e) = call(listener.as_ref()) {
                tracing::warn!("Suppressed error while calling {}(): {:#}", event, e);
            }
        }
    }

    fn set_state(&self, state: TracerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn lock_control(&self) -> std::sync::MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TracerLifecycle {
    fn default() -> Self {
        Self::new(true)
    }
}

impl fmt::Debug for TracerLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerLifecycle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
