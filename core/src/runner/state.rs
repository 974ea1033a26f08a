//! Run state machine for one generation.
//!
//! `RunState` is owned by the controller, which is the only caller of
//! [`RunState::transition`]. The busy flag and the kill token are shared with
//! other tasks through a [`KillSwitch`] so that input listeners and signal
//! handlers can request cancellation without touching the phase.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::TransitionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Busy,
    Completed,
    Killed,
    ShuttingDown,
    Terminated,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Terminated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Busy => "busy",
            RunPhase::Completed => "completed",
            RunPhase::Killed => "killed",
            RunPhase::ShuttingDown => "shutting_down",
            RunPhase::Terminated => "terminated",
        }
    }
}

pub struct StateTransition;

impl StateTransition {
    pub fn validate(from: RunPhase, to: RunPhase) -> Result<(), TransitionError> {
        if from.is_terminal() {
            return Err(TransitionError::FromTerminalState { state: from });
        }

        let is_valid = matches!(
            (from, to),
            (RunPhase::Idle, RunPhase::Busy)
                | (RunPhase::Busy, RunPhase::Completed)
                | (RunPhase::Busy, RunPhase::Killed)
                // kill or sink failure while the tail is being paced out
                | (RunPhase::Completed, RunPhase::Killed)
                // failure before the stream ever started
                | (RunPhase::Idle, RunPhase::ShuttingDown)
                | (RunPhase::Completed, RunPhase::ShuttingDown)
                | (RunPhase::Killed, RunPhase::ShuttingDown)
                | (RunPhase::ShuttingDown, RunPhase::Terminated)
        );

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }
}

#[derive(Debug, Default)]
struct RunFlags {
    busy: AtomicBool,
    /// Set while the drained tail is written out after the source ended.
    pacing: AtomicBool,
    kill: CancellationToken,
}

#[derive(Debug)]
pub struct RunState {
    phase: RunPhase,
    flags: Arc<RunFlags>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
            flags: Arc::new(RunFlags::default()),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.flags.busy.load(Ordering::SeqCst)
    }

    /// One-way: once set it is never cleared.
    pub fn is_killed(&self) -> bool {
        self.flags.kill.is_cancelled()
    }

    /// Token handed to the token source as its "continue?" signal.
    pub fn cancel_token(&self) -> CancellationToken {
        self.flags.kill.clone()
    }

    pub fn kill_switch(&self) -> KillSwitch {
        KillSwitch {
            flags: Arc::clone(&self.flags),
        }
    }

    pub(crate) fn transition(&mut self, to: RunPhase) -> Result<(), TransitionError> {
        StateTransition::validate(self.phase, to)?;
        tracing::debug!(from = self.phase.as_str(), to = to.as_str(), "run phase");
        self.phase = to;
        Ok(())
    }

    pub(crate) fn set_busy(&self, busy: bool) {
        self.flags.busy.store(busy, Ordering::SeqCst);
    }

    pub(crate) fn set_pacing(&self, pacing: bool) {
        self.flags.pacing.store(pacing, Ordering::SeqCst);
    }

    /// Kill regardless of busy; used for stream and sink failures.
    pub(crate) fn fail(&self) {
        self.flags.kill.cancel();
    }
}

/// Cloneable handle for requesting cancellation from outside the controller.
#[derive(Debug, Clone)]
pub struct KillSwitch {
    flags: Arc<RunFlags>,
}

impl KillSwitch {
    /// Honored while a stream is being consumed or its tail is being paced
    /// out. Returns whether the request took effect.
    pub fn request_kill(&self) -> bool {
        let live = self.flags.busy.load(Ordering::SeqCst)
            || self.flags.pacing.load(Ordering::SeqCst);
        if !live {
            tracing::debug!("kill request ignored: not generating");
            return false;
        }
        if !self.flags.kill.is_cancelled() {
            tracing::info!("generation cancelled by user");
        }
        self.flags.kill.cancel();
        true
    }

    pub fn is_killed(&self) -> bool {
        self.flags.kill.is_cancelled()
    }
}
