use std::time::Duration;

use serde::Serialize;

use crate::config::StreamConfig;

use super::state::RunPhase;

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    /// Phase the run settled in before shutdown (`completed` or `killed`).
    pub phase: RunPhase,
    /// Tokens written to the sink, live and tail together.
    pub emitted: usize,
    /// Tokens dropped by tail trimming.
    pub trimmed: usize,
    pub disposal_deferred: bool,
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn was_killed(&self) -> bool {
        self.phase == RunPhase::Killed
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub lookahead_depth: usize,
    pub tail_interval: Duration,
    pub dispose_grace: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from(&StreamConfig::default())
    }
}

impl From<&StreamConfig> for ControllerOptions {
    fn from(cfg: &StreamConfig) -> Self {
        Self {
            lookahead_depth: cfg.lookahead_depth.max(1),
            tail_interval: Duration::from_millis(cfg.tail_interval_ms),
            dispose_grace: Duration::from_millis(cfg.dispose_grace_ms),
        }
    }
}
