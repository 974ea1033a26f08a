use thiserror::Error;

use crate::runner::RunPhase;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("input error: {0}")]
    Input(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Failures that end a generation run early. The controller never bubbles
/// these up; they are logged and turned into a killed run.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("token source failed: {0}")]
    Source(#[source] anyhow::Error),
    #[error("sink write failed: {0}")]
    Sink(#[from] SinkError),
    #[error("invalid state transition: {0}")]
    Transition(#[from] TransitionError),
}

impl StreamError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Source(_) => "stream.source_failed",
            Self::Sink(_) => "stream.sink_failed",
            Self::Transition(_) => "stream.bad_transition",
        }
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("{sink} write failed: {source}")]
    Write {
        sink: &'static str,
        source: std::io::Error,
    },
    #[error("append target normalization failed for {path}: {source}")]
    Normalize {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: RunPhase, to: RunPhase },
    #[error("cannot transition from terminal state {state:?}")]
    FromTerminalState { state: RunPhase },
}
