//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `quill_core::api` instead of reaching into internal modules.

pub use crate::config::{
    load_default, load_from_path, validate, AppConfig, BackendConfig, BackendKind, Device,
    GenerationParams, LoggingConfig, StreamConfig,
};
pub use crate::error::{CliError, SinkError, StreamError, TransitionError};
pub use crate::progress::ProgressIndicator;
pub use crate::runner::{
    ControllerOptions, GenerationController, KillSwitch, ModelProvider, ModelSession, RunOutcome,
    RunPhase, TokenStream,
};
pub use crate::sink::{
    normalize_trailing_newline, normalized_prompt, AppendFileSink, OutputSink, RawStreamSink,
    SinkKind, TerminalLineSink,
};
pub use crate::terminal::{restore_terminal, InputGuard, TerminalDevice};
pub use crate::text::{is_boundary, LookaheadBuffer};
