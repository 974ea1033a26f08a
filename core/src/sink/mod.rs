//! Output sinks: where emitted tokens go. Exactly one is chosen per run.

mod append_file;
mod raw_stream;
mod terminal_line;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::SinkError;

pub use append_file::{normalize_trailing_newline, normalized_prompt, AppendFileSink};
pub use raw_stream::RawStreamSink;
pub use terminal_line::TerminalLineSink;

#[async_trait]
pub trait OutputSink: Send {
    fn name(&self) -> &'static str;

    /// Live terminal output; the progress spinner must be gone before the
    /// first token lands.
    fn is_interactive(&self) -> bool {
        false
    }

    /// One-time setup before the first write.
    async fn prepare(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn write(&mut self, token: &str) -> Result<(), SinkError>;

    /// Terminate output with a newline and flush.
    async fn finish(&mut self) -> Result<(), SinkError>;
}

pub enum SinkKind {
    TerminalLine(TerminalLineSink<std::io::Stdout>),
    RawStream(RawStreamSink<tokio::io::Stdout>),
    AppendFile(AppendFileSink),
}

impl SinkKind {
    /// Append mode wins; otherwise pick by whether stdout is a terminal. On a
    /// terminal the continuation is shown after `prompt` on the same line.
    pub fn select(append_to: Option<PathBuf>, stdout_is_tty: bool, prompt: &str) -> Self {
        match append_to {
            Some(path) => SinkKind::AppendFile(AppendFileSink::new(path)),
            None if stdout_is_tty => {
                SinkKind::TerminalLine(TerminalLineSink::stdout().with_line(prompt))
            }
            None => SinkKind::RawStream(RawStreamSink::stdout()),
        }
    }
}

#[async_trait]
impl OutputSink for SinkKind {
    fn name(&self) -> &'static str {
        match self {
            SinkKind::TerminalLine(s) => s.name(),
            SinkKind::RawStream(s) => s.name(),
            SinkKind::AppendFile(s) => s.name(),
        }
    }

    fn is_interactive(&self) -> bool {
        matches!(self, SinkKind::TerminalLine(_))
    }

    async fn prepare(&mut self) -> Result<(), SinkError> {
        match self {
            SinkKind::TerminalLine(s) => s.prepare().await,
            SinkKind::RawStream(s) => s.prepare().await,
            SinkKind::AppendFile(s) => s.prepare().await,
        }
    }

    async fn write(&mut self, token: &str) -> Result<(), SinkError> {
        match self {
            SinkKind::TerminalLine(s) => s.write(token).await,
            SinkKind::RawStream(s) => s.write(token).await,
            SinkKind::AppendFile(s) => s.write(token).await,
        }
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        match self {
            SinkKind::TerminalLine(s) => s.finish().await,
            SinkKind::RawStream(s) => s.finish().await,
            SinkKind::AppendFile(s) => s.finish().await,
        }
    }
}
