use std::io::{self, Write};

use async_trait::async_trait;
use crossterm::queue;
use crossterm::style::Print;

use super::OutputSink;
use crate::error::SinkError;

/// Appends tokens to the current line of an interactive terminal.
///
/// The line starts with the prompt (see [`TerminalLineSink::with_line`]) so
/// the continuation reads as one piece of text. The terminal is in raw mode
/// while generating, so output post-processing is off and a bare `\n` would
/// not return the carriage.
pub struct TerminalLineSink<W: Write + Send> {
    out: W,
    line: Option<String>,
}

impl TerminalLineSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TerminalLineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, line: None }
    }

    /// Text already on the line; written by `prepare` before any token.
    pub fn with_line(mut self, text: impl Into<String>) -> Self {
        self.line = Some(text.into());
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn put(&mut self, text: &str) -> io::Result<()> {
        let text = to_crlf(text);
        queue!(self.out, Print(text))?;
        self.out.flush()
    }
}

fn to_crlf(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    let mut prev = None;
    for c in text.chars() {
        if c == '\n' && prev != Some('\r') {
            out.push('\r');
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

#[async_trait]
impl<W: Write + Send> OutputSink for TerminalLineSink<W> {
    fn name(&self) -> &'static str {
        "terminal_line"
    }

    fn is_interactive(&self) -> bool {
        true
    }

    async fn prepare(&mut self) -> Result<(), SinkError> {
        let Some(line) = self.line.take() else {
            return Ok(());
        };
        self.put(&line).map_err(|source| SinkError::Write {
            sink: "terminal_line",
            source,
        })
    }

    async fn write(&mut self, token: &str) -> Result<(), SinkError> {
        self.put(token).map_err(|source| SinkError::Write {
            sink: "terminal_line",
            source,
        })
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        self.put("\n").map_err(|source| SinkError::Write {
            sink: "terminal_line",
            source,
        })
    }
}
