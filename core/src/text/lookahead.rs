//! Lookahead buffer: holds generated tokens back until enough have arrived to
//! know whether the stream will end mid-sentence.

use super::boundary::{is_boundary, is_standalone_newline};

/// A generated fragment and its 0-based position in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub index: usize,
    pub text: String,
}

/// What [`LookaheadBuffer::drain`] released once the source ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Drained {
    /// Tokens still to be written, in stream order.
    pub tail: Vec<Token>,
    /// Buffered tokens dropped because they followed the last boundary.
    pub trimmed: usize,
}

#[derive(Debug)]
pub struct LookaheadBuffer {
    depth: usize,
    tokens: Vec<Token>,
    emit_index: usize,
    last_boundary: Option<usize>,
    input_tail: Option<char>,
}

impl LookaheadBuffer {
    /// `depth` of zero is treated as one.
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            tokens: Vec::new(),
            emit_index: 0,
            last_boundary: None,
            input_tail: None,
        }
    }

    /// Remember the last character of the prompt so the first token can be
    /// joined to it without doubling whitespace.
    pub fn with_input(mut self, input: &str) -> Self {
        self.input_tail = input.chars().last();
        self
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of tokens already released to the sink.
    pub fn emitted(&self) -> usize {
        self.emit_index
    }

    /// Tokens buffered but not yet released.
    pub fn pending(&self) -> usize {
        self.tokens.len() - self.emit_index
    }

    /// Position just past the most recent boundary token, if any was seen.
    pub fn last_boundary(&self) -> Option<usize> {
        self.last_boundary
    }

    /// Append a token. Returns the stored token (after seam trimming).
    pub fn push(&mut self, text: impl Into<String>) -> &Token {
        let mut text = text.into();
        if self.tokens.is_empty() {
            text = trim_seam(self.input_tail, text);
        }

        let index = self.tokens.len();
        let boundary = is_boundary(&text);
        self.tokens.push(Token { index, text });
        if boundary {
            self.last_boundary = Some(self.tokens.len());
        }
        &self.tokens[index]
    }

    /// True once `depth` tokens have been produced; nothing is released
    /// before that.
    pub fn ready_to_emit(&self) -> bool {
        self.tokens.len() >= self.depth
    }

    /// Release the oldest held token if the live window is full.
    pub fn pop_ready(&mut self) -> Option<Token> {
        if !self.ready_to_emit() || self.pending() < self.depth {
            return None;
        }
        let token = self.tokens[self.emit_index].clone();
        self.emit_index += 1;
        Some(token)
    }

    /// Close the buffer after the source ended and return the trimmed tail.
    ///
    /// With no boundary ever recorded the whole pending tail is kept.
    /// Otherwise the tail is cut at the last boundary and trailing tokens that
    /// are only line breaks are dropped, so output never ends on a blank line.
    /// Everything pending is considered consumed afterwards.
    pub fn drain(&mut self) -> Drained {
        let len = self.tokens.len();
        let end = match self.last_boundary {
            None => len,
            Some(boundary) => boundary.max(self.emit_index),
        };

        let mut tail = self.tokens[self.emit_index..end].to_vec();
        if self.last_boundary.is_some() {
            while tail.last().is_some_and(|t| is_standalone_newline(&t.text)) {
                tail.pop();
            }
        }

        let trimmed = (len - self.emit_index) - tail.len();
        self.emit_index = len;
        Drained { tail, trimmed }
    }
}

/// Drop one leading whitespace character from the first token when the prompt
/// already ends in whitespace.
pub fn trim_seam(input_tail: Option<char>, first: String) -> String {
    let Some(prev) = input_tail else {
        return first;
    };
    let mut chars = first.chars();
    match chars.next() {
        Some(c) if c.is_whitespace() && prev.is_whitespace() => chars.as_str().to_string(),
        _ => first,
    }
}
