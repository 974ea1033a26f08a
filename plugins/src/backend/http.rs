//! HTTP plumbing shared by the streaming backends.

use std::time::Duration;
use std::{error::Error as StdError, fmt};

use futures::Stream;
use quill_core::api::TokenStream;

const BODY_PREVIEW_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendHttpErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
    Decode,
    Status,
    Server,
    Unknown,
}

impl BackendHttpErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Status => "status",
            Self::Server => "server",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BackendHttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct BackendHttpError {
    backend: &'static str,
    kind: BackendHttpErrorKind,
    status: Option<u16>,
    url: Option<String>,
    message: String,
    source: Option<anyhow::Error>,
}

impl BackendHttpError {
    pub fn kind(&self) -> BackendHttpErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub(crate) fn from_reqwest(backend: &'static str, err: reqwest::Error, url: &str) -> Self {
        let kind = if err.is_timeout() {
            BackendHttpErrorKind::Timeout
        } else if err.is_connect() {
            BackendHttpErrorKind::Connect
        } else if err.is_request() {
            BackendHttpErrorKind::Request
        } else if err.is_body() {
            BackendHttpErrorKind::Body
        } else if err.is_decode() {
            BackendHttpErrorKind::Decode
        } else {
            BackendHttpErrorKind::Unknown
        };
        Self {
            backend,
            kind,
            status: err.status().map(|s| s.as_u16()),
            url: Some(url.to_string()),
            message: err.to_string(),
            source: Some(anyhow::Error::new(err)),
        }
    }

    pub(crate) fn status_error(backend: &'static str, status: u16, url: &str, body: &str) -> Self {
        Self {
            backend,
            kind: BackendHttpErrorKind::Status,
            status: Some(status),
            url: Some(url.to_string()),
            message: preview_body(body),
            source: None,
        }
    }

    pub(crate) fn decode_error(backend: &'static str, err: serde_json::Error, line: &str) -> Self {
        Self {
            backend,
            kind: BackendHttpErrorKind::Decode,
            status: None,
            url: None,
            message: format!("bad stream line: {} | line={}", err, preview_body(line)),
            source: Some(anyhow::Error::new(err)),
        }
    }

    /// Error reported in-band by the server mid-stream.
    pub(crate) fn server_error(backend: &'static str, message: &str) -> Self {
        Self {
            backend,
            kind: BackendHttpErrorKind::Server,
            status: None,
            url: None,
            message: message.to_string(),
            source: None,
        }
    }
}

impl fmt::Display for BackendHttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error kind={}", self.backend, self.kind)?;
        if let Some(status) = self.status {
            write!(f, " status={}", status)?;
        }
        if let Some(url) = &self.url {
            write!(f, " url={}", url)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl StdError for BackendHttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|err| &**err as &(dyn StdError + 'static))
    }
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().count() > BODY_PREVIEW_LIMIT {
        out.push_str("...");
    }
    out
}

/// Turn a non-2xx response into an error carrying a body preview.
pub(crate) async fn ensure_success(
    backend: &'static str,
    resp: reqwest::Response,
) -> anyhow::Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let url = resp.url().to_string();
    let body = resp
        .text()
        .await
        .map_err(|err| BackendHttpError::from_reqwest(backend, err, &url))?;
    Err(BackendHttpError::status_error(backend, status.as_u16(), &url, &body).into())
}

/// Streaming responses can run far longer than any sensible request timeout,
/// so only connecting is bounded.
pub(crate) fn build_client(connect_timeout_ms: u64) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_millis(connect_timeout_ms))
        .build()?)
}

/// Pin a backend stream behind the session's stream type.
pub(crate) fn into_token_stream<S>(stream: S) -> TokenStream
where
    S: Stream<Item = anyhow::Result<String>> + Send + 'static,
{
    Box::pin(stream)
}

/// Reassembles newline-delimited records from arbitrary byte chunks.
#[derive(Debug, Default)]
pub(crate) struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(['\n', '\r']);
            if !text.trim().is_empty() {
                lines.push(text.to_string());
            }
        }
        lines
    }

    /// Whatever is left once the body ends without a final newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}
