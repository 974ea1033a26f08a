use std::time::Duration;

use anyhow::Result;
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use quill_core::api::{Device, GenerationParams, ModelProvider, ModelSession, TokenStream};

use super::http::{
    build_client, ensure_success, into_token_stream, BackendHttpError, LineSplitter,
};

const BACKEND: &str = "ollama";
const UNLOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Talks to an Ollama server through `/api/generate` in raw completion mode.
pub struct OllamaProvider {
    http: reqwest::Client,
    base_url: String,
    model: String,
    unload_timeout: Duration,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str, connect_timeout_ms: u64) -> Result<Self> {
        Ok(Self {
            http: build_client(connect_timeout_ms)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            unload_timeout: UNLOAD_TIMEOUT,
        })
    }

    /// Upper bound on the unload request sent by `dispose`.
    pub fn with_unload_timeout(mut self, timeout: Duration) -> Self {
        self.unload_timeout = timeout;
        self
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn open_session(&self, _params: &GenerationParams) -> Result<Box<dyn ModelSession>> {
        tracing::debug!(backend = BACKEND, model = %self.model, url = %self.base_url, "session opened");
        Ok(Box::new(OllamaSession {
            http: self.http.clone(),
            url_generate: format!("{}/api/generate", self.base_url),
            model: self.model.clone(),
            unload_timeout: self.unload_timeout,
            disposed: false,
        }))
    }
}

pub struct OllamaSession {
    http: reqwest::Client,
    url_generate: String,
    model: String,
    unload_timeout: Duration,
    disposed: bool,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    raw: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize, PartialEq)]
struct GenerateOptions {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    repeat_penalty: f32,
    num_predict: u32,
    num_ctx: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_gpu: Option<i32>,
}

impl From<&GenerationParams> for GenerateOptions {
    fn from(p: &GenerationParams) -> Self {
        let num_gpu = match p.device {
            Device::Auto => None,
            Device::Cpu => Some(0),
            // more layers than any model has: offload everything
            Device::Gpu => Some(999),
        };
        Self {
            temperature: p.temperature,
            top_k: p.top_k,
            top_p: p.top_p,
            repeat_penalty: p.repeat_penalty,
            num_predict: p.n_predict,
            num_ctx: p.context_size,
            seed: p.seed,
            num_gpu,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct UnloadRequest<'a> {
    model: &'a str,
    keep_alive: u32,
}

/// One NDJSON record. `Ok(None)` means the stream is done.
fn parse_chunk(line: &str) -> Result<Option<String>> {
    let chunk: GenerateChunk = serde_json::from_str(line)
        .map_err(|e| BackendHttpError::decode_error(BACKEND, e, line))?;
    if let Some(msg) = chunk.error {
        return Err(BackendHttpError::server_error(BACKEND, &msg).into());
    }
    if chunk.done && chunk.response.is_empty() {
        return Ok(None);
    }
    Ok(Some(chunk.response))
}

#[async_trait]
impl ModelSession for OllamaSession {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn stream(
        &mut self,
        input: &str,
        params: &GenerationParams,
        cancel: CancellationToken,
    ) -> Result<TokenStream> {
        let url = self.url_generate.clone();
        let body = GenerateRequest {
            model: &self.model,
            prompt: input,
            stream: true,
            raw: true,
            options: GenerateOptions::from(params),
        };
        tracing::debug!(backend = BACKEND, url = %url, prompt_len = input.len(), "generate request");

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendHttpError::from_reqwest(BACKEND, e, &url))?;
        let resp = ensure_success(BACKEND, resp).await?;

        let mut bytes = resp.bytes_stream();
        let out = try_stream! {
            let mut lines = LineSplitter::default();
            'read: loop {
                let chunk = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'read,
                    chunk = bytes.next() => chunk,
                };
                let Some(chunk) = chunk else {
                    if let Some(rest) = lines.finish() {
                        if let Some(text) = parse_chunk(&rest)? {
                            yield text;
                        }
                    }
                    break 'read;
                };
                let chunk = chunk
                    .map_err(|e| anyhow::Error::from(BackendHttpError::from_reqwest(BACKEND, e, &url)))?;
                for line in lines.push(&chunk) {
                    match parse_chunk(&line)? {
                        Some(text) if text.is_empty() => {}
                        Some(text) => yield text,
                        None => break 'read,
                    }
                }
            }
        };
        Ok(into_token_stream(out))
    }

    /// Ask the server to unload the model right away instead of keeping it
    /// resident for its default keep-alive window. Runs after the terminal
    /// is restored, so a stalled server must not hold up exit.
    async fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        let body = UnloadRequest {
            model: &self.model,
            keep_alive: 0,
        };
        let resp = self
            .http
            .post(&self.url_generate)
            .timeout(self.unload_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendHttpError::from_reqwest(BACKEND, e, &self.url_generate))?;
        ensure_success(BACKEND, resp).await?;
        tracing::debug!(backend = BACKEND, model = %self.model, "model unloaded");
        Ok(())
    }
}
