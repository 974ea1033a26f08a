use anyhow::Result;
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use quill_core::api::{GenerationParams, ModelProvider, ModelSession, TokenStream};

use super::http::{
    build_client, ensure_success, into_token_stream, BackendHttpError, LineSplitter,
};

const BACKEND: &str = "llamacpp";

/// Talks to a llama.cpp `llama-server` through its `/completion` endpoint.
///
/// The server owns the weights and its context size; `context_size` and
/// `device` are fixed at server start and are not sent per request.
pub struct LlamaCppProvider {
    http: reqwest::Client,
    base_url: String,
}

impl LlamaCppProvider {
    pub fn new(base_url: &str, connect_timeout_ms: u64) -> Result<Self> {
        Ok(Self {
            http: build_client(connect_timeout_ms)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ModelProvider for LlamaCppProvider {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn open_session(&self, params: &GenerationParams) -> Result<Box<dyn ModelSession>> {
        tracing::debug!(
            backend = BACKEND,
            url = %self.base_url,
            context_size = params.context_size,
            "session opened; context size is set by the server"
        );
        Ok(Box::new(LlamaCppSession {
            http: self.http.clone(),
            url_completion: format!("{}/completion", self.base_url),
            disposed: false,
        }))
    }
}

pub struct LlamaCppSession {
    http: reqwest::Client,
    url_completion: String,
    disposed: bool,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    stream: bool,
    n_predict: u32,
    temperature: f32,
    top_k: u32,
    top_p: f32,
    repeat_penalty: f32,
    seed: i64,
    cache_prompt: bool,
}

impl<'a> CompletionRequest<'a> {
    fn new(prompt: &'a str, p: &GenerationParams) -> Self {
        Self {
            prompt,
            stream: true,
            n_predict: p.n_predict,
            temperature: p.temperature,
            top_k: p.top_k,
            top_p: p.top_p,
            repeat_penalty: p.repeat_penalty,
            // -1 asks the server for a random seed
            seed: p.seed.map(|s| s as i64).unwrap_or(-1),
            cache_prompt: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    content: String,
    #[serde(default)]
    stop: bool,
}

enum Event {
    Token(String),
    Stop,
    Skip,
}

/// One server-sent-events line.
fn parse_event(line: &str) -> Result<Event> {
    if let Some(rest) = line.strip_prefix("error:") {
        return Err(BackendHttpError::server_error(BACKEND, rest.trim()).into());
    }
    let Some(data) = line.strip_prefix("data:") else {
        // comments, `event:` and `id:` fields
        return Ok(Event::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Event::Stop);
    }

    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| BackendHttpError::decode_error(BACKEND, e, data))?;
    if let Some(err) = value.get("error") {
        let msg = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(BackendHttpError::server_error(BACKEND, &msg).into());
    }
    let chunk: CompletionChunk = serde_json::from_value(value)
        .map_err(|e| BackendHttpError::decode_error(BACKEND, e, data))?;

    match (chunk.content.is_empty(), chunk.stop) {
        (true, true) => Ok(Event::Stop),
        (true, false) => Ok(Event::Skip),
        (false, _) => Ok(Event::Token(chunk.content)),
    }
}

#[async_trait]
impl ModelSession for LlamaCppSession {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn stream(
        &mut self,
        input: &str,
        params: &GenerationParams,
        cancel: CancellationToken,
    ) -> Result<TokenStream> {
        let url = self.url_completion.clone();
        let body = CompletionRequest::new(input, params);
        tracing::debug!(backend = BACKEND, url = %url, prompt_len = input.len(), "completion request");

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
                        if let Event::Token(text) = parse_event(&rest)? {
                            yield text;
                        }
                    }
                    break 'read;
                };
                let chunk = chunk.map_err(|e| {
                    anyhow::Error::from(BackendHttpError::from_reqwest(BACKEND, e, &url))
                })?;
                for line in lines.push(&chunk) {
                    match parse_event(&line)? {
                        Event::Token(text) => yield text,
                        Event::Stop => break 'read,
                        Event::Skip => {}
                    }
                }
            }
        };
        Ok(into_token_stream(out))
    }

    /// Nothing to unload remotely; the server keeps serving other clients.
    async fn dispose(&mut self) -> Result<()> {
        if !self.disposed {
            self.disposed = true;
            tracing::debug!(backend = BACKEND, "session released");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;

    async fn collect(mut stream: TokenStream) -> Vec<Result<String>> {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item);
        }
        out
    }

    #[test]
    fn request_carries_sampling_params() {
        let p = GenerationParams {
            n_predict: 32,
            seed: Some(7),
            ..GenerationParams::default()
        };
        let v = serde_json::to_value(CompletionRequest::new("hi", &p)).unwrap();
        assert_eq!(v["n_predict"], 32);
        assert_eq!(v["seed"], 7);
        assert_eq!(v["stream"], true);

        let v = serde_json::to_value(CompletionRequest::new("hi", &GenerationParams::default()))
            .unwrap();
        assert_eq!(v["seed"], -1);
    }

    #[test]
    fn parse_event_variants() {
        assert!(matches!(
            parse_event(r#"data: {"content":" so","stop":false}"#).unwrap(),
            Event::Token(t) if t == " so"
        ));
        assert!(matches!(
            parse_event(r#"data: {"content":"","stop":true}"#).unwrap(),
            Event::Stop
        ));
        assert!(matches!(parse_event(": keep-alive").unwrap(), Event::Skip));
        assert!(parse_event(r#"data: {"error":{"code":500,"message":"slot busy"}}"#).is_err());
        assert!(parse_event("error: boom").is_err());
    }

    #[tokio::test]
    async fn streams_sse_tokens_until_stop() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/completion")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "prompt": "Roses are red",
                "stream": true
            })))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(concat!(
                "data: {\"content\":\",\",\"stop\":false}\n\n",
                "data: {\"content\":\" violets\",\"stop\":false}\n\n",
                "data: {\"content\":\" are blue.\",\"stop\":false}\n\n",
                "data: {\"content\":\"\",\"stop\":true,\"tokens_predicted\":3}\n\n",
                "data: {\"content\":\"ignored\",\"stop\":false}\n\n",
            ))
            .create_async()
            .await;

        let provider = LlamaCppProvider::new(&server.url(), 1_000).unwrap();
        let params = GenerationParams::default();
        let mut session = provider.open_session(&params).await.unwrap();
        let stream = session
            .stream("Roses are red", &params, CancellationToken::new())
            .await
            .unwrap();
        let tokens: Vec<String> = collect(stream)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(tokens, vec![",", " violets", " are blue."]);

        session.dispose().await.unwrap();
        session.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn server_error_status_fails_stream_start() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/completion")
            .with_status(503)
            .with_body(r#"{"error":{"message":"Loading model"}}"#)
            .create_async()
            .await;

        let provider = LlamaCppProvider::new(&server.url(), 1_000).unwrap();
        let params = GenerationParams::default();
        let mut session = provider.open_session(&params).await.unwrap();
        let err = match session.stream("x", &params, CancellationToken::new()).await {
            Ok(_) => panic!("expected status error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("status=503"), "{err}");
    }
}
