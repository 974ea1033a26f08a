use anyhow::Result;

use quill_core::api::{AppConfig, BackendKind, ModelProvider};

use crate::backend::{LlamaCppProvider, OllamaProvider};

pub fn build_provider(cfg: &AppConfig) -> Result<Box<dyn ModelProvider>> {
    let backend = &cfg.backend;
    let url = backend.effective_url();
    tracing::debug!(backend = backend.kind.as_str(), url = %url, model = %backend.model, "building model provider");

    match backend.kind {
        BackendKind::Ollama => Ok(Box::new(OllamaProvider::new(
            url,
            &backend.model,
            backend.request_timeout_ms,
        )?)),
        BackendKind::Llamacpp => Ok(Box::new(LlamaCppProvider::new(
            url,
            backend.request_timeout_ms,
        )?)),
    }
}
