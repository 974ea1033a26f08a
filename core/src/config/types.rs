use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub generation: GenerationParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "warn" or "quill_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses ~/.quill/logs.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

// Streamed text shares the terminal with stderr; keep console logs quiet.
fn default_logging_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Output pacing and shutdown timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Tokens held back before anything is shown.
    #[serde(default = "default_lookahead_depth")]
    pub lookahead_depth: usize,

    /// Delay between tail tokens replayed after the source ends.
    #[serde(default = "default_tail_interval_ms")]
    pub tail_interval_ms: u64,

    /// Settle time before disposing a session that was still busy.
    #[serde(default = "default_dispose_grace_ms")]
    pub dispose_grace_ms: u64,

    #[serde(default = "default_progress")]
    pub progress: bool,

    #[serde(default = "default_progress_tick_ms")]
    pub progress_tick_ms: u64,
}

fn default_lookahead_depth() -> usize {
    8
}

fn default_tail_interval_ms() -> u64 {
    200
}

fn default_dispose_grace_ms() -> u64 {
    800
}

fn default_progress() -> bool {
    true
}

fn default_progress_tick_ms() -> u64 {
    120
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            lookahead_depth: default_lookahead_depth(),
            tail_interval_ms: default_tail_interval_ms(),
            dispose_grace_ms: default_dispose_grace_ms(),
            progress: default_progress(),
            progress_tick_ms: default_progress_tick_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Ollama,
    Llamacpp,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Llamacpp => "llamacpp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "llamacpp" | "llama.cpp" | "llama-cpp" => Some(Self::Llamacpp),
            _ => None,
        }
    }

    pub fn default_url(self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::Llamacpp => "http://localhost:8080",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,

    /// Base URL; empty means the kind's default.
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_backend_kind() -> BackendKind {
    BackendKind::Ollama
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl BackendConfig {
    pub fn effective_url(&self) -> &str {
        let url = self.url.trim();
        if url.is_empty() {
            self.kind.default_url()
        } else {
            url.trim_end_matches('/')
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            url: String::new(),
            model: default_model(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Auto,
    Cpu,
    Gpu,
}

impl Device {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "cpu" => Some(Self::Cpu),
            "gpu" | "cuda" | "metal" => Some(Self::Gpu),
            _ => None,
        }
    }
}

/// Sampling knobs handed through to the backend untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,
    /// Maximum tokens to predict.
    #[serde(default = "default_n_predict")]
    pub n_predict: u32,
    #[serde(default = "default_context_size")]
    pub context_size: u32,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub device: Device,
}

fn default_temperature() -> f32 {
    0.8
}

fn default_top_k() -> u32 {
    40
}

fn default_top_p() -> f32 {
    0.95
}

fn default_repeat_penalty() -> f32 {
    1.1
}

fn default_n_predict() -> u32 {
    256
}

fn default_context_size() -> u32 {
    2048
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            repeat_penalty: default_repeat_penalty(),
            n_predict: default_n_predict(),
            context_size: default_context_size(),
            seed: None,
            device: Device::Auto,
        }
    }
}
