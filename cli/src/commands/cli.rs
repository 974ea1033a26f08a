use std::path::PathBuf;

use clap::Parser;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    Ollama,
    Llamacpp,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceArg {
    Auto,
    Cpu,
    Gpu,
}

/// Continue a piece of text with a local model, stopping on a sentence boundary.
#[derive(Parser, Debug)]
#[command(name = "quill", version, about)]
pub struct Args {
    /// Text to continue.
    #[arg(long, short = 'p', group = "input")]
    pub prompt: Option<String>,

    /// Read the text to continue from a file.
    #[arg(long, short = 'f', group = "input")]
    pub file: Option<PathBuf>,

    /// Append the continuation to `--file` instead of printing it.
    #[arg(long, short = 'a', requires = "file")]
    pub append: bool,

    /// Load this config file instead of ~/.quill/config.toml or ./quill.toml.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Backend base URL, e.g. http://127.0.0.1:11434.
    #[arg(long)]
    pub url: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long, value_enum)]
    pub device: Option<DeviceArg>,

    /// Maximum number of tokens to generate.
    #[arg(long)]
    pub n_predict: Option<u32>,

    /// Tokens held back while looking for a sentence boundary.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub lookahead: Option<u64>,

    /// Do not show the spinner while the model warms up.
    #[arg(long)]
    pub no_progress: bool,
}
