mod http;
pub mod llamacpp;
pub mod ollama;

pub use http::{BackendHttpError, BackendHttpErrorKind};
pub use llamacpp::LlamaCppProvider;
pub use ollama::OllamaProvider;
