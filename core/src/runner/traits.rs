use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::config::GenerationParams;

/// Lazy, finite sequence of generated text fragments.
pub type TokenStream = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

/// A loaded model that can serve exactly one stream per run.
#[async_trait]
pub trait ModelSession: Send {
    fn name(&self) -> &str;

    /// Start generating a continuation of `input`. The stream must stop
    /// producing once `cancel` fires.
    async fn stream(
        &mut self,
        input: &str,
        params: &GenerationParams,
        cancel: CancellationToken,
    ) -> anyhow::Result<TokenStream>;

    /// Release the model resource. Calling it again is a no-op.
    async fn dispose(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn open_session(&self, params: &GenerationParams)
        -> anyhow::Result<Box<dyn ModelSession>>;
}
