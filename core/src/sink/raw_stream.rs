use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::OutputSink;
use crate::error::SinkError;

/// Writes tokens straight to redirected stdout (pipe or file).
pub struct RawStreamSink<W: AsyncWrite + Unpin + Send> {
    out: W,
}

impl RawStreamSink<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin + Send> RawStreamSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    async fn put(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        let res = async {
            self.out.write_all(bytes).await?;
            self.out.flush().await
        }
        .await;
        res.map_err(|source| SinkError::Write {
            sink: "raw_stream",
            source,
        })
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> OutputSink for RawStreamSink<W> {
    fn name(&self) -> &'static str {
        "raw_stream"
    }

    async fn write(&mut self, token: &str) -> Result<(), SinkError> {
        self.put(token.as_bytes()).await
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        self.put(b"\n").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_text_through_unchanged() {
        let mut sink = RawStreamSink::new(Vec::new());
        sink.write("a\nb").await.unwrap();
        sink.write(" c.").await.unwrap();
        sink.finish().await.unwrap();
        assert_eq!(sink.into_inner(), b"a\nb c.\n".to_vec());
    }
}
