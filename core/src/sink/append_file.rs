use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::OutputSink;
use crate::error::SinkError;

/// Continues the input file in place.
pub struct AppendFileSink {
    path: PathBuf,
    file: Option<File>,
}

impl AppendFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&mut self) -> Result<&mut File, SinkError> {
        let file = match self.file.take() {
            Some(file) => file,
            None => {
                normalize_trailing_newline(&self.path).await?;
                OpenOptions::new()
                    .append(true)
                    .open(&self.path)
                    .await
                    .map_err(|source| SinkError::Write {
                        sink: "append_file",
                        source,
                    })?
            }
        };
        Ok(self.file.insert(file))
    }

    async fn put(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        let file = self.open().await?;
        let res = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;
        res.map_err(|source| SinkError::Write {
            sink: "append_file",
            source,
        })
    }
}

#[async_trait]
impl OutputSink for AppendFileSink {
    fn name(&self) -> &'static str {
        "append_file"
    }

    async fn prepare(&mut self) -> Result<(), SinkError> {
        self.open().await.map(|_| ())
    }

    async fn write(&mut self, token: &str) -> Result<(), SinkError> {
        self.put(token.as_bytes()).await
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        self.put(b"\n").await
    }
}

/// If the file ends in exactly one `\n`, drop it so generated text continues
/// the last line. A blank-line ending (`\n\n`) is a paragraph break and is
/// left alone. Returns whether the file was shortened.
pub async fn normalize_trailing_newline(path: &Path) -> Result<bool, SinkError> {
    let err = |source: std::io::Error| SinkError::Normalize {
        path: path.display().to_string(),
        source,
    };

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .await
        .map_err(err)?;
    let len = file.metadata().await.map_err(err)?.len();
    if len == 0 {
        return Ok(false);
    }

    let n = len.min(2) as usize;
    let mut tail = [0u8; 2];
    file.seek(SeekFrom::End(-(n as i64))).await.map_err(err)?;
    file.read_exact(&mut tail[..n]).await.map_err(err)?;

    let last = tail[n - 1];
    let before = if n == 2 { Some(tail[0]) } else { None };
    if last != b'\n' || before == Some(b'\n') {
        return Ok(false);
    }

    file.set_len(len - 1).await.map_err(err)?;
    tracing::debug!(path = %path.display(), "dropped single trailing newline");
    Ok(true)
}

/// The prompt as the file will read once [`normalize_trailing_newline`] ran.
pub fn normalized_prompt(text: &str) -> &str {
    if text.ends_with('\n') && !text.ends_with("\n\n") {
        &text[..text.len() - 1]
    } else {
        text
    }
}
