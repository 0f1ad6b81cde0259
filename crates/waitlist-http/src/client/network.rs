use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::task::AbortHandle;

/// Raw body chunks of one open stream; the channel closing ends the connection.
///
/// Dropping it stops the task reading the response body, which closes the
/// underlying connection.
pub struct ChunkReceiver {
    chunks: async_channel::Receiver<Result<Bytes>>,
    reader: Option<AbortHandle>,
}

impl ChunkReceiver {
    pub fn new(chunks: async_channel::Receiver<Result<Bytes>>) -> Self {
        Self {
            chunks,
            reader: None,
        }
    }

    /// Tie the task feeding `chunks` to this receiver's lifetime.
    pub fn with_reader(
        chunks: async_channel::Receiver<Result<Bytes>>,
        reader: AbortHandle,
    ) -> Self {
        Self {
            chunks,
            reader: Some(reader),
        }
    }

    /// Next chunk, or `None` once the stream has ended.
    pub async fn recv(&self) -> Option<Result<Bytes>> {
        self.chunks.recv().await.ok()
    }
}

impl Drop for ChunkReceiver {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Abstraction for opening the count stream.
#[async_trait]
pub trait CountNetwork: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<ChunkReceiver>;
}
