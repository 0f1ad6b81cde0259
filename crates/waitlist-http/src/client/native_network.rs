use crate::client::network::{ChunkReceiver, CountNetwork};
use crate::error::{ClientError, Result};
use crate::protocol::EVENT_STREAM;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Client;

const CHUNK_BUFFER: usize = 64;

pub struct NativeNetwork {
    client: Client,
}

impl NativeNetwork {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Default for NativeNetwork {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

#[async_trait]
impl CountNetwork for NativeNetwork {
    async fn open(&self, url: &str) -> Result<ChunkReceiver> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, EVENT_STREAM)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        let (tx, rx) = async_channel::bounded(CHUNK_BUFFER);
        let mut stream = response.bytes_stream();

        let reader = tokio::spawn(async move {
            while let Some(chunk_res) = stream.next().await {
                match chunk_res {
                    Ok(chunk) => {
                        tracing::trace!("[CountClient] Received chunk of {} bytes", chunk.len());
                        if tx.send(Ok(chunk)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("[CountClient] Stream error: {}", e);
                        let _ = tx.send(Err(ClientError::Http(e.to_string()))).await;
                        break;
                    }
                }
            }
            tracing::debug!("[CountClient] Stream ended");
        });

        Ok(ChunkReceiver::with_reader(rx, reader.abort_handle()))
    }
}
