//! Reconnecting client for the count stream.

mod config;
mod count_client;
#[cfg(not(target_arch = "wasm32"))]
pub mod native_network;
mod network;
pub mod retry;

pub use config::ClientConfig;
pub use count_client::{CountClient, CountClientHandle, CountError, CountState};
#[cfg(not(target_arch = "wasm32"))]
pub use native_network::NativeNetwork;
pub use network::{ChunkReceiver, CountNetwork};
pub use retry::{RetryConfig, RetryDecision, RetryState};
