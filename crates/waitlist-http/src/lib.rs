//! Wire format and browser-side client for the waitlist count stream.
//!
//! - **protocol**: event-stream frames carrying `{"count": N}` payloads.
//! - **client**: a reconnecting subscriber that keeps the latest count observable.

pub mod client;
pub mod error;
pub mod protocol;

pub use client::{ClientConfig, CountClient, CountClientHandle, CountError, CountState};
pub use error::{ClientError, Result};
pub use protocol::frame::CountUpdate;
