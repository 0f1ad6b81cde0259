//! Event-stream protocol shared by the server and the count client.

pub mod frame;

pub use frame::{encode_count, encode_keep_alive, CountUpdate, FrameParser, EVENT_STREAM};
