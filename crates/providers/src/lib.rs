//! Chat-completion provider implementations for Basecamp.
//!
//! All providers implement the `basecamp_core::ChatProvider` trait.
//! The streaming decoder is public so other transports can reuse it.

pub mod openrouter;
pub mod sse;
mod wire;

pub use openrouter::OpenRouterProvider;
pub use sse::{StreamDecoder, StreamSummary, decode_stream};
