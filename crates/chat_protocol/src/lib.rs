//! Wire-level primitives for the agent chat stream.
//!
//! This crate owns framing, event decoding, request payloads, header building
//! and the HTTP transport for the backend's `/api/agent/chat/stream` endpoint.
//! It holds no session state: interpreting events against a conversation is
//! the job of `chat_session`.
//!
//! Framing is line-oriented (`data: <json>\n`). [`FrameDecoder`] yields raw
//! payload strings; [`parse_event`] turns one payload into a [`StreamEvent`].

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod sse;
pub mod transport;
pub mod url;

pub use client::{ChatApiClient, ModelInfo};
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use events::{parse_event, EventParseError, StreamEvent};
pub use payload::ChatRequest;
pub use sse::FrameDecoder;
pub use transport::{is_cancelled, CancellationSignal, ChunkStream, StreamTransport};
pub use url::{normalize_base_url, stream_endpoint};
