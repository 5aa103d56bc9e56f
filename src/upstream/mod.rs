//! Upstream model provider subsystem.
//!
//! # Data Flow
//! ```text
//! ValidChat (from the relay handler)
//!     → types.rs (UpstreamRequest payload)
//!     → client.rs (POST, background read loop)
//!     → ChunkStream (chunks + terminal error slot)
//!
//! Cancellation:
//!     CancelHandle (held by the relay) ──drop/cancel──▶ CancelSignal (read loop)
//! ```
//!
//! # Design Decisions
//! - One upstream call per relay request, never retried
//! - Chunk bytes are opaque; nothing here parses the stream
//! - Cancellation is silent, only real failures produce an error

pub mod cancel;
pub mod client;
pub mod types;

pub use cancel::{cancellation, CancelHandle, CancelSignal};
pub use client::{ChunkStream, UpstreamClient};
pub use types::{ChatRejection, ChatRequest, UpstreamError, UpstreamRequest, ValidChat};
