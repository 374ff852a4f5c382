//! Server-Sent Events wire layer.
//!
//! # Data Flow
//! ```text
//! response bytes
//!     → eventsource-stream (line framing, field accumulation, dispatch)
//!     → message.rs (RawEvent, then SseMessage stamped on arrival)
//!     → content.rs (optional JSON payload decoding for generation streams)
//! ```

pub mod content;
pub mod message;

pub use content::{parse_content_chunk, ContentChunk, GenerationEvent};
pub use message::{RawEvent, SseMessage};
