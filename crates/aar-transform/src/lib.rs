//! Schema transforms between the canonical OpenAI form and provider-native
//! forms, plus usage normalization.
//!
//! Everything here is a pure function of its inputs (stream adapters carry
//! per-stream state but perform no IO), so the whole surface is unit-testable
//! without a network.

pub mod anthropic;
pub mod error;
pub mod openai;
pub mod usage;
pub mod vertex;

pub use error::TransformError;

/// Canonical output of a streaming adapter step.
#[derive(Debug, Clone)]
pub enum StreamItem {
    Chunk(aar_protocol::openai::chat::stream::ChatCompletionChunk),
    /// The provider signalled a clean end of stream; emit `data: [DONE]`.
    Done,
}
