//! Wire-protocol DTOs for the gateway.
//!
//! The `openai` module is the canonical client-facing schema; `anthropic` and
//! `gemini` model the native upstream schemas. All types are plain serde
//! structs so adapters stay pure functions over data.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod sse;
