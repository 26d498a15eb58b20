//! Per-provider upstream HTTP request builders.
//!
//! Builders turn native request bodies into `UpstreamRequest` values (URL,
//! headers, auth material); actual IO happens in the engine layer. The one
//! exception is the Vertex service-account token exchange, which must call
//! the OAuth endpoint itself.

pub mod anthropic;
pub mod errors;
pub mod headers;
pub mod openai;
pub mod request;
pub mod vertex;

pub use errors::{ProviderError, ProviderResult};
pub use headers::Headers;
pub use request::{HttpMethod, UpstreamRequest};
pub use vertex::token::VertexTokenProvider;
