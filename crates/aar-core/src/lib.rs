//! Dispatcher engine: credential selection, upstream IO, retry/failover and
//! the streaming pump.

pub mod client;
pub mod engine;
pub mod failure;
pub mod metrics;

pub use client::{
    ByteStream, TransportErrorKind, UpstreamBody, UpstreamClient, UpstreamFailure,
    UpstreamResponse, WreqUpstreamClient,
};
pub use engine::{Engine, EngineConfig, SseStream};
pub use metrics::GatewayMetrics;
