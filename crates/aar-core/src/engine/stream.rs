//! Streaming pump: upstream bytes -> provider events -> canonical SSE frames.
//!
//! One task per stream. Each canonical frame is flushed before the next
//! upstream chunk is read; backpressure propagates through the bounded
//! channel to the upstream socket. Dropping the client receiver aborts the
//! task, which drops the upstream receiver and cancels the upstream read.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use aar_protocol::openai::chat::stream::ChatCompletionChunk;
use aar_protocol::sse::SseParser;
use aar_transform::anthropic::AnthropicStreamAdapter;
use aar_transform::vertex::VertexStreamAdapter;
use aar_transform::StreamItem;

use crate::client::ByteStream;
use crate::metrics::GatewayMetrics;

const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";
const CHANNEL_CAPACITY: usize = 16;

fn frame(data: &str) -> Bytes {
    Bytes::from(format!("data: {data}\n\n"))
}

fn frame_chunk(chunk: &ChatCompletionChunk) -> Option<Bytes> {
    serde_json::to_string(chunk).ok().map(|json| frame(&json))
}

/// OpenAI upstream: pass-through, rewriting the chunk model id back to the
/// client-facing alias.
pub(super) fn spawn_openai_pump(
    mut upstream: ByteStream,
    alias: String,
    metrics: Arc<GatewayMetrics>,
) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut parser = SseParser::new();
        while let Some(item) = upstream.recv().await {
            let bytes = match item {
                Ok(bytes) => bytes,
                Err(message) => {
                    tracing::warn!(%message, "upstream stream failed mid-flight");
                    return;
                }
            };
            for sse in parser.feed_bytes(&bytes) {
                if sse.data.is_empty() {
                    continue;
                }
                if sse.data == "[DONE]" {
                    let _ = tx.send(Bytes::from_static(DONE_FRAME)).await;
                    return;
                }
                let out = match serde_json::from_str::<ChatCompletionChunk>(&sse.data) {
                    Ok(chunk) => {
                        let chunk = aar_transform::openai::adapt_chunk(chunk, &alias);
                        if let Some(usage) = &chunk.usage {
                            metrics.record_usage(usage);
                        }
                        frame_chunk(&chunk)
                    }
                    // Unrecognized payloads pass through untouched.
                    Err(_) => Some(frame(&sse.data)),
                };
                if let Some(out) = out
                    && tx.send(out).await.is_err()
                {
                    return;
                }
            }
        }
        // Upstream ended without [DONE]: abnormal termination, leave the
        // stream unterminated.
    });
    rx
}

/// Anthropic upstream: event-stream events to canonical chunks.
pub(super) fn spawn_anthropic_pump(
    mut upstream: ByteStream,
    mut adapter: AnthropicStreamAdapter,
    metrics: Arc<GatewayMetrics>,
) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut parser = SseParser::new();
        while let Some(item) = upstream.recv().await {
            let bytes = match item {
                Ok(bytes) => bytes,
                Err(message) => {
                    tracing::warn!(%message, "upstream stream failed mid-flight");
                    return;
                }
            };
            for sse in parser.feed_bytes(&bytes) {
                if sse.data.is_empty() {
                    continue;
                }
                let event = match serde_json::from_str(&sse.data) {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::debug!(error = %err, "skipping undecodable stream event");
                        continue;
                    }
                };
                let items = match adapter.on_event(event) {
                    Ok(items) => items,
                    Err(err) => {
                        tracing::warn!(error = %err, "provider signalled stream error");
                        return;
                    }
                };
                if !forward(&tx, items, &metrics).await {
                    return;
                }
            }
        }
    });
    rx
}

/// Vertex upstream: SSE-framed generate-content chunks to canonical chunks.
/// The canonical terminator is emitted at clean upstream EOF.
pub(super) fn spawn_vertex_pump(
    mut upstream: ByteStream,
    mut adapter: VertexStreamAdapter,
    metrics: Arc<GatewayMetrics>,
) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut parser = SseParser::new();
        while let Some(item) = upstream.recv().await {
            let bytes = match item {
                Ok(bytes) => bytes,
                Err(message) => {
                    tracing::warn!(%message, "upstream stream failed mid-flight");
                    return;
                }
            };
            for sse in parser.feed_bytes(&bytes) {
                if sse.data.is_empty() {
                    continue;
                }
                let chunk = match serde_json::from_str(&sse.data) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        tracing::debug!(error = %err, "skipping undecodable stream chunk");
                        continue;
                    }
                };
                if !forward(&tx, adapter.on_chunk(chunk), &metrics).await {
                    return;
                }
            }
        }
        let tail = parser
            .finish()
            .into_iter()
            .filter(|sse| !sse.data.is_empty() && sse.data != "[DONE]")
            .filter_map(|sse| serde_json::from_str(&sse.data).ok())
            .flat_map(|chunk| adapter.on_chunk(chunk))
            .collect::<Vec<_>>();
        if !forward(&tx, tail, &metrics).await {
            return;
        }
        forward(&tx, adapter.finish(), &metrics).await;
    });
    rx
}

async fn forward(
    tx: &mpsc::Sender<Bytes>,
    items: Vec<StreamItem>,
    metrics: &GatewayMetrics,
) -> bool {
    for item in items {
        let bytes = match item {
            StreamItem::Chunk(chunk) => {
                if let Some(usage) = &chunk.usage {
                    metrics.record_usage(usage);
                }
                match frame_chunk(&chunk) {
                    Some(bytes) => bytes,
                    None => continue,
                }
            }
            StreamItem::Done => Bytes::from_static(DONE_FRAME),
        };
        if tx.send(bytes).await.is_err() {
            return false;
        }
    }
    true
}
