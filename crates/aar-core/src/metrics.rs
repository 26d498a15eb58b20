//! Prometheus counters exposed at `/metrics`, all prefixed
//! `auto_ai_router_`.

use aar_protocol::openai::chat::types::Usage;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub struct GatewayMetrics {
    registry: Registry,
    pub requests: IntCounterVec,
    pub errors: IntCounterVec,
    pub bans: IntCounterVec,
    pub prompt_tokens: IntCounter,
    pub completion_tokens: IntCounter,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("auto_ai_router_requests_total", "Requests by endpoint and provider"),
            &["endpoint", "provider"],
        )
        .expect("requests counter");
        let errors = IntCounterVec::new(
            Opts::new("auto_ai_router_errors_total", "Errors by kind"),
            &["kind"],
        )
        .expect("errors counter");
        let bans = IntCounterVec::new(
            Opts::new("auto_ai_router_bans_total", "Credential bans by reason"),
            &["reason"],
        )
        .expect("bans counter");
        let prompt_tokens = IntCounter::new(
            "auto_ai_router_prompt_tokens_total",
            "Prompt tokens across all requests",
        )
        .expect("prompt tokens counter");
        let completion_tokens = IntCounter::new(
            "auto_ai_router_completion_tokens_total",
            "Completion tokens across all requests",
        )
        .expect("completion tokens counter");

        registry
            .register(Box::new(requests.clone()))
            .expect("register requests");
        registry
            .register(Box::new(errors.clone()))
            .expect("register errors");
        registry.register(Box::new(bans.clone())).expect("register bans");
        registry
            .register(Box::new(prompt_tokens.clone()))
            .expect("register prompt tokens");
        registry
            .register(Box::new(completion_tokens.clone()))
            .expect("register completion tokens");

        Self {
            registry,
            requests,
            errors,
            bans,
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn record_usage(&self, usage: &Usage) {
        self.prompt_tokens.inc_by(usage.prompt_tokens.max(0) as u64);
        self.completion_tokens
            .inc_by(usage.completion_tokens.max(0) as u64);
    }

    /// Prometheus text exposition of all registered collectors.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
