//! Classification of upstream failures into ban decisions and retryability.

use std::time::Duration;

use aar_pool::BanReason;
use aar_providers::headers::header_get;
use aar_providers::Headers;
use bytes::Bytes;

use crate::client::UpstreamFailure;

const AUTH_BAN_SECS: u64 = 3600;
const RATE_LIMIT_FALLBACK_SECS: u64 = 30;
const SERVER_ERROR_CAP_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BanDecision {
    pub duration: Duration,
    pub reason: BanReason,
}

/// Map an upstream failure to a credential ban, if the failure is
/// credential-scoped. Plain request errors (4xx other than auth and
/// rate-limit) ban nothing.
pub fn decide_ban(failure: &UpstreamFailure, attempt_count: u32) -> Option<BanDecision> {
    match failure {
        UpstreamFailure::Http {
            status, headers, ..
        } => match status {
            401 | 403 => Some(BanDecision {
                duration: Duration::from_secs(AUTH_BAN_SECS),
                reason: BanReason::Auth,
            }),
            429 => Some(BanDecision {
                duration: parse_rate_limit_reset(headers)
                    .unwrap_or(Duration::from_secs(RATE_LIMIT_FALLBACK_SECS)),
                reason: BanReason::RateLimit,
            }),
            status if (500..600).contains(status) => Some(BanDecision {
                duration: backoff(attempt_count),
                reason: BanReason::ServerError,
            }),
            _ => None,
        },
        UpstreamFailure::Transport { .. } => Some(BanDecision {
            duration: backoff(attempt_count),
            reason: BanReason::ServerError,
        }),
    }
}

pub fn is_retryable(failure: &UpstreamFailure) -> bool {
    match failure {
        UpstreamFailure::Transport { .. } => true,
        UpstreamFailure::Http { status, .. } => {
            *status == 429 || (500..600).contains(status)
        }
    }
}

/// Exponential on consecutive failures, capped.
fn backoff(attempt_count: u32) -> Duration {
    let secs = 1u64 << attempt_count.min(6);
    Duration::from_secs(secs.min(SERVER_ERROR_CAP_SECS))
}

/// `Retry-After: <seconds>` wins; `x-ratelimit-reset` may be either a delta
/// in seconds or a unix timestamp.
fn parse_rate_limit_reset(headers: &Headers) -> Option<Duration> {
    if let Some(value) = header_get(headers, "retry-after")
        && let Ok(secs) = value.trim().parse::<u64>()
    {
        return Some(Duration::from_secs(secs));
    }
    if let Some(value) = header_get(headers, "x-ratelimit-reset")
        && let Ok(raw) = value.trim().parse::<f64>()
        && raw.is_finite()
        && raw > 0.0
    {
        let now = time::OffsetDateTime::now_utc().unix_timestamp() as f64;
        let delta = if raw > 1_000_000_000.0 { raw - now } else { raw };
        if delta > 0.0 {
            return Some(Duration::from_secs_f64(delta));
        }
    }
    None
}

/// Pull a human-readable message out of an upstream error body. All three
/// providers nest it under `error.message`.
pub fn upstream_message(status: u16, body: &Bytes) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body)
        && let Some(message) = value
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(|message| message.as_str())
        && !message.is_empty()
    {
        return message.to_string();
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        format!("upstream returned status {status}")
    } else {
        let mut text = text.to_string();
        text.truncate(300);
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TransportErrorKind;

    fn http(status: u16, headers: Headers) -> UpstreamFailure {
        UpstreamFailure::Http {
            status,
            headers,
            body: Bytes::new(),
        }
    }

    #[test]
    fn auth_failures_ban_long() {
        let decision = decide_ban(&http(401, Vec::new()), 0).unwrap();
        assert_eq!(decision.reason, BanReason::Auth);
        assert_eq!(decision.duration, Duration::from_secs(3600));
        assert!(!is_retryable(&http(401, Vec::new())));
    }

    #[test]
    fn rate_limit_honors_retry_after() {
        let headers = vec![("retry-after".to_string(), "60".to_string())];
        let decision = decide_ban(&http(429, headers), 0).unwrap();
        assert_eq!(decision.reason, BanReason::RateLimit);
        assert_eq!(decision.duration, Duration::from_secs(60));
    }

    #[test]
    fn rate_limit_falls_back_without_headers() {
        let decision = decide_ban(&http(429, Vec::new()), 0).unwrap();
        assert_eq!(decision.duration, Duration::from_secs(30));
    }

    #[test]
    fn server_errors_back_off_exponentially() {
        let first = decide_ban(&http(500, Vec::new()), 0).unwrap();
        let third = decide_ban(&http(500, Vec::new()), 2).unwrap();
        assert_eq!(first.reason, BanReason::ServerError);
        assert_eq!(first.duration, Duration::from_secs(1));
        assert_eq!(third.duration, Duration::from_secs(4));
        // Capped.
        let late = decide_ban(&http(500, Vec::new()), 30).unwrap();
        assert_eq!(late.duration, Duration::from_secs(60));
    }

    #[test]
    fn network_errors_are_retryable_and_ban_short() {
        let failure = UpstreamFailure::Transport {
            kind: TransportErrorKind::Connect,
            message: "connection refused".to_string(),
        };
        assert!(is_retryable(&failure));
        let decision = decide_ban(&failure, 1).unwrap();
        assert_eq!(decision.reason, BanReason::ServerError);
    }

    #[test]
    fn plain_client_errors_ban_nothing() {
        assert!(decide_ban(&http(404, Vec::new()), 0).is_none());
        assert!(decide_ban(&http(400, Vec::new()), 0).is_none());
        assert!(!is_retryable(&http(400, Vec::new())));
    }

    #[test]
    fn message_extracted_from_error_body() {
        let body = Bytes::from_static(b"{\"error\":{\"message\":\"model overloaded\"}}");
        assert_eq!(upstream_message(500, &body), "model overloaded");
        assert_eq!(
            upstream_message(502, &Bytes::new()),
            "upstream returned status 502"
        );
    }
}
