//! Normalization of heterogeneous provider token counters into the
//! canonical `usage` shape.
//!
//! The invariant `total_tokens == prompt_tokens + completion_tokens` is
//! enforced here; when a provider reports a disagreeing total, the computed
//! sum wins and the discrepancy is logged.

use aar_protocol::anthropic::messages::types::Usage as AnthropicUsage;
use aar_protocol::gemini::generate_content::types::UsageMetadata;
use aar_protocol::openai::chat::types::Usage;

pub fn from_anthropic(usage: &AnthropicUsage) -> Usage {
    Usage::from_parts(usage.input_tokens as i64, usage.output_tokens as i64, None)
}

/// Streaming variant; `message_start` carries the prompt count, the final
/// `message_delta` the completion count.
pub fn from_anthropic_counts(input_tokens: Option<u32>, output_tokens: Option<u32>) -> Usage {
    Usage::from_parts(
        input_tokens.unwrap_or(0) as i64,
        output_tokens.unwrap_or(0) as i64,
        None,
    )
}

/// Vertex reports visible and reasoning output separately; both count as
/// completion tokens, with the reasoning share surfaced in the details.
pub fn from_gemini(metadata: &UsageMetadata) -> Usage {
    let prompt = metadata.prompt_token_count.unwrap_or(0) as i64;
    let candidates = metadata.candidates_token_count.unwrap_or(0) as i64;
    let thoughts = metadata.thoughts_token_count.map(|count| count as i64);
    let completion = candidates + thoughts.unwrap_or(0);

    let usage = Usage::from_parts(prompt, completion, thoughts);
    if let Some(reported) = metadata.total_token_count {
        warn_on_mismatch("vertex", reported as i64, &usage);
    }
    usage
}

/// OpenAI usage is already canonical; only the total invariant is re-checked.
pub fn normalize_openai(usage: Usage) -> Usage {
    let computed = usage.prompt_tokens + usage.completion_tokens;
    if usage.total_tokens != computed {
        warn_on_mismatch("openai", usage.total_tokens, &usage);
    }
    Usage {
        total_tokens: computed,
        ..usage
    }
}

fn warn_on_mismatch(provider: &str, reported_total: i64, usage: &Usage) {
    let computed = usage.prompt_tokens + usage.completion_tokens;
    if reported_total != computed {
        tracing::warn!(
            provider,
            reported_total,
            computed_total = computed,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "provider-reported total_tokens disagrees with component sum; using the sum"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_maps_input_output() {
        let usage = from_anthropic(&AnthropicUsage {
            input_tokens: 17,
            output_tokens: 5,
        });
        assert_eq!(usage.prompt_tokens, 17);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 22);
        assert!(usage.completion_tokens_details.is_none());
    }

    #[test]
    fn gemini_folds_thoughts_into_completion() {
        let usage = from_gemini(&UsageMetadata {
            prompt_token_count: Some(10),
            candidates_token_count: Some(20),
            thoughts_token_count: Some(7),
            total_token_count: Some(37),
            cached_content_token_count: None,
        });
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 27);
        assert_eq!(usage.total_tokens, 37);
        assert_eq!(
            usage
                .completion_tokens_details
                .as_ref()
                .and_then(|details| details.reasoning_tokens),
            Some(7)
        );
    }

    #[test]
    fn computed_sum_wins_over_reported_total() {
        // Provider claims 100 but the components say 30.
        let usage = from_gemini(&UsageMetadata {
            prompt_token_count: Some(10),
            candidates_token_count: Some(20),
            thoughts_token_count: None,
            total_token_count: Some(100),
            cached_content_token_count: None,
        });
        assert_eq!(usage.total_tokens, 30);
    }

    #[test]
    fn openai_total_recomputed() {
        let usage = normalize_openai(Usage {
            prompt_tokens: 3,
            completion_tokens: 4,
            total_tokens: 9,
            completion_tokens_details: None,
        });
        assert_eq!(usage.total_tokens, 7);
    }
}
