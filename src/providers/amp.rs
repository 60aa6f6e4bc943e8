//! Amp thread logs: JSONL of messages whose assistant records carry
//! per-message usage under camelCase keys. Counters are already deltas.

use std::path::Path;

use anyhow::Result;
use serde_json::Value;
use tracing::warn;

use super::{
    non_empty_string, resolve_model, stream_json_lines, ParseContext, ProviderConfig,
    MAX_SESSION_FILE_BYTES,
};
use crate::dedup::MessageDeduper;
use crate::models::{ModelState, PricingEntry, RawUsage, TokenUsage, TokenUsageEvent};
use crate::usage::json_value_to_u64;

pub static CONFIG: ProviderConfig = ProviderConfig {
    name: "amp",
    sessions_dir_suffix: ".config/amp/sessions",
    legacy_fallback_model: None,
    fallback_pricing: FALLBACK_PRICING,
    session_file_ext: "jsonl",
    cached_counts_overlap_input: false,
    requires_deduper: false,
    requires_sqlite_cli: false,
    parse_session,
};

const FALLBACK_PRICING: &[(&str, PricingEntry)] = &[
    (
        "claude-sonnet-4-5",
        PricingEntry {
            input_cost_per_million: 3.0,
            cache_creation_cost_per_million: 3.75,
            cached_input_cost_per_million: 0.3,
            output_cost_per_million: 15.0,
            reasoning_output_cost_per_million: None,
        },
    ),
    (
        "claude-opus-4-1",
        PricingEntry {
            input_cost_per_million: 15.0,
            cache_creation_cost_per_million: 18.75,
            cached_input_cost_per_million: 1.5,
            output_cost_per_million: 75.0,
            reasoning_output_cost_per_million: None,
        },
    ),
];

fn parse_session(
    ctx: &ParseContext,
    session_id: &str,
    path: &Path,
    _deduper: Option<&mut MessageDeduper>,
    events: &mut Vec<TokenUsageEvent>,
) -> Result<()> {
    let mut state = ModelState::default();

    stream_json_lines(path, MAX_SESSION_FILE_BYTES, |index, line| {
        let record: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(error) => {
                warn!(
                    provider = ctx.provider,
                    path = %path.display(),
                    line_index = index,
                    error = %error,
                    "skipping malformed session line"
                );
                return;
            }
        };

        if record.get("role").and_then(Value::as_str) != Some("assistant") {
            return;
        }
        let Some(usage) = record.get("usage").filter(|u| u.is_object()) else {
            return;
        };

        let timestamp = match record.get("createdAt").or_else(|| record.get("timestamp")) {
            Some(Value::String(text)) => ctx.timestamp_from_str(text),
            Some(Value::Number(number)) => number.as_i64().map(|ms| ctx.timestamp_from_millis(ms)),
            _ => None,
        };
        let Some(timestamp) = timestamp else {
            warn!(
                provider = ctx.provider,
                path = %path.display(),
                line_index = index,
                "assistant message without a parseable timestamp"
            );
            return;
        };

        let input_tokens = field(usage, "inputTokens");
        let cache_creation = field(usage, "cacheCreationInputTokens");
        let cache_read = field(usage, "cacheReadInputTokens");
        let output_tokens = field(usage, "outputTokens");
        let raw = RawUsage {
            input_tokens,
            cache_creation_input_tokens: cache_creation,
            cached_input_tokens: cache_read,
            output_tokens,
            reasoning_output_tokens: 0,
            total_tokens: input_tokens
                .saturating_add(cache_creation)
                .saturating_add(cache_read)
                .saturating_add(output_tokens),
        };

        let extracted = record.get("model").and_then(non_empty_string);
        let Some((model, is_fallback)) = resolve_model(ctx, &mut state, extracted) else {
            return;
        };
        if let Some(event) = ctx.build_event(
            session_id,
            model,
            is_fallback,
            &timestamp,
            TokenUsage::from_raw(raw),
        ) {
            events.push(event);
        }
    })
}

fn field(usage: &Value, key: &str) -> u64 {
    usage.get(key).map(json_value_to_u64).unwrap_or(0)
}
