//! Opencode session logs: JSONL messages with a nested `tokens` object
//! (`input`/`output`/`reasoning` plus `cache.read`/`cache.write`), the model
//! under `modelID`, and creation time in epoch milliseconds.

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
    name: "opencode",
    sessions_dir_suffix: ".local/share/opencode/sessions",
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
        "gpt-5",
        PricingEntry {
            input_cost_per_million: 1.25,
            cache_creation_cost_per_million: 1.25,
            cached_input_cost_per_million: 0.125,
            output_cost_per_million: 10.0,
            reasoning_output_cost_per_million: None,
        },
    ),
    (
        "gemini-2.5-pro",
        PricingEntry {
            input_cost_per_million: 1.25,
            cache_creation_cost_per_million: 1.25,
            cached_input_cost_per_million: 0.3125,
            output_cost_per_million: 10.0,
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

        let Some(tokens) = record.get("tokens").filter(|t| t.is_object()) else {
            return;
        };

        let timestamp = match record.get("time").and_then(|t| t.get("created")) {
            Some(Value::Number(number)) => number.as_i64().map(|ms| ctx.timestamp_from_millis(ms)),
            Some(Value::String(text)) => ctx.timestamp_from_str(text),
            _ => None,
        };
        let Some(timestamp) = timestamp else {
            warn!(
                provider = ctx.provider,
                path = %path.display(),
                line_index = index,
                "message without a parseable creation time"
            );
            return;
        };

        let cache = tokens.get("cache");
        let input_tokens = field(tokens, "input");
        let output_tokens = field(tokens, "output");
        let reasoning = field(tokens, "reasoning");
        let cache_read = cache.and_then(|c| c.get("read")).map(json_value_to_u64).unwrap_or(0);
        let cache_write = cache.and_then(|c| c.get("write")).map(json_value_to_u64).unwrap_or(0);
        let raw = RawUsage {
            input_tokens,
            cache_creation_input_tokens: cache_write,
            cached_input_tokens: cache_read,
            output_tokens,
            reasoning_output_tokens: reasoning,
            total_tokens: input_tokens
                .saturating_add(cache_write)
                .saturating_add(cache_read)
                .saturating_add(output_tokens)
                .saturating_add(reasoning),
        };

        let extracted = record
            .get("modelID")
            .and_then(non_empty_string)
            .or_else(|| record.get("model").and_then(non_empty_string));
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

fn field(tokens: &Value, key: &str) -> u64 {
    tokens.get(key).map(json_value_to_u64).unwrap_or(0)
}
