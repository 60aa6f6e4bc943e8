//! Gemini CLI checkpoints: one JSON document per session whose `messages[]`
//! carry *cumulative* token totals, so consecutive snapshots are differenced
//! into per-message deltas.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::warn;

use super::{non_empty_string, resolve_model, ParseContext, ProviderConfig, MAX_SESSION_FILE_BYTES};
use crate::dedup::MessageDeduper;
use crate::models::{ModelState, PricingEntry, RawUsage, TokenUsage, TokenUsageEvent};
use crate::usage::json_value_to_u64;

pub static CONFIG: ProviderConfig = ProviderConfig {
    name: "gemini",
    sessions_dir_suffix: ".gemini/tmp",
    legacy_fallback_model: None,
    fallback_pricing: FALLBACK_PRICING,
    session_file_ext: "json",
    cached_counts_overlap_input: false,
    requires_deduper: false,
    requires_sqlite_cli: false,
    parse_session,
};

const FALLBACK_PRICING: &[(&str, PricingEntry)] = &[
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
    (
        "gemini-2.5-flash",
        PricingEntry {
            input_cost_per_million: 0.3,
            cache_creation_cost_per_million: 0.3,
            cached_input_cost_per_million: 0.075,
            output_cost_per_million: 2.5,
            reasoning_output_cost_per_million: None,
        },
    ),
    (
        "gemini-2.5-flash-lite",
        PricingEntry {
            input_cost_per_million: 0.1,
            cache_creation_cost_per_million: 0.1,
            cached_input_cost_per_million: 0.025,
            output_cost_per_million: 0.4,
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
    let size = std::fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    if size > MAX_SESSION_FILE_BYTES {
        warn!(
            provider = ctx.provider,
            path = %path.display(),
            bytes = size,
            "session file exceeds size cap, skipped"
        );
        return Ok(());
    }

    let content =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let document: Value = serde_json::from_str(&content)
        .with_context(|| format!("parse session JSON {}", path.display()))?;

    let label = document
        .get("sessionId")
        .and_then(non_empty_string)
        .unwrap_or_else(|| session_id.to_string());
    let Some(messages) = document.get("messages").and_then(Value::as_array) else {
        return Ok(());
    };

    let mut state = ModelState::default();
    let mut previous: Option<RawUsage> = None;

    for (index, message) in messages.iter().enumerate() {
        let Some(tokens) = message.get("tokens").filter(|t| t.is_object()) else {
            continue;
        };

        let timestamp = match message.get("timestamp") {
            Some(Value::String(text)) => ctx.timestamp_from_str(text),
            Some(Value::Number(number)) => number.as_i64().map(|ms| ctx.timestamp_from_millis(ms)),
            _ => None,
        };
        let Some(timestamp) = timestamp else {
            warn!(
                provider = ctx.provider,
                path = %path.display(),
                line_index = index,
                "message without a parseable timestamp"
            );
            continue;
        };

        // Cumulative snapshot; `tool` output folds into output, `thoughts`
        // are the reasoning share.
        let output = field(tokens, "output").saturating_add(field(tokens, "tool"));
        let raw = RawUsage {
            input_tokens: field(tokens, "input"),
            cache_creation_input_tokens: 0,
            cached_input_tokens: field(tokens, "cached"),
            output_tokens: output,
            reasoning_output_tokens: field(tokens, "thoughts"),
            total_tokens: field(tokens, "total"),
        };
        let delta = TokenUsage::delta_from(raw, previous);
        previous = Some(raw);

        let extracted = message.get("model").and_then(non_empty_string);
        let Some((model, is_fallback)) = resolve_model(ctx, &mut state, extracted) else {
            continue;
        };
        if let Some(event) = ctx.build_event(&label, model, is_fallback, &timestamp, delta) {
            events.push(event);
        }
    }
    Ok(())
}

fn field(tokens: &Value, key: &str) -> u64 {
    tokens.get(key).map(json_value_to_u64).unwrap_or(0)
}
