//! Codex CLI sessions: JSONL records where `turn_context` frames carry the
//! active model and `event_msg`/`token_count` frames carry usage, either as
//! a ready-made delta (`last_token_usage`) or as cumulative totals that need
//! differencing.

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
use crate::usage::UsageAccumulator;

pub static CONFIG: ProviderConfig = ProviderConfig {
    name: "codex",
    sessions_dir_suffix: ".codex/sessions",
    legacy_fallback_model: Some("gpt-5"),
    fallback_pricing: FALLBACK_PRICING,
    session_file_ext: "jsonl",
    cached_counts_overlap_input: true,
    requires_deduper: false,
    requires_sqlite_cli: false,
    parse_session,
};

const FALLBACK_PRICING: &[(&str, PricingEntry)] = &[
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
        "gpt-5-codex",
        PricingEntry {
            input_cost_per_million: 1.25,
            cache_creation_cost_per_million: 1.25,
            cached_input_cost_per_million: 0.125,
            output_cost_per_million: 10.0,
            reasoning_output_cost_per_million: None,
        },
    ),
    (
        "gpt-5-mini",
        PricingEntry {
            input_cost_per_million: 0.6,
            cache_creation_cost_per_million: 0.6,
            cached_input_cost_per_million: 0.06,
            output_cost_per_million: 2.0,
            reasoning_output_cost_per_million: None,
        },
    ),
    (
        "gpt-5-nano",
        PricingEntry {
            input_cost_per_million: 0.2,
            cache_creation_cost_per_million: 0.2,
            cached_input_cost_per_million: 0.02,
            output_cost_per_million: 0.8,
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
    let mut previous_totals: Option<RawUsage> = None;

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

        let record_type = record
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let payload = record.get("payload");

        if record_type == "turn_context" {
            if let Some(model) = payload.and_then(extract_model) {
                state.current_model = Some(model);
                state.is_fallback = false;
            }
            return;
        }
        if record_type != "event_msg" {
            return;
        }
        let Some(payload) = payload else { return };
        if payload.get("type").and_then(Value::as_str) != Some("token_count") {
            return;
        }

        let Some(timestamp) = record
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|text| ctx.timestamp_from_str(text))
        else {
            warn!(
                provider = ctx.provider,
                path = %path.display(),
                line_index = index,
                "token_count record without a parseable timestamp"
            );
            return;
        };

        let info = payload.get("info");
        let last_usage = info
            .and_then(|value| value.get("last_token_usage"))
            .and_then(usage_snapshot);
        let total_usage = info
            .and_then(|value| value.get("total_token_usage"))
            .and_then(usage_snapshot);

        // When both snapshots are present, last_token_usage is always the
        // emitted delta; total_token_usage still replaces the remembered
        // cumulative.
        let delta = match (last_usage, total_usage) {
            (Some(last), _) => Some(TokenUsage::from_raw(last)),
            (None, Some(total)) => Some(TokenUsage::delta_from(total, previous_totals)),
            (None, None) => None,
        };
        if let Some(total) = total_usage {
            previous_totals = Some(total);
        }
        let Some(delta) = delta else { return };

        let extracted = extract_model(payload).or_else(|| info.and_then(extract_model));
        let Some((model, is_fallback)) = resolve_model(ctx, &mut state, extracted) else {
            return;
        };
        if let Some(event) = ctx.build_event(session_id, model, is_fallback, &timestamp, delta) {
            events.push(event);
        }
    })
}

fn usage_snapshot(value: &Value) -> Option<RawUsage> {
    if !value.is_object() {
        return None;
    }
    let mut accumulator = UsageAccumulator::new();
    accumulator.apply_json_object(value);
    Some(accumulator.finalize())
}

/// Model name out of a payload: `model`, `model_name`, or the same fields
/// nested under `info` / `metadata`.
fn extract_model(value: &Value) -> Option<String> {
    let object = value.as_object()?;

    if let Some(model) = object.get("model").and_then(non_empty_string) {
        return Some(model);
    }
    if let Some(model) = object.get("model_name").and_then(non_empty_string) {
        return Some(model);
    }
    if let Some(info) = object.get("info") {
        if let Some(model) = extract_model(info) {
            return Some(model);
        }
    }
    if let Some(metadata) = object.get("metadata") {
        if let Some(model) = extract_model(metadata) {
            return Some(model);
        }
    }
    None
}
