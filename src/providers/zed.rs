//! Zed agent threads: a single SQLite database whose `data` column is a
//! zstd-compressed JSON thread. Each entry of the thread's
//! `request_token_usage` map becomes one event, timestamped from the row's
//! `updated_at`.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::warn;

use super::{non_empty_string, resolve_model, sqlite, ParseContext, ProviderConfig};
use crate::dedup::MessageDeduper;
use crate::models::{ModelState, PricingEntry, TokenUsageEvent};
use crate::usage::UsageAccumulator;

pub static CONFIG: ProviderConfig = ProviderConfig {
    name: "zed",
    sessions_dir_suffix: ".local/share/zed/threads",
    legacy_fallback_model: None,
    fallback_pricing: FALLBACK_PRICING,
    session_file_ext: "db",
    cached_counts_overlap_input: false,
    requires_deduper: false,
    requires_sqlite_cli: true,
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

const THREADS_QUERY: &str = "SELECT id, updated_at, hex(data) AS data FROM threads";

fn parse_session(
    ctx: &ParseContext,
    _session_id: &str,
    path: &Path,
    _deduper: Option<&mut MessageDeduper>,
    events: &mut Vec<TokenUsageEvent>,
) -> Result<()> {
    let rows = sqlite::query_json(path, THREADS_QUERY)?;

    for (index, row) in rows.iter().enumerate() {
        let Some(thread_id) = row.get("id").and_then(non_empty_string) else {
            continue;
        };
        let Some(timestamp) = row
            .get("updated_at")
            .and_then(Value::as_str)
            .and_then(|text| ctx.timestamp_from_str(text))
        else {
            warn!(
                provider = ctx.provider,
                path = %path.display(),
                line_index = index,
                "thread row without a parseable updated_at"
            );
            continue;
        };

        let thread = match row
            .get("data")
            .and_then(Value::as_str)
            .context("thread row without hex data")
            .and_then(|hex_text| decode_thread_blob(hex_text.trim()))
        {
            Ok(thread) => thread,
            Err(error) => {
                warn!(
                    provider = ctx.provider,
                    path = %path.display(),
                    line_index = index,
                    error = %error,
                    "skipping undecodable thread blob"
                );
                continue;
            }
        };

        emit_thread_events(ctx, &thread_id, &timestamp, &thread, events);
    }
    Ok(())
}

/// Hex row text → zstd frame → thread JSON.
pub fn decode_thread_blob(hex_text: &str) -> Result<Value> {
    let compressed = hex::decode(hex_text).context("invalid hex in thread data")?;
    let raw = zstd::decode_all(compressed.as_slice()).context("zstd decompression failed")?;
    serde_json::from_slice(&raw).context("thread blob is not valid JSON")
}

/// One event per `request_token_usage` entry. Zed folds usage additively, so
/// the accumulator runs in add mode.
pub fn emit_thread_events(
    ctx: &ParseContext,
    thread_id: &str,
    timestamp: &super::EventTimestamp,
    thread: &Value,
    events: &mut Vec<TokenUsageEvent>,
) {
    let Some(usage_map) = thread.get("request_token_usage").and_then(Value::as_object) else {
        return;
    };

    let mut state = ModelState::default();
    let extracted = extract_model(thread);

    let mut request_ids: Vec<&String> = usage_map.keys().collect();
    request_ids.sort();

    for request_id in request_ids {
        let usage_value = &usage_map[request_id];
        if !usage_value.is_object() {
            continue;
        }
        let mut accumulator = UsageAccumulator::new();
        accumulator.add_json_object(usage_value);
        let mut raw = accumulator.finalize();
        // Request usage entries carry no total of their own; count the cache
        // shares like every other additive provider does.
        if raw.total_tokens == raw.input_tokens.saturating_add(raw.output_tokens) {
            raw.total_tokens = raw
                .input_tokens
                .saturating_add(raw.cache_creation_input_tokens)
                .saturating_add(raw.cached_input_tokens)
                .saturating_add(raw.output_tokens)
                .saturating_add(raw.reasoning_output_tokens);
        }

        let Some((model, is_fallback)) = resolve_model(ctx, &mut state, extracted.clone()) else {
            continue;
        };
        if let Some(event) = ctx.build_event(
            thread_id,
            model,
            is_fallback,
            timestamp,
            crate::models::TokenUsage::from_raw(raw),
        ) {
            events.push(event);
        }
    }
}

/// The thread's `model` is either a plain string or an object with a nested
/// `model` name.
fn extract_model(thread: &Value) -> Option<String> {
    match thread.get("model") {
        Some(Value::String(_)) => thread.get("model").and_then(non_empty_string),
        Some(Value::Object(object)) => object.get("model").and_then(non_empty_string),
        _ => None,
    }
}
