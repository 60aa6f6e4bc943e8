//! Claude Code project logs: JSONL where only `assistant` records carry
//! usage, already expressed per message. Session files get rewritten when a
//! conversation is resumed, so records are deduplicated on the
//! `(message.id, requestId)` pair.

use std::path::Path;

use anyhow::Result;
use serde_json::Value;
use tracing::warn;

use super::{
    non_empty_string, resolve_model, stream_json_lines, ParseContext, ProviderConfig,
    MAX_SESSION_FILE_BYTES,
};
use crate::dedup::{message_fingerprint, MessageDeduper};
use crate::models::{ModelState, PricingEntry, RawUsage, TokenUsage, TokenUsageEvent};
use crate::usage::json_value_to_u64;

pub static CONFIG: ProviderConfig = ProviderConfig {
    name: "claude",
    sessions_dir_suffix: ".claude/projects",
    legacy_fallback_model: None,
    fallback_pricing: FALLBACK_PRICING,
    session_file_ext: "jsonl",
    cached_counts_overlap_input: false,
    requires_deduper: true,
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
        "claude-sonnet-4",
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
    (
        "claude-opus-4",
        PricingEntry {
            input_cost_per_million: 15.0,
            cache_creation_cost_per_million: 18.75,
            cached_input_cost_per_million: 1.5,
            output_cost_per_million: 75.0,
            reasoning_output_cost_per_million: None,
        },
    ),
    (
        "claude-haiku-4-5",
        PricingEntry {
            input_cost_per_million: 1.0,
            cache_creation_cost_per_million: 1.25,
            cached_input_cost_per_million: 0.1,
            output_cost_per_million: 5.0,
            reasoning_output_cost_per_million: None,
        },
    ),
    (
        "claude-3-5-haiku",
        PricingEntry {
            input_cost_per_million: 0.8,
            cache_creation_cost_per_million: 1.0,
            cached_input_cost_per_million: 0.08,
            output_cost_per_million: 4.0,
            reasoning_output_cost_per_million: None,
        },
    ),
    (
        "claude-3-5-sonnet",
        PricingEntry {
            input_cost_per_million: 3.0,
            cache_creation_cost_per_million: 3.75,
            cached_input_cost_per_million: 0.3,
            output_cost_per_million: 15.0,
            reasoning_output_cost_per_million: None,
        },
    ),
];

fn parse_session(
    ctx: &ParseContext,
    session_id: &str,
    path: &Path,
    mut deduper: Option<&mut MessageDeduper>,
    events: &mut Vec<TokenUsageEvent>,
) -> Result<()> {
    let mut state = ModelState::default();
    // The record's own sessionId beats the filename; first one seen wins and
    // is applied to every event of the file once parsing finishes.
    let mut session_label: Option<String> = None;
    let first_event = events.len();

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

        if session_label.is_none() {
            session_label = record.get("sessionId").and_then(non_empty_string);
        }
        if record.get("type").and_then(Value::as_str) != Some("assistant") {
            return;
        }
        let Some(message) = record.get("message") else {
            return;
        };
        let Some(usage) = message.get("usage").filter(|u| u.is_object()) else {
            return;
        };

        if let Some(deduper) = deduper.as_deref_mut() {
            let message_id = message.get("id").and_then(non_empty_string);
            let request_id = record.get("requestId").and_then(non_empty_string);
            if let (Some(message_id), Some(request_id)) = (message_id, request_id) {
                if !deduper.mark(message_fingerprint(&message_id, &request_id)) {
                    return;
                }
            }
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
                "assistant record without a parseable timestamp"
            );
            return;
        };

        let input_tokens = field(usage, "input_tokens");
        let cache_creation = field(usage, "cache_creation_input_tokens");
        let cache_read = field(usage, "cache_read_input_tokens");
        let output_tokens = field(usage, "output_tokens");
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

        let extracted = message.get("model").and_then(non_empty_string);
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
    })?;

    if let Some(label) = session_label {
        for event in &mut events[first_event..] {
            event.session_id = label.clone();
        }
    }
    Ok(())
}

fn field(usage: &Value, key: &str) -> u64 {
    usage.get(key).map(json_value_to_u64).unwrap_or(0)
}
