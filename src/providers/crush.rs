//! Crush project databases: every project under `~/.config/crush/projects`
//! carries a SQLite file whose session rows hold a prompt/completion token
//! pair for a specific model. One event per session row.

use std::path::Path;

use anyhow::Result;
use serde_json::Value;
use tracing::warn;

use super::{non_empty_string, resolve_model, sqlite, ParseContext, ProviderConfig};
use crate::dedup::MessageDeduper;
use crate::models::{ModelState, PricingEntry, RawUsage, TokenUsage, TokenUsageEvent};
use crate::usage::json_value_to_u64;

pub static CONFIG: ProviderConfig = ProviderConfig {
    name: "crush",
    sessions_dir_suffix: ".config/crush/projects",
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

const SESSIONS_QUERY: &str =
    "SELECT id, model, prompt_tokens, completion_tokens, updated_at FROM sessions";

fn parse_session(
    ctx: &ParseContext,
    session_id: &str,
    path: &Path,
    _deduper: Option<&mut MessageDeduper>,
    events: &mut Vec<TokenUsageEvent>,
) -> Result<()> {
    let rows = sqlite::query_json(path, SESSIONS_QUERY)?;

    for (index, row) in rows.iter().enumerate() {
        let label = row
            .get("id")
            .and_then(non_empty_string)
            .unwrap_or_else(|| session_id.to_string());

        let timestamp = match row.get("updated_at") {
            Some(Value::Number(number)) => {
                // Stored as unix milliseconds; tolerate plain seconds too.
                number.as_i64().map(|v| {
                    if v > 100_000_000_000 {
                        ctx.timestamp_from_millis(v)
                    } else {
                        ctx.timestamp_from_millis(v.saturating_mul(1_000))
                    }
                })
            }
            Some(Value::String(text)) => ctx.timestamp_from_str(text),
            _ => None,
        };
        let Some(timestamp) = timestamp else {
            warn!(
                provider = ctx.provider,
                path = %path.display(),
                line_index = index,
                "session row without a parseable updated_at"
            );
            continue;
        };

        let prompt_tokens = row.get("prompt_tokens").map(json_value_to_u64).unwrap_or(0);
        let completion_tokens = row
            .get("completion_tokens")
            .map(json_value_to_u64)
            .unwrap_or(0);
        let raw = RawUsage {
            input_tokens: prompt_tokens,
            output_tokens: completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            ..Default::default()
        };

        // Model is per row; there is no carry-forward between sessions.
        let mut state = ModelState::default();
        let extracted = row.get("model").and_then(non_empty_string);
        let Some((model, is_fallback)) = resolve_model(ctx, &mut state, extracted) else {
            continue;
        };
        if let Some(event) = ctx.build_event(
            &label,
            model,
            is_fallback,
            &timestamp,
            TokenUsage::from_raw(raw),
        ) {
            events.push(event);
        }
    }
    Ok(())
}
