//! Core data model shared by every provider and the aggregation pipeline.
//!
//! Data flows through these types in sequence: a provider parser snapshots a
//! log record into [`RawUsage`], normalizes it into a [`TokenUsage`] carried
//! by a [`TokenUsageEvent`], and the pipeline folds events into
//! [`DailySummary`] / [`SessionSummary`] / [`WeeklySummary`] rows plus a
//! cross-day [`SummaryTotals`]. All counter arithmetic saturates.

use std::collections::{BTreeMap, BTreeSet};

/// Wire-level token counters from a single log record, before any
/// normalization. Field names mirror the union of provider schemas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawUsage {
    pub input_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_output_tokens: u64,
    pub total_tokens: u64,
}

/// Normalized counters. Whether `cached_input_tokens` overlaps
/// `input_tokens` or is additive to it depends on the provider; the overlap
/// rule is applied by `ParseContext::normalize_usage_delta` before an event
/// is emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn from_raw(raw: RawUsage) -> Self {
        Self {
            input_tokens: raw.input_tokens,
            cache_creation_input_tokens: raw.cache_creation_input_tokens,
            cached_input_tokens: raw.cached_input_tokens,
            output_tokens: raw.output_tokens,
            reasoning_output_tokens: raw.reasoning_output_tokens,
            total_tokens: raw.total_tokens,
        }
    }

    /// Per-field saturating difference against the previous cumulative
    /// snapshot. With no previous snapshot the current value passes through
    /// verbatim. Late log rewrites can make a cumulative counter shrink;
    /// saturation clamps those deltas to zero.
    pub fn delta_from(current: RawUsage, previous: Option<RawUsage>) -> Self {
        let prev = previous.unwrap_or_default();
        Self {
            input_tokens: current.input_tokens.saturating_sub(prev.input_tokens),
            cache_creation_input_tokens: current
                .cache_creation_input_tokens
                .saturating_sub(prev.cache_creation_input_tokens),
            cached_input_tokens: current
                .cached_input_tokens
                .saturating_sub(prev.cached_input_tokens),
            output_tokens: current.output_tokens.saturating_sub(prev.output_tokens),
            reasoning_output_tokens: current
                .reasoning_output_tokens
                .saturating_sub(prev.reasoning_output_tokens),
            total_tokens: current.total_tokens.saturating_sub(prev.total_tokens),
        }
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.cache_creation_input_tokens = self
            .cache_creation_input_tokens
            .saturating_add(other.cache_creation_input_tokens);
        self.cached_input_tokens = self
            .cached_input_tokens
            .saturating_add(other.cached_input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.reasoning_output_tokens = self
            .reasoning_output_tokens
            .saturating_add(other.reasoning_output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }

    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0
            && self.cache_creation_input_tokens == 0
            && self.cached_input_tokens == 0
            && self.output_tokens == 0
            && self.reasoning_output_tokens == 0
            && self.total_tokens == 0
    }
}

/// One usage-bearing record after parsing; the atom of the pipeline.
/// Created by a provider parser and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct TokenUsageEvent {
    pub session_id: String,
    /// Original timestamp text from the log record.
    pub timestamp: String,
    /// Parsed epoch seconds, used for deterministic ordering.
    pub utc_seconds: i64,
    /// Wall-clock date in the run's timezone offset.
    pub local_iso_date: String,
    pub model_name: String,
    pub usage: TokenUsage,
    pub is_fallback_model: bool,
    /// Logical input shown to the user: normalized input plus both cache
    /// counters, which equals the raw input for overlap-mode providers.
    pub display_input_tokens: u64,
}

/// Per-session-file scratch: the model named by the most recent
/// `turn_context` (or message `model` field) carries forward until
/// overridden.
#[derive(Debug, Clone, Default)]
pub struct ModelState {
    pub current_model: Option<String>,
    pub is_fallback: bool,
}

/// USD per million tokens. `reasoning_output_cost_per_million` falls back to
/// the output rate when absent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingEntry {
    pub input_cost_per_million: f64,
    pub cache_creation_cost_per_million: f64,
    pub cached_input_cost_per_million: f64,
    pub output_cost_per_million: f64,
    pub reasoning_output_cost_per_million: Option<f64>,
}

impl PricingEntry {
    pub fn cost_usd(&self, usage: &TokenUsage) -> f64 {
        let reasoning_rate = self
            .reasoning_output_cost_per_million
            .unwrap_or(self.output_cost_per_million);
        (usage.input_tokens as f64 * self.input_cost_per_million
            + usage.cache_creation_input_tokens as f64 * self.cache_creation_cost_per_million
            + usage.cached_input_tokens as f64 * self.cached_input_cost_per_million
            + usage.output_tokens as f64 * self.output_cost_per_million
            + usage.reasoning_output_tokens as f64 * reasoning_rate)
            / 1_000_000.0
    }
}

#[derive(Debug, Clone)]
pub struct ModelSummary {
    pub name: String,
    pub usage: TokenUsage,
    pub display_input_tokens: u64,
    pub cost_usd: f64,
    pub pricing_available: bool,
    pub is_fallback: bool,
}

impl ModelSummary {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            usage: TokenUsage::default(),
            display_input_tokens: 0,
            cost_usd: 0.0,
            pricing_available: false,
            is_fallback: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DailySummary {
    pub iso_date: String,
    /// `"Nov 2, 2025"` form of `iso_date`.
    pub display_date: String,
    pub usage: TokenUsage,
    pub display_input_tokens: u64,
    pub cost_usd: f64,
    pub models: BTreeMap<String, ModelSummary>,
    pub missing_pricing: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub first_seen_timestamp: String,
    pub last_seen_timestamp: String,
    pub first_seen_seconds: i64,
    pub last_seen_seconds: i64,
    pub usage: TokenUsage,
    pub display_input_tokens: u64,
    pub cost_usd: f64,
    pub model_breakdown: BTreeMap<String, ModelSummary>,
}

/// ISO-8601 week bucket: Monday through Sunday, the week belonging to the
/// year of its Thursday.
#[derive(Debug, Clone)]
pub struct WeeklySummary {
    pub iso_year: i32,
    pub iso_week: u32,
    pub start_date: String,
    pub end_date: String,
    pub usage: TokenUsage,
    pub display_input_tokens: u64,
    pub cost_usd: f64,
    pub model_breakdown: BTreeMap<String, ModelSummary>,
    pub missing_pricing: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SummaryTotals {
    pub usage: TokenUsage,
    pub display_input_tokens: u64,
    pub cost_usd: f64,
    pub missing_pricing: BTreeSet<String>,
}
