//! Key-alias resolution and tolerant numeric parsing for the heterogeneous
//! usage objects the providers emit, plus the accumulator that folds a JSON
//! usage object into a [`RawUsage`].

use serde_json::Value;

use crate::models::RawUsage;

/// Canonical counter a schema-specific key maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageField {
    Input,
    CacheCreation,
    Cached,
    Output,
    Reasoning,
    Total,
}

/// Map a provider-specific usage key onto its canonical field. Unknown keys
/// return `None` and are ignored by callers.
pub fn usage_field_for_key(key: &str) -> Option<UsageField> {
    match key {
        "input_tokens" | "prompt_tokens" | "input" => Some(UsageField::Input),
        "cache_creation_input_tokens" | "cache_write" => Some(UsageField::CacheCreation),
        "cache_read_input_tokens" | "cached" | "cached_input_tokens" => Some(UsageField::Cached),
        "output_tokens" | "completion_tokens" | "output" => Some(UsageField::Output),
        "reasoning_output_tokens" | "thoughts" => Some(UsageField::Reasoning),
        "total_tokens" | "total" => Some(UsageField::Total),
        _ => None,
    }
}

/// Tolerant u64 parser: plain integers, floats (truncated), and
/// thousand-separator commas all decode; anything else counts as zero.
pub fn parse_token_number(text: &str) -> u64 {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return 0;
    }
    if let Ok(value) = cleaned.parse::<u64>() {
        return value;
    }
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => value as u64,
        _ => 0,
    }
}

/// Tolerant conversion from an integer / float / string JSON value.
pub fn json_value_to_u64(value: &Value) -> u64 {
    match value {
        Value::Number(number) => {
            if let Some(v) = number.as_u64() {
                v
            } else if let Some(v) = number.as_i64() {
                v.max(0) as u64
            } else {
                number.as_f64().unwrap_or(0.0).max(0.0) as u64
            }
        }
        Value::String(raw) => parse_token_number(raw),
        _ => 0,
    }
}

/// Folds usage fields into a [`RawUsage`] snapshot.
///
/// `apply_field` follows the Codex convention: `input` and `total` are
/// running counters in the log and overwrite the last seen value, while the
/// cache, output, and reasoning fields add. `add_field` is the Zed
/// convention where every counter adds.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageAccumulator {
    raw: RawUsage,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_field(&mut self, field: UsageField, value: u64) {
        match field {
            UsageField::Input => self.raw.input_tokens = value,
            UsageField::Total => self.raw.total_tokens = value,
            UsageField::CacheCreation => {
                self.raw.cache_creation_input_tokens =
                    self.raw.cache_creation_input_tokens.saturating_add(value)
            }
            UsageField::Cached => {
                self.raw.cached_input_tokens = self.raw.cached_input_tokens.saturating_add(value)
            }
            UsageField::Output => {
                self.raw.output_tokens = self.raw.output_tokens.saturating_add(value)
            }
            UsageField::Reasoning => {
                self.raw.reasoning_output_tokens =
                    self.raw.reasoning_output_tokens.saturating_add(value)
            }
        }
    }

    pub fn add_field(&mut self, field: UsageField, value: u64) {
        match field {
            UsageField::Input => self.raw.input_tokens = self.raw.input_tokens.saturating_add(value),
            UsageField::Total => self.raw.total_tokens = self.raw.total_tokens.saturating_add(value),
            _ => self.apply_field(field, value),
        }
    }

    /// Run `apply_field` over every recognized key of a JSON usage object.
    pub fn apply_json_object(&mut self, value: &Value) {
        if let Some(object) = value.as_object() {
            for (key, field_value) in object {
                if let Some(field) = usage_field_for_key(key) {
                    self.apply_field(field, json_value_to_u64(field_value));
                }
            }
        }
    }

    /// Run `add_field` over every recognized key of a JSON usage object.
    pub fn add_json_object(&mut self, value: &Value) {
        if let Some(object) = value.as_object() {
            for (key, field_value) in object {
                if let Some(field) = usage_field_for_key(key) {
                    self.add_field(field, json_value_to_u64(field_value));
                }
            }
        }
    }

    pub fn finalize(self) -> RawUsage {
        let mut raw = self.raw;
        if raw.total_tokens == 0 {
            raw.total_tokens = raw.input_tokens.saturating_add(raw.output_tokens);
        }
        raw
    }
}
