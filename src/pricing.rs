//! Model pricing resolution.
//!
//! The map is seeded from LiteLLM's public manifest when the network allows,
//! then each selected provider merges its static fallback table underneath.
//! Fallbacks never overwrite an entry that is already present.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::models::PricingEntry;

const LITELLM_PRICING_URL: &str =
    "https://raw.githubusercontent.com/BerriAI/litellm/main/model_prices_and_context_window.json";

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct PricingMap {
    entries: HashMap<String, PricingEntry>,
}

impl PricingMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, name: &str, entry: PricingEntry) {
        self.entries.insert(name.to_string(), entry);
    }

    /// Fallback-table merge: only fills holes the manifest left.
    pub fn insert_if_absent(&mut self, name: &str, entry: PricingEntry) {
        self.entries.entry(name.to_string()).or_insert(entry);
    }

    pub fn remove(&mut self, name: &str) -> Option<PricingEntry> {
        self.entries.remove(name)
    }

    /// Exact name first, then the canonicalized alias.
    pub fn lookup(&self, model: &str) -> Option<&PricingEntry> {
        if let Some(entry) = self.entries.get(model) {
            return Some(entry);
        }
        self.entries.get(&canonicalize_model_name(model))
    }

    /// Fetch the LiteLLM manifest and seed the map with per-million rates.
    /// Callers treat a failure as non-fatal; the fallback tables still load.
    pub async fn fetch_remote(&mut self) -> Result<usize> {
        info!("fetching model pricing manifest");
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("failed to build pricing HTTP client")?;
        let manifest: Value = client
            .get(LITELLM_PRICING_URL)
            .send()
            .await
            .context("failed to fetch pricing manifest")?
            .json()
            .await
            .context("failed to parse pricing manifest JSON")?;

        let merged = self.merge_manifest(&manifest);
        info!(models = merged, "loaded remote pricing entries");
        Ok(merged)
    }

    fn merge_manifest(&mut self, manifest: &Value) -> usize {
        let Some(models) = manifest.as_object() else {
            return 0;
        };
        let mut merged = 0;
        for (name, data) in models {
            let Some(input) = cost_field(data, "input_cost_per_token") else {
                continue;
            };
            let Some(output) = cost_field(data, "output_cost_per_token") else {
                continue;
            };
            // LiteLLM prices per token; the map carries USD per million.
            let entry = PricingEntry {
                input_cost_per_million: input * 1e6,
                cache_creation_cost_per_million: cost_field(data, "cache_creation_input_token_cost")
                    .unwrap_or(input)
                    * 1e6,
                cached_input_cost_per_million: cost_field(data, "cache_read_input_token_cost")
                    .unwrap_or(input)
                    * 1e6,
                output_cost_per_million: output * 1e6,
                reasoning_output_cost_per_million: None,
            };
            debug!(model = %name, "manifest pricing entry");
            self.insert(name, entry);
            merged += 1;
        }
        merged
    }
}

/// Collapse a model name onto the key its pricing lives under: strip a
/// `provider/` prefix and a trailing `-YYYYMMDD` stamp, and fold the Codex
/// variants onto their base tier.
pub fn canonicalize_model_name(model: &str) -> String {
    let name = model.rsplit('/').next().unwrap_or(model).trim();
    let name = strip_date_suffix(name);

    if name == "gpt-5-codex" {
        return "gpt-5".to_string();
    }
    if name.starts_with("gpt-5-mini") {
        return "gpt-5-mini".to_string();
    }
    if name.starts_with("gpt-5-nano") {
        return "gpt-5-nano".to_string();
    }
    if name.starts_with("gpt-5") {
        return "gpt-5".to_string();
    }
    name.to_string()
}

fn strip_date_suffix(name: &str) -> &str {
    if let Some(idx) = name.rfind('-') {
        let suffix = &name[idx + 1..];
        if suffix.len() == 8 && suffix.bytes().all(|b| b.is_ascii_digit()) {
            return &name[..idx];
        }
    }
    name
}

fn cost_field(data: &Value, key: &str) -> Option<f64> {
    data.get(key).and_then(Value::as_f64)
}
