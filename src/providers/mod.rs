//! Provider framework.
//!
//! Each supported agent tool supplies a static [`ProviderConfig`] describing
//! where its session logs live and how one session file parses. The shared
//! [`Provider`] runner owns everything else: the recursive directory scan,
//! the bounded worker pool, dedup wiring, and funneling events through a
//! mutex-guarded consumer. Dispatch is an explicit function pointer per
//! provider; there is no trait object zoo to maintain.

pub mod amp;
pub mod claude;
pub mod codex;
pub mod crush;
pub mod gemini;
pub mod opencode;
pub mod sqlite;
pub mod zed;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde_json::Value;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::aggregate::SummaryBuilder;
use crate::dedup::MessageDeduper;
use crate::models::{ModelState, PricingEntry, TokenUsage, TokenUsageEvent};
use crate::pricing::PricingMap;
use crate::timestamp::{iso_date_for_timezone, parse_iso8601_to_utc_seconds};

/// Session files larger than this stop parsing mid-read; events emitted
/// before the cap are retained.
pub const MAX_SESSION_FILE_BYTES: u64 = 128 * 1024 * 1024;

/// Fingerprint capacity for providers that require a deduper. Per file, so
/// this comfortably exceeds any real session.
const DEDUP_CAPACITY: usize = 1 << 16;

pub type ParseSessionFn = fn(
    ctx: &ParseContext,
    session_id: &str,
    path: &Path,
    deduper: Option<&mut MessageDeduper>,
    events: &mut Vec<TokenUsageEvent>,
) -> Result<()>;

/// Static description of one supported agent tool.
pub struct ProviderConfig {
    pub name: &'static str,
    /// Sessions root, relative to `$HOME`.
    pub sessions_dir_suffix: &'static str,
    /// Model attributed to usage when no record ever names one.
    pub legacy_fallback_model: Option<&'static str>,
    pub fallback_pricing: &'static [(&'static str, PricingEntry)],
    pub session_file_ext: &'static str,
    pub cached_counts_overlap_input: bool,
    pub requires_deduper: bool,
    /// Session databases are read through the `sqlite3` CLI; without the
    /// binary the whole provider is skipped.
    pub requires_sqlite_cli: bool,
    pub parse_session: ParseSessionFn,
}

/// Registry in presentation order.
pub fn all() -> &'static [&'static ProviderConfig] {
    static ALL: &[&ProviderConfig] = &[
        &codex::CONFIG,
        &claude::CONFIG,
        &gemini::CONFIG,
        &amp::CONFIG,
        &opencode::CONFIG,
        &crush::CONFIG,
        &zed::CONFIG,
    ];
    ALL
}

pub fn by_name(name: &str) -> Option<&'static ProviderConfig> {
    all()
        .iter()
        .copied()
        .find(|config| config.name.eq_ignore_ascii_case(name.trim()))
}

/// Per-file parse state handed to every `parse_session` call.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub provider: &'static str,
    pub cached_counts_overlap_input: bool,
    pub legacy_fallback_model: Option<&'static str>,
    pub tz_offset_minutes: i32,
}

/// A record timestamp resolved into the three representations events carry.
#[derive(Debug, Clone)]
pub struct EventTimestamp {
    pub text: String,
    pub utc_seconds: i64,
    pub local_iso_date: String,
}

impl ParseContext {
    fn for_config(config: &ProviderConfig, tz_offset_minutes: i32) -> Self {
        Self {
            provider: config.name,
            cached_counts_overlap_input: config.cached_counts_overlap_input,
            legacy_fallback_model: config.legacy_fallback_model,
            tz_offset_minutes,
        }
    }

    /// Parse a record's timestamp text; `None` means the record is dropped.
    pub fn timestamp_from_str(&self, text: &str) -> Option<EventTimestamp> {
        let utc_seconds = parse_iso8601_to_utc_seconds(text).ok()?;
        Some(EventTimestamp {
            text: text.trim().to_string(),
            utc_seconds,
            local_iso_date: iso_date_for_timezone(utc_seconds, self.tz_offset_minutes),
        })
    }

    /// Timestamp from epoch milliseconds (Crush and Opencode store these).
    pub fn timestamp_from_millis(&self, millis: i64) -> EventTimestamp {
        let utc_seconds = millis.div_euclid(1_000);
        EventTimestamp {
            text: crate::timestamp::format_utc_iso8601(utc_seconds),
            utc_seconds,
            local_iso_date: iso_date_for_timezone(utc_seconds, self.tz_offset_minutes),
        }
    }

    /// Rebase `input_tokens` for providers whose raw counters fold cached
    /// reads into the input figure. Raw Codex values satisfy
    /// `input + output == total`; once input has been rebased that identity
    /// no longer holds and the value passes through untouched, which keeps
    /// the operation idempotent.
    pub fn normalize_usage_delta(&self, usage: TokenUsage) -> TokenUsage {
        if !self.cached_counts_overlap_input {
            return usage;
        }
        let overlap = usage
            .cached_input_tokens
            .saturating_add(usage.cache_creation_input_tokens);
        if overlap == 0 {
            return usage;
        }
        if usage.input_tokens.saturating_add(usage.output_tokens) != usage.total_tokens {
            return usage;
        }
        TokenUsage {
            input_tokens: usage.input_tokens.saturating_sub(overlap),
            ..usage
        }
    }

    /// Normalize a delta and wrap it into an event. Entirely-zero usage
    /// yields `None` and the record is dropped.
    pub fn build_event(
        &self,
        session_id: &str,
        model_name: String,
        is_fallback_model: bool,
        timestamp: &EventTimestamp,
        delta: TokenUsage,
    ) -> Option<TokenUsageEvent> {
        let usage = self.normalize_usage_delta(delta);
        if usage.is_zero() {
            return None;
        }
        let display_input_tokens = usage
            .input_tokens
            .saturating_add(usage.cached_input_tokens)
            .saturating_add(usage.cache_creation_input_tokens);
        Some(TokenUsageEvent {
            session_id: session_id.to_string(),
            timestamp: timestamp.text.clone(),
            utc_seconds: timestamp.utc_seconds,
            local_iso_date: timestamp.local_iso_date.clone(),
            model_name,
            usage,
            is_fallback_model,
            display_input_tokens,
        })
    }
}

/// Resolve the model for a record: an extracted name updates the carried
/// state, otherwise the carried state applies, otherwise the provider's
/// legacy fallback. `None` drops the event.
pub fn resolve_model(
    ctx: &ParseContext,
    state: &mut ModelState,
    extracted: Option<String>,
) -> Option<(String, bool)> {
    if let Some(model) = extracted.filter(|m| !m.trim().is_empty()) {
        let model = model.trim().to_string();
        state.current_model = Some(model.clone());
        state.is_fallback = false;
        return Some((model, false));
    }
    if let Some(model) = &state.current_model {
        return Some((model.clone(), state.is_fallback));
    }
    let fallback = ctx.legacy_fallback_model?;
    state.current_model = Some(fallback.to_string());
    state.is_fallback = true;
    Some((fallback.to_string(), true))
}

/// Trimmed, non-empty string out of a JSON value.
pub fn non_empty_string(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Memory-capped line reader. Calls `handler(line_index, line)` for every
/// non-empty stripped line; once the byte budget is spent, reading halts
/// cleanly and whatever was emitted stands.
pub fn stream_json_lines(
    path: &Path,
    max_bytes: u64,
    mut handler: impl FnMut(usize, &str),
) -> Result<()> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    let mut consumed: u64 = 0;
    let mut index = 0usize;
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .with_context(|| format!("read {}", path.display()))?;
        if read == 0 {
            break;
        }
        consumed += read as u64;
        if consumed > max_bytes {
            warn!(path = %path.display(), cap_bytes = max_bytes, "session file exceeds size cap, truncating read");
            break;
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            handler(index, trimmed);
        }
        index += 1;
    }
    Ok(())
}

/// Thread-safe event sink shared by the parse workers.
pub struct EventConsumer<'a> {
    sink: Mutex<Box<dyn FnMut(TokenUsageEvent) + Send + 'a>>,
}

impl<'a> EventConsumer<'a> {
    pub fn new(sink: impl FnMut(TokenUsageEvent) + Send + 'a) -> Self {
        Self {
            sink: Mutex::new(Box::new(sink)),
        }
    }

    pub fn accept(&self, event: TokenUsageEvent) {
        let mut sink = self.sink.lock().expect("event sink poisoned");
        (sink)(event);
    }
}

/// Scan parameters shared by every provider in a run.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub home: PathBuf,
    pub tz_offset_minutes: i32,
}

/// Runner wrapping a [`ProviderConfig`].
#[derive(Clone, Copy)]
pub struct Provider {
    pub config: &'static ProviderConfig,
}

impl Provider {
    pub fn new(config: &'static ProviderConfig) -> Self {
        Self { config }
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn sessions_root(&self, home: &Path) -> PathBuf {
        home.join(self.config.sessions_dir_suffix)
    }

    /// Merge this provider's static fallback table into the pricing map,
    /// filling only absent entries.
    pub fn load_pricing_data(&self, pricing: &mut PricingMap) {
        for (model, entry) in self.config.fallback_pricing {
            pricing.insert_if_absent(model, *entry);
        }
    }

    /// Scan this provider and funnel every event into the shared summary
    /// builder.
    pub fn collect(&self, options: &ScanOptions, builder: &Mutex<SummaryBuilder>) -> Result<()> {
        let consumer = EventConsumer::new(|event| {
            builder
                .lock()
                .expect("summary builder poisoned")
                .add_event(event)
        });
        self.stream_events(options, &consumer)
    }

    /// Walk the sessions root and parse every matching file on a bounded
    /// worker pool, emitting events one at a time to `consumer`. Per-file
    /// failures log and do not abort the scan.
    pub fn stream_events(&self, options: &ScanOptions, consumer: &EventConsumer<'_>) -> Result<()> {
        let root = self.sessions_root(&options.home);
        if !root.is_dir() {
            info!(provider = self.name(), root = %root.display(), "sessions directory missing, provider skipped");
            return Ok(());
        }
        if self.config.requires_sqlite_cli && !sqlite::cli_available() {
            info!(provider = self.name(), "sqlite3 binary not found, provider skipped");
            return Ok(());
        }

        let files = self.session_files(&root);
        if files.is_empty() {
            return Ok(());
        }

        let ctx = ParseContext::for_config(self.config, options.tz_offset_minutes);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count())
            .build()
            .context("failed to build parse worker pool")?;

        pool.install(|| {
            files.par_iter().for_each(|(session_id, path)| {
                let mut deduper = self
                    .config
                    .requires_deduper
                    .then(|| MessageDeduper::init(DEDUP_CAPACITY));
                let mut events = Vec::new();
                let parse = self.config.parse_session;
                if let Err(error) = parse(&ctx, session_id, path, deduper.as_mut(), &mut events) {
                    warn!(
                        provider = self.name(),
                        path = %path.display(),
                        error = %error,
                        "failed to parse session file"
                    );
                }
                for event in events {
                    consumer.accept(event);
                }
            });
        });
        Ok(())
    }

    /// All session files under the root whose extension matches, with the
    /// filename stem as the session id. Sorted so scans are deterministic.
    fn session_files(&self, root: &Path) -> Vec<(String, PathBuf)> {
        let mut files: Vec<(String, PathBuf)> = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext == self.config.session_file_ext)
                    .unwrap_or(false)
            })
            .filter_map(|entry| {
                let stem = entry.path().file_stem()?.to_str()?.to_string();
                Some((stem, entry.into_path()))
            })
            .collect();
        files.sort_by(|a, b| a.1.cmp(&b.1));
        files
    }
}

fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawUsage;

    fn overlap_ctx() -> ParseContext {
        ParseContext {
            provider: "codex",
            cached_counts_overlap_input: true,
            legacy_fallback_model: Some("gpt-5"),
            tz_offset_minutes: 0,
        }
    }

    fn additive_ctx() -> ParseContext {
        ParseContext {
            provider: "claude",
            cached_counts_overlap_input: false,
            legacy_fallback_model: None,
            tz_offset_minutes: 0,
        }
    }

    fn usage(input: u64, cached: u64, output: u64, total: u64) -> TokenUsage {
        TokenUsage::from_raw(RawUsage {
            input_tokens: input,
            cached_input_tokens: cached,
            output_tokens: output,
            total_tokens: total,
            ..Default::default()
        })
    }

    #[test]
    fn overlap_normalization_rebases_input() {
        let normalized = overlap_ctx().normalize_usage_delta(usage(1000, 200, 50, 1050));
        assert_eq!(normalized.input_tokens, 800);
        assert_eq!(normalized.cached_input_tokens, 200);
    }

    #[test]
    fn overlap_normalization_is_idempotent() {
        let ctx = overlap_ctx();
        let once = ctx.normalize_usage_delta(usage(1000, 200, 50, 1050));
        let twice = ctx.normalize_usage_delta(once);
        assert_eq!(once, twice);
    }

    #[test]
    fn additive_mode_leaves_usage_untouched() {
        let raw = usage(1000, 200, 50, 1250);
        assert_eq!(additive_ctx().normalize_usage_delta(raw), raw);
    }

    #[test]
    fn build_event_drops_zero_usage() {
        let ctx = additive_ctx();
        let ts = ctx.timestamp_from_str("2025-11-01T10:00:00Z").unwrap();
        assert!(ctx
            .build_event("s", "m".into(), false, &ts, TokenUsage::default())
            .is_none());
    }

    #[test]
    fn display_input_matches_raw_input_in_overlap_mode() {
        let ctx = overlap_ctx();
        let ts = ctx.timestamp_from_str("2025-11-01T10:00:00Z").unwrap();
        let event = ctx
            .build_event("s", "gpt-5-codex".into(), false, &ts, usage(1000, 200, 50, 1050))
            .unwrap();
        assert_eq!(event.usage.input_tokens, 800);
        assert_eq!(event.display_input_tokens, 1000);
    }

    #[test]
    fn resolve_model_carries_state_and_falls_back() {
        let ctx = overlap_ctx();
        let mut state = ModelState::default();

        let (model, fallback) = resolve_model(&ctx, &mut state, None).unwrap();
        assert_eq!(model, "gpt-5");
        assert!(fallback);

        let (model, fallback) =
            resolve_model(&ctx, &mut state, Some("gpt-5-codex".into())).unwrap();
        assert_eq!(model, "gpt-5-codex");
        assert!(!fallback);

        let (model, fallback) = resolve_model(&ctx, &mut state, None).unwrap();
        assert_eq!(model, "gpt-5-codex");
        assert!(!fallback);
    }

    #[test]
    fn resolve_model_without_fallback_drops() {
        let ctx = additive_ctx();
        let mut state = ModelState::default();
        assert!(resolve_model(&ctx, &mut state, None).is_none());
    }

    #[test]
    fn registry_lookup_is_case_insensitive() {
        assert!(by_name("Codex").is_some());
        assert!(by_name(" zed ").is_some());
        assert!(by_name("unknown-tool").is_none());
    }
}
