//! Aggregation pipeline: deterministic sort, date filtering, bucketing into
//! day / session / ISO-week summaries, the pricing pass, and cross-day
//! totals.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate, Weekday};

use crate::models::{
    DailySummary, ModelSummary, SessionSummary, SummaryTotals, TokenUsageEvent, WeeklySummary,
};
use crate::pricing::PricingMap;
use crate::timestamp::display_date;

/// Inclusive `local_iso_date` bounds. ISO dates compare correctly as text.
#[derive(Debug, Clone, Default)]
pub struct DateFilter {
    pub since: Option<String>,
    pub until: Option<String>,
}

impl DateFilter {
    pub fn includes(&self, iso_date: &str) -> bool {
        if let Some(since) = &self.since {
            if iso_date < since.as_str() {
                return false;
            }
        }
        if let Some(until) = &self.until {
            if iso_date > until.as_str() {
                return false;
            }
        }
        true
    }
}

/// Finished output of one aggregation run.
#[derive(Debug, Clone, Default)]
pub struct UsageReport {
    pub daily: Vec<DailySummary>,
    pub sessions: Vec<SessionSummary>,
    pub weekly: Vec<WeeklySummary>,
    pub totals: SummaryTotals,
}

/// Accumulates events (behind a mutex while workers run) and folds them into
/// a [`UsageReport`] once the scan is complete.
#[derive(Debug, Default)]
pub struct SummaryBuilder {
    events: Vec<TokenUsageEvent>,
}

impl SummaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event(&mut self, event: TokenUsageEvent) {
        self.events.push(event);
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn finish(mut self, pricing: &PricingMap, filter: &DateFilter) -> UsageReport {
        // Workers emit in arbitrary order; ordering is re-established here.
        self.events.sort_by(|a, b| {
            (a.utc_seconds, &a.session_id, &a.model_name)
                .cmp(&(b.utc_seconds, &b.session_id, &b.model_name))
        });
        self.events.retain(|event| filter.includes(&event.local_iso_date));

        let mut daily: BTreeMap<String, DailySummary> = BTreeMap::new();
        let mut sessions: BTreeMap<String, SessionSummary> = BTreeMap::new();
        let mut weekly: BTreeMap<(i32, u32), WeeklySummary> = BTreeMap::new();

        for event in &self.events {
            let day = daily
                .entry(event.local_iso_date.clone())
                .or_insert_with(|| DailySummary {
                    iso_date: event.local_iso_date.clone(),
                    display_date: display_date(&event.local_iso_date),
                    usage: Default::default(),
                    display_input_tokens: 0,
                    cost_usd: 0.0,
                    models: BTreeMap::new(),
                    missing_pricing: BTreeSet::new(),
                });
            day.usage.accumulate(&event.usage);
            day.display_input_tokens = day
                .display_input_tokens
                .saturating_add(event.display_input_tokens);
            add_to_model(&mut day.models, event);

            let session = sessions
                .entry(event.session_id.clone())
                .or_insert_with(|| SessionSummary {
                    session_id: event.session_id.clone(),
                    first_seen_timestamp: event.timestamp.clone(),
                    last_seen_timestamp: event.timestamp.clone(),
                    first_seen_seconds: event.utc_seconds,
                    last_seen_seconds: event.utc_seconds,
                    usage: Default::default(),
                    display_input_tokens: 0,
                    cost_usd: 0.0,
                    model_breakdown: BTreeMap::new(),
                });
            session.usage.accumulate(&event.usage);
            session.display_input_tokens = session
                .display_input_tokens
                .saturating_add(event.display_input_tokens);
            if event.utc_seconds >= session.last_seen_seconds {
                session.last_seen_seconds = event.utc_seconds;
                session.last_seen_timestamp = event.timestamp.clone();
            }
            add_to_model(&mut session.model_breakdown, event);

            if let Some((iso_year, iso_week, start, end)) = iso_week_of(&event.local_iso_date) {
                let week = weekly
                    .entry((iso_year, iso_week))
                    .or_insert_with(|| WeeklySummary {
                        iso_year,
                        iso_week,
                        start_date: start,
                        end_date: end,
                        usage: Default::default(),
                        display_input_tokens: 0,
                        cost_usd: 0.0,
                        model_breakdown: BTreeMap::new(),
                        missing_pricing: BTreeSet::new(),
                    });
                week.usage.accumulate(&event.usage);
                week.display_input_tokens = week
                    .display_input_tokens
                    .saturating_add(event.display_input_tokens);
                add_to_model(&mut week.model_breakdown, event);
            }
        }

        let mut totals = SummaryTotals::default();
        let mut daily: Vec<DailySummary> = daily.into_values().collect();
        for day in &mut daily {
            let (cost, missing) = apply_pricing(&mut day.models, pricing);
            day.cost_usd = cost;
            day.missing_pricing = missing;
            totals.usage.accumulate(&day.usage);
            totals.display_input_tokens = totals
                .display_input_tokens
                .saturating_add(day.display_input_tokens);
            totals.cost_usd += day.cost_usd;
            totals
                .missing_pricing
                .extend(day.missing_pricing.iter().cloned());
        }

        let mut sessions: Vec<SessionSummary> = sessions.into_values().collect();
        for session in &mut sessions {
            let (cost, _missing) = apply_pricing(&mut session.model_breakdown, pricing);
            session.cost_usd = cost;
        }
        sessions.sort_by(|a, b| {
            (a.first_seen_seconds, &a.session_id).cmp(&(b.first_seen_seconds, &b.session_id))
        });

        let mut weekly: Vec<WeeklySummary> = weekly.into_values().collect();
        for week in &mut weekly {
            let (cost, missing) = apply_pricing(&mut week.model_breakdown, pricing);
            week.cost_usd = cost;
            week.missing_pricing = missing;
        }

        UsageReport {
            daily,
            sessions,
            weekly,
            totals,
        }
    }
}

fn add_to_model(models: &mut BTreeMap<String, ModelSummary>, event: &TokenUsageEvent) {
    let summary = models
        .entry(event.model_name.clone())
        .or_insert_with(|| ModelSummary::new(&event.model_name));
    summary.usage.accumulate(&event.usage);
    summary.display_input_tokens = summary
        .display_input_tokens
        .saturating_add(event.display_input_tokens);
    if event.is_fallback_model {
        summary.is_fallback = true;
    }
}

/// Price every model in a bucket; returns the bucket cost and the names with
/// no pricing entry.
fn apply_pricing(
    models: &mut BTreeMap<String, ModelSummary>,
    pricing: &PricingMap,
) -> (f64, BTreeSet<String>) {
    let mut total_cost = 0.0;
    let mut missing = BTreeSet::new();
    for summary in models.values_mut() {
        match pricing.lookup(&summary.name) {
            Some(entry) => {
                summary.cost_usd = entry.cost_usd(&summary.usage);
                summary.pricing_available = true;
                total_cost += summary.cost_usd;
            }
            None => {
                summary.cost_usd = 0.0;
                summary.pricing_available = false;
                missing.insert(summary.name.clone());
            }
        }
    }
    (total_cost, missing)
}

/// ISO year/week of a date plus the week's Monday and Sunday.
fn iso_week_of(iso_date: &str) -> Option<(i32, u32, String, String)> {
    let date = NaiveDate::parse_from_str(iso_date, "%Y-%m-%d").ok()?;
    let week = date.iso_week();
    let start = NaiveDate::from_isoywd_opt(week.year(), week.week(), Weekday::Mon)?;
    let end = start + chrono::Duration::days(6);
    Some((
        week.year(),
        week.week(),
        start.format("%Y-%m-%d").to_string(),
        end.format("%Y-%m-%d").to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PricingEntry, TokenUsage, TokenUsageEvent};
    use crate::timestamp::{iso_date_for_timezone, parse_iso8601_to_utc_seconds};

    fn event(timestamp: &str, session: &str, model: &str, usage: TokenUsage) -> TokenUsageEvent {
        let utc_seconds = parse_iso8601_to_utc_seconds(timestamp).unwrap();
        TokenUsageEvent {
            session_id: session.to_string(),
            timestamp: timestamp.to_string(),
            utc_seconds,
            local_iso_date: iso_date_for_timezone(utc_seconds, 0),
            model_name: model.to_string(),
            usage,
            is_fallback_model: false,
            display_input_tokens: usage.input_tokens
                + usage.cached_input_tokens
                + usage.cache_creation_input_tokens,
        }
    }

    fn usage(input: u64, output: u64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
            total_tokens: input + output,
            ..Default::default()
        }
    }

    fn gpt5_pricing() -> PricingMap {
        let mut pricing = PricingMap::new();
        pricing.insert(
            "gpt-5",
            PricingEntry {
                input_cost_per_million: 1.25,
                cache_creation_cost_per_million: 1.25,
                cached_input_cost_per_million: 0.125,
                output_cost_per_million: 10.0,
                reasoning_output_cost_per_million: None,
            },
        );
        pricing
    }

    #[test]
    fn daily_usage_equals_sum_of_model_usage() {
        let mut builder = SummaryBuilder::new();
        builder.add_event(event("2025-11-01T10:00:00Z", "s1", "gpt-5", usage(100, 10)));
        builder.add_event(event("2025-11-01T11:00:00Z", "s1", "claude-x", usage(200, 20)));
        builder.add_event(event("2025-11-01T12:00:00Z", "s2", "gpt-5", usage(300, 30)));

        let report = builder.finish(&gpt5_pricing(), &DateFilter::default());
        assert_eq!(report.daily.len(), 1);
        let day = &report.daily[0];

        let mut summed = TokenUsage::default();
        let mut display = 0u64;
        for model in day.models.values() {
            summed.accumulate(&model.usage);
            display += model.display_input_tokens;
        }
        assert_eq!(summed, day.usage);
        assert_eq!(display, day.display_input_tokens);
    }

    #[test]
    fn pricing_hit_and_miss_are_exclusive() {
        let mut builder = SummaryBuilder::new();
        builder.add_event(event(
            "2025-11-01T10:00:00Z",
            "s1",
            "gpt-5",
            usage(1_000_000, 0),
        ));
        let report = builder.finish(&gpt5_pricing(), &DateFilter::default());
        let day = &report.daily[0];
        assert_eq!(day.models["gpt-5"].cost_usd, 1.25);
        assert!(day.models["gpt-5"].pricing_available);
        assert!(day.missing_pricing.is_empty());
        assert!(report.totals.missing_pricing.is_empty());
        assert_eq!(report.totals.cost_usd, 1.25);

        // Same events against an empty map: cost zero, name recorded in the
        // day's and the global missing set.
        let mut builder = SummaryBuilder::new();
        builder.add_event(event(
            "2025-11-01T10:00:00Z",
            "s1",
            "gpt-5",
            usage(1_000_000, 0),
        ));
        let report = builder.finish(&PricingMap::new(), &DateFilter::default());
        let day = &report.daily[0];
        assert_eq!(day.models["gpt-5"].cost_usd, 0.0);
        assert!(!day.models["gpt-5"].pricing_available);
        assert!(day.missing_pricing.contains("gpt-5"));
        assert!(report.totals.missing_pricing.contains("gpt-5"));
    }

    #[test]
    fn date_filter_bounds_are_inclusive() {
        let mut builder = SummaryBuilder::new();
        builder.add_event(event("2025-10-31T10:00:00Z", "s", "m", usage(1, 0)));
        builder.add_event(event("2025-11-01T10:00:00Z", "s", "m", usage(2, 0)));
        builder.add_event(event("2025-11-02T10:00:00Z", "s", "m", usage(4, 0)));
        builder.add_event(event("2025-11-03T10:00:00Z", "s", "m", usage(8, 0)));

        let filter = DateFilter {
            since: Some("2025-11-01".to_string()),
            until: Some("2025-11-02".to_string()),
        };
        let report = builder.finish(&PricingMap::new(), &filter);
        assert_eq!(report.daily.len(), 2);
        assert_eq!(report.totals.usage.input_tokens, 6);
    }

    #[test]
    fn sessions_track_first_and_last_seen() {
        let mut builder = SummaryBuilder::new();
        builder.add_event(event("2025-11-01T12:00:00Z", "s1", "m", usage(1, 0)));
        builder.add_event(event("2025-11-01T09:00:00Z", "s1", "m", usage(1, 0)));
        builder.add_event(event("2025-11-02T08:00:00Z", "s1", "m", usage(1, 0)));

        let report = builder.finish(&PricingMap::new(), &DateFilter::default());
        let session = &report.sessions[0];
        assert_eq!(session.first_seen_timestamp, "2025-11-01T09:00:00Z");
        assert_eq!(session.last_seen_timestamp, "2025-11-02T08:00:00Z");
    }

    #[test]
    fn weeks_follow_iso_numbering() {
        let mut builder = SummaryBuilder::new();
        // 2024-12-30 is a Monday belonging to ISO week 1 of 2025.
        builder.add_event(event("2024-12-30T10:00:00Z", "s", "m", usage(1, 0)));
        builder.add_event(event("2025-01-05T10:00:00Z", "s", "m", usage(2, 0)));
        builder.add_event(event("2025-01-06T10:00:00Z", "s", "m", usage(4, 0)));

        let report = builder.finish(&PricingMap::new(), &DateFilter::default());
        assert_eq!(report.weekly.len(), 2);
        assert_eq!(report.weekly[0].iso_year, 2025);
        assert_eq!(report.weekly[0].iso_week, 1);
        assert_eq!(report.weekly[0].start_date, "2024-12-30");
        assert_eq!(report.weekly[0].end_date, "2025-01-05");
        assert_eq!(report.weekly[0].usage.input_tokens, 3);
        assert_eq!(report.weekly[1].iso_week, 2);
    }

    #[test]
    fn days_and_models_come_out_sorted() {
        let mut builder = SummaryBuilder::new();
        builder.add_event(event("2025-11-02T10:00:00Z", "s", "zeta", usage(1, 0)));
        builder.add_event(event("2025-11-01T10:00:00Z", "s", "alpha", usage(1, 0)));
        builder.add_event(event("2025-11-01T11:00:00Z", "s", "beta", usage(1, 0)));

        let report = builder.finish(&PricingMap::new(), &DateFilter::default());
        let dates: Vec<&str> = report.daily.iter().map(|d| d.iso_date.as_str()).collect();
        assert_eq!(dates, ["2025-11-01", "2025-11-02"]);
        let models: Vec<&String> = report.daily[0].models.keys().collect();
        assert_eq!(models, ["alpha", "beta"]);
    }
}
