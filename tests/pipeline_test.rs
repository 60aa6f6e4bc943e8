mod common;

use std::sync::Mutex;

use common::{collect_events, fake_home, write_session_file};
use tokenuze::aggregate::{DateFilter, SummaryBuilder};
use tokenuze::models::TokenUsage;
use tokenuze::pricing::PricingMap;
use tokenuze::providers::{claude, codex, EventConsumer, Provider, ScanOptions};

fn codex_million_input_fixture(home: &std::path::Path) {
    write_session_file(
        home,
        ".codex/sessions/big.jsonl",
        &[
            r#"{"timestamp":"2025-11-01T10:00:00Z","type":"turn_context","payload":{"model":"gpt-5"}}"#,
            r#"{"timestamp":"2025-11-01T10:01:00Z","type":"event_msg","payload":{"type":"token_count","info":{"last_token_usage":{"input_tokens":1000000,"output_tokens":0,"total_tokens":1000000}}}}"#,
        ]
        .join("\n"),
    );
}

#[test]
fn fallback_pricing_prices_exactly_and_absence_is_recorded() {
    let home = fake_home();
    codex_million_input_fixture(home.path());
    let events = collect_events(&codex::CONFIG, home.path(), 0);

    let mut pricing = PricingMap::new();
    Provider::new(&codex::CONFIG).load_pricing_data(&mut pricing);

    let mut builder = SummaryBuilder::new();
    for event in events.clone() {
        builder.add_event(event);
    }
    let report = builder.finish(&pricing, &DateFilter::default());
    assert_eq!(report.daily.len(), 1);
    assert_eq!(report.daily[0].models["gpt-5"].cost_usd, 1.25);
    assert_eq!(report.totals.cost_usd, 1.25);
    assert!(report.totals.missing_pricing.is_empty());

    // Remove the model from the map: cost collapses to zero and the name
    // lands in both missing-pricing sets.
    pricing.remove("gpt-5");
    let mut builder = SummaryBuilder::new();
    for event in events {
        builder.add_event(event);
    }
    let report = builder.finish(&pricing, &DateFilter::default());
    assert_eq!(report.daily[0].models["gpt-5"].cost_usd, 0.0);
    assert!(report.daily[0].missing_pricing.contains("gpt-5"));
    assert!(report.totals.missing_pricing.contains("gpt-5"));
    assert_eq!(report.totals.cost_usd, 0.0);
}

#[test]
fn tokyo_offset_buckets_late_evening_into_the_next_day() {
    let home = fake_home();
    write_session_file(
        home.path(),
        ".codex/sessions/late.jsonl",
        &[
            r#"{"timestamp":"2025-11-01T23:30:00Z","type":"turn_context","payload":{"model":"gpt-5"}}"#,
            r#"{"timestamp":"2025-11-01T23:30:00Z","type":"event_msg","payload":{"type":"token_count","info":{"last_token_usage":{"input_tokens":100,"output_tokens":10}}}}"#,
        ]
        .join("\n"),
    );

    let events = collect_events(&codex::CONFIG, home.path(), 540);
    let mut builder = SummaryBuilder::new();
    for event in events {
        builder.add_event(event);
    }
    let report = builder.finish(&PricingMap::new(), &DateFilter::default());
    assert_eq!(report.daily.len(), 1);
    assert_eq!(report.daily[0].iso_date, "2025-11-02");
    assert_eq!(report.daily[0].display_date, "Nov 2, 2025");
}

#[test]
fn mixed_providers_keep_the_model_sum_invariant() {
    let home = fake_home();
    write_session_file(
        home.path(),
        ".codex/sessions/a.jsonl",
        &[
            r#"{"timestamp":"2025-11-01T10:00:00Z","type":"turn_context","payload":{"model":"gpt-5-codex"}}"#,
            r#"{"timestamp":"2025-11-01T10:01:00Z","type":"event_msg","payload":{"type":"token_count","info":{"last_token_usage":{"input_tokens":1000,"cached_input_tokens":200,"output_tokens":50}}}}"#,
        ]
        .join("\n"),
    );
    write_session_file(
        home.path(),
        ".claude/projects/-p/s1.jsonl",
        r#"{"type":"assistant","sessionId":"s1","requestId":"r1","timestamp":"2025-11-01T11:00:00Z","message":{"id":"m1","model":"claude-sonnet-4-5","usage":{"input_tokens":400,"output_tokens":90,"cache_creation_input_tokens":80,"cache_read_input_tokens":1200}}}"#,
    );

    let options = ScanOptions {
        home: home.path().to_path_buf(),
        tz_offset_minutes: 0,
    };
    let builder = Mutex::new(SummaryBuilder::new());
    {
        let consumer = EventConsumer::new(|event| builder.lock().unwrap().add_event(event));
        for config in [&codex::CONFIG, &claude::CONFIG] {
            Provider::new(config)
                .stream_events(&options, &consumer)
                .unwrap();
        }
    }
    let report = builder
        .into_inner()
        .unwrap()
        .finish(&PricingMap::new(), &DateFilter::default());

    assert_eq!(report.daily.len(), 1);
    let day = &report.daily[0];
    assert_eq!(day.models.len(), 2);

    let mut summed = TokenUsage::default();
    let mut display = 0u64;
    for model in day.models.values() {
        summed.accumulate(&model.usage);
        display += model.display_input_tokens;
    }
    assert_eq!(summed, day.usage);
    assert_eq!(display, day.display_input_tokens);

    // One session per source file.
    assert_eq!(report.sessions.len(), 2);
    // Both events land in the same ISO week.
    assert_eq!(report.weekly.len(), 1);
    assert_eq!(report.weekly[0].usage, day.usage);
}

#[test]
fn provider_filtering_is_a_scan_level_concern() {
    let home = fake_home();
    codex_million_input_fixture(home.path());
    write_session_file(
        home.path(),
        ".claude/projects/-p/s1.jsonl",
        r#"{"type":"assistant","sessionId":"s1","requestId":"r1","timestamp":"2025-11-01T11:00:00Z","message":{"id":"m1","model":"claude-sonnet-4-5","usage":{"input_tokens":400,"output_tokens":90,"cache_creation_input_tokens":0,"cache_read_input_tokens":0}}}"#,
    );

    // Scanning only Codex must not see the Claude session.
    let events = collect_events(&codex::CONFIG, home.path(), 0);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].model_name, "gpt-5");
}
