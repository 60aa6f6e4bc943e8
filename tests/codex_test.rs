mod common;

use common::{collect_events, fake_home, write_session_file};
use tokenuze::providers::codex;

#[test]
fn last_token_usage_becomes_one_normalized_event() {
    let home = fake_home();
    write_session_file(
        home.path(),
        ".codex/sessions/2025/11/rollout-abc.jsonl",
        &[
            r#"{"timestamp":"2025-11-01T09:59:00Z","type":"turn_context","payload":{"model":"gpt-5-codex"}}"#,
            r#"{"timestamp":"2025-11-01T10:00:00Z","type":"event_msg","payload":{"type":"token_count","info":{"last_token_usage":{"input_tokens":1000,"cached_input_tokens":200,"output_tokens":50}}}}"#,
        ]
        .join("\n"),
    );

    let events = collect_events(&codex::CONFIG, home.path(), 0);
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.model_name, "gpt-5-codex");
    assert!(!event.is_fallback_model);
    assert_eq!(event.session_id, "rollout-abc");
    assert_eq!(event.local_iso_date, "2025-11-01");
    // Raw input folds the cached share; the normalized counter excludes it
    // while the display input keeps the raw figure.
    assert_eq!(event.usage.input_tokens, 800);
    assert_eq!(event.usage.cached_input_tokens, 200);
    assert_eq!(event.usage.output_tokens, 50);
    assert_eq!(event.display_input_tokens, 1000);
}

#[test]
fn cumulative_totals_are_differenced() {
    let home = fake_home();
    write_session_file(
        home.path(),
        ".codex/sessions/rollout-cumulative.jsonl",
        &[
            r#"{"timestamp":"2025-11-01T10:00:00Z","type":"turn_context","payload":{"model":"gpt-5"}}"#,
            r#"{"timestamp":"2025-11-01T10:05:00Z","type":"event_msg","payload":{"type":"token_count","info":{"total_token_usage":{"input_tokens":1200,"cached_input_tokens":200,"output_tokens":500,"total_tokens":1700}}}}"#,
            r#"{"timestamp":"2025-11-01T10:10:00Z","type":"event_msg","payload":{"type":"token_count","info":{"total_token_usage":{"input_tokens":2000,"cached_input_tokens":300,"output_tokens":800,"total_tokens":2800}}}}"#,
        ]
        .join("\n"),
    );

    let events = collect_events(&codex::CONFIG, home.path(), 0);
    assert_eq!(events.len(), 2);
    // First snapshot is its own delta: 1200 raw input, 200 cached.
    assert_eq!(events[0].usage.input_tokens, 1000);
    assert_eq!(events[0].display_input_tokens, 1200);
    // Second event is the difference of the two cumulatives.
    assert_eq!(events[1].usage.input_tokens, 700);
    assert_eq!(events[1].usage.cached_input_tokens, 100);
    assert_eq!(events[1].usage.output_tokens, 300);
    assert_eq!(events[1].display_input_tokens, 800);

    let total_display: u64 = events.iter().map(|e| e.display_input_tokens).sum();
    assert_eq!(total_display, 2000);
}

#[test]
fn last_usage_wins_but_totals_still_update_the_cumulative() {
    let home = fake_home();
    write_session_file(
        home.path(),
        ".codex/sessions/rollout-mixed.jsonl",
        &[
            r#"{"timestamp":"2025-11-01T10:00:00Z","type":"turn_context","payload":{"model":"gpt-5"}}"#,
            r#"{"timestamp":"2025-11-01T10:05:00Z","type":"event_msg","payload":{"type":"token_count","info":{"last_token_usage":{"input_tokens":1200,"cached_input_tokens":200,"output_tokens":500,"total_tokens":1700},"total_token_usage":{"input_tokens":1200,"cached_input_tokens":200,"output_tokens":500,"total_tokens":1700}}}}"#,
            r#"{"timestamp":"2025-11-01T10:10:00Z","type":"event_msg","payload":{"type":"token_count","info":{"total_token_usage":{"input_tokens":2000,"cached_input_tokens":300,"output_tokens":800,"total_tokens":2800}}}}"#,
        ]
        .join("\n"),
    );

    let events = collect_events(&codex::CONFIG, home.path(), 0);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].display_input_tokens, 1200);
    // Had the cumulative not been remembered from the first record, this
    // delta would be the full 2000.
    assert_eq!(events[1].display_input_tokens, 800);
}

#[test]
fn missing_model_context_falls_back_to_gpt5() {
    let home = fake_home();
    write_session_file(
        home.path(),
        ".codex/sessions/legacy.jsonl",
        r#"{"timestamp":"2025-09-15T13:00:00Z","type":"event_msg","payload":{"type":"token_count","info":{"total_token_usage":{"input_tokens":5000,"cached_input_tokens":0,"output_tokens":1000,"total_tokens":6000}}}}"#,
    );

    let events = collect_events(&codex::CONFIG, home.path(), 0);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].model_name, "gpt-5");
    assert!(events[0].is_fallback_model);
}

#[test]
fn shrinking_cumulative_clamps_to_a_dropped_event() {
    let home = fake_home();
    write_session_file(
        home.path(),
        ".codex/sessions/rewritten.jsonl",
        &[
            r#"{"timestamp":"2025-11-01T10:00:00Z","type":"turn_context","payload":{"model":"gpt-5"}}"#,
            r#"{"timestamp":"2025-11-01T10:05:00Z","type":"event_msg","payload":{"type":"token_count","info":{"total_token_usage":{"input_tokens":1000,"output_tokens":500,"total_tokens":1500}}}}"#,
            r#"{"timestamp":"2025-11-01T10:10:00Z","type":"event_msg","payload":{"type":"token_count","info":{"total_token_usage":{"input_tokens":900,"output_tokens":400,"total_tokens":1300}}}}"#,
        ]
        .join("\n"),
    );

    let events = collect_events(&codex::CONFIG, home.path(), 0);
    // The rewound snapshot produces an all-zero delta, which is dropped.
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].usage.input_tokens, 1000);
}

#[test]
fn malformed_lines_do_not_abort_the_file() {
    let home = fake_home();
    write_session_file(
        home.path(),
        ".codex/sessions/noisy.jsonl",
        &[
            r#"{"timestamp":"2025-11-01T10:00:00Z","type":"turn_context","payload":{"model":"gpt-5"}}"#,
            "{not json at all",
            r#"{"timestamp":"2025-11-01T10:05:00Z","type":"event_msg","payload":{"type":"token_count","info":{"last_token_usage":{"input_tokens":100,"output_tokens":10}}}}"#,
        ]
        .join("\n"),
    );

    let events = collect_events(&codex::CONFIG, home.path(), 0);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].usage.input_tokens, 100);
}
