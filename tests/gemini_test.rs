mod common;

use common::{collect_events, fake_home, write_session_file};
use tokenuze::providers::gemini;

#[test]
fn cumulative_message_totals_difference_into_deltas() {
    let home = fake_home();
    write_session_file(
        home.path(),
        ".gemini/tmp/3f9a/chat.json",
        r#"{
  "sessionId": "gem-session-1",
  "messages": [
    {"type":"gemini","model":"gemini-2.5-pro","timestamp":"2025-11-01T10:00:00Z",
     "tokens":{"input":60,"cached":0,"output":40,"tool":0,"thoughts":0,"total":100}},
    {"type":"gemini","timestamp":"2025-11-01T10:05:00Z",
     "tokens":{"input":210,"cached":20,"output":120,"tool":20,"thoughts":10,"total":350}},
    {"type":"gemini","timestamp":"2025-11-01T10:10:00Z",
     "tokens":{"input":500,"cached":60,"output":260,"tool":40,"thoughts":30,"total":800}}
  ]
}"#,
    );

    let events = collect_events(&gemini::CONFIG, home.path(), 0);
    assert_eq!(events.len(), 3);

    let delta_total: u64 = events.iter().map(|e| e.usage.total_tokens).sum();
    assert_eq!(delta_total, 800);
    let delta_input: u64 = events.iter().map(|e| e.usage.input_tokens).sum();
    assert_eq!(delta_input, 500);

    // The model from the first message carries across the rest.
    assert!(events.iter().all(|e| e.model_name == "gemini-2.5-pro"));
    assert!(events.iter().all(|e| !e.is_fallback_model));
    assert!(events.iter().all(|e| e.session_id == "gem-session-1"));

    // tool output folds into output, thoughts into reasoning.
    assert_eq!(events[1].usage.output_tokens, 100);
    assert_eq!(events[1].usage.reasoning_output_tokens, 10);
    assert_eq!(events[1].usage.cached_input_tokens, 20);
}

#[test]
fn messages_without_tokens_are_skipped() {
    let home = fake_home();
    write_session_file(
        home.path(),
        ".gemini/tmp/3f9a/chat.json",
        r#"{
  "messages": [
    {"type":"user","content":"hello"},
    {"type":"gemini","model":"gemini-2.5-flash","timestamp":"2025-11-01T10:00:00Z",
     "tokens":{"input":100,"output":50,"total":150}}
  ]
}"#,
    );

    let events = collect_events(&gemini::CONFIG, home.path(), 0);
    assert_eq!(events.len(), 1);
    // No sessionId in the document: the filename stem stands in.
    assert_eq!(events[0].session_id, "chat");
}

#[test]
fn duplicate_snapshots_emit_nothing_new() {
    // A repeated cumulative snapshot has a zero delta and is dropped.
    let home = fake_home();
    write_session_file(
        home.path(),
        ".gemini/tmp/3f9a/chat.json",
        r#"{
  "messages": [
    {"type":"gemini","model":"gemini-2.5-pro","timestamp":"2025-11-01T10:00:00Z",
     "tokens":{"input":100,"output":50,"total":150}},
    {"type":"gemini","timestamp":"2025-11-01T10:00:00Z",
     "tokens":{"input":100,"output":50,"total":150}}
  ]
}"#,
    );

    let events = collect_events(&gemini::CONFIG, home.path(), 0);
    assert_eq!(events.len(), 1);
}
