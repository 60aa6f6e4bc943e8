use std::path::Path;
use std::sync::Mutex;

use tempfile::TempDir;
use tokenuze::models::TokenUsageEvent;
use tokenuze::providers::{EventConsumer, Provider, ProviderConfig, ScanOptions};

/// Temp directory standing in for `$HOME`; provider session roots are
/// created beneath it.
pub fn fake_home() -> TempDir {
    TempDir::new().expect("create temp home")
}

pub fn write_session_file(home: &Path, relative: &str, content: &str) {
    let path = home.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create session dirs");
    }
    std::fs::write(path, content).expect("write session file");
}

/// Scan one provider under the fake home and return its events in
/// deterministic order.
#[allow(dead_code)]
pub fn collect_events(
    config: &'static ProviderConfig,
    home: &Path,
    tz_offset_minutes: i32,
) -> Vec<TokenUsageEvent> {
    let provider = Provider::new(config);
    let options = ScanOptions {
        home: home.to_path_buf(),
        tz_offset_minutes,
    };
    let events = Mutex::new(Vec::new());
    {
        let consumer = EventConsumer::new(|event| {
            events.lock().expect("event sink poisoned").push(event)
        });
        provider
            .stream_events(&options, &consumer)
            .expect("provider scan");
    }
    let mut events = events.into_inner().expect("event sink poisoned");
    events.sort_by(|a, b| {
        (a.utc_seconds, &a.session_id, &a.model_name)
            .cmp(&(b.utc_seconds, &b.session_id, &b.model_name))
    });
    events
}
