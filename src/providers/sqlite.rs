//! Shared access to provider SQLite databases through the `sqlite3` CLI.
//!
//! The contract is the returned JSON row array, not the subprocess: swapping
//! in an in-process SQLite library would only change this module.

use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use serde_json::Value;

/// Subprocess stdout larger than this aborts the query instead of feeding an
/// unbounded buffer into the JSON parser.
pub const MAX_SUBPROCESS_OUTPUT_BYTES: usize = 64 * 1024 * 1024;

/// Whether the `sqlite3` binary is runnable at all. Checked once per scan so
/// a missing binary downgrades the provider to an info-level skip.
pub fn cli_available() -> bool {
    Command::new("sqlite3")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Run a read-only query and return its `-json` row array. Empty output is
/// an empty row set (sqlite3 prints nothing for zero rows).
pub fn query_json(db: &Path, sql: &str) -> Result<Vec<Value>> {
    let output = Command::new("sqlite3")
        .arg("-readonly")
        .arg("-json")
        .arg(db)
        .arg(sql)
        .output()
        .with_context(|| format!("spawn sqlite3 for {}", db.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "sqlite3 failed on {} ({}): {}",
            db.display(),
            output.status,
            stderr.trim()
        );
    }
    if output.stdout.len() > MAX_SUBPROCESS_OUTPUT_BYTES {
        bail!(
            "sqlite3 output for {} exceeds {} bytes",
            db.display(),
            MAX_SUBPROCESS_OUTPUT_BYTES
        );
    }
    if output.stdout.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&output.stdout)
        .with_context(|| format!("parse sqlite3 JSON output for {}", db.display()))
}
