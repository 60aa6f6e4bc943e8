//! Runtime configuration: CLI value parsing, environment accessors, and the
//! default timezone offset.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::providers::{self, ProviderConfig};

pub const DEFAULT_DASHBOARD_API_URL: &str = "http://localhost:8000";

/// Home directory the provider session roots resolve against. `HOME` wins so
/// tests and containers can redirect the scan.
pub fn home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
    dirs::home_dir().context("could not determine the home directory")
}

pub fn dashboard_api_url() -> String {
    std::env::var("DASHBOARD_API_URL")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_DASHBOARD_API_URL.to_string())
}

pub fn dashboard_api_key() -> Option<String> {
    std::env::var("DASHBOARD_API_KEY")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `--tz` value: `UTC` or `±HH[:MM]` (compact `±HHMM` also accepted).
pub fn parse_tz_offset(value: &str) -> Result<i32> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("utc") {
        return Ok(0);
    }
    let bytes = trimmed.as_bytes();
    let sign = match bytes.first() {
        Some(b'+') => 1,
        Some(b'-') => -1,
        _ => bail!("invalid timezone {trimmed:?}: expected UTC or ±HH[:MM]"),
    };
    let rest = &trimmed[1..];
    let (hours, minutes) = match rest.len() {
        2 => (rest.parse::<i32>().ok(), Some(0)),
        4 => (rest[..2].parse::<i32>().ok(), rest[2..].parse::<i32>().ok()),
        5 if rest.as_bytes()[2] == b':' => {
            (rest[..2].parse::<i32>().ok(), rest[3..].parse::<i32>().ok())
        }
        _ => (None, None),
    };
    match (hours, minutes) {
        (Some(hours), Some(minutes)) if (0..=23).contains(&hours) && (0..=59).contains(&minutes) => {
            Ok(sign * (hours * 60 + minutes))
        }
        _ => bail!("invalid timezone {trimmed:?}: expected UTC or ±HH[:MM]"),
    }
}

/// `--since`/`--until` value: `YYYYMMDD`, returned as `YYYY-MM-DD` so it
/// compares directly against event dates.
pub fn parse_compact_date(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.len() != 8 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        bail!("invalid date {trimmed:?}: expected YYYYMMDD");
    }
    let month: u32 = trimmed[4..6].parse().unwrap_or(0);
    let day: u32 = trimmed[6..8].parse().unwrap_or(0);
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        bail!("invalid date {trimmed:?}: expected YYYYMMDD");
    }
    Ok(format!(
        "{}-{}-{}",
        &trimmed[..4],
        &trimmed[4..6],
        &trimmed[6..8]
    ))
}

/// Host offset in minutes, probed once at startup. Honors `TZ` through the
/// platform's local-time handling.
pub fn detect_host_offset_minutes() -> i32 {
    use chrono::Offset;
    chrono::Local::now().offset().fix().local_minus_utc() / 60
}

/// `--agent` selection: empty means every provider; unknown names are a
/// usage error listing what exists.
pub fn select_providers(names: &[String]) -> Result<Vec<&'static ProviderConfig>> {
    if names.is_empty() {
        return Ok(providers::all().to_vec());
    }
    let mut selected = Vec::new();
    for name in names {
        match providers::by_name(name) {
            Some(config) if !selected.iter().any(|c: &&ProviderConfig| c.name == config.name) => {
                selected.push(config)
            }
            Some(_) => {}
            None => {
                let known: Vec<&str> = providers::all().iter().map(|c| c.name).collect();
                bail!(
                    "unknown provider {name:?}; expected one of: {}",
                    known.join(", ")
                );
            }
        }
    }
    Ok(selected)
}
