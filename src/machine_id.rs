//! Stable per-machine identifier.
//!
//! The strongest available hardware source wins: platform UUID on macOS,
//! `/etc/machine-id` on Linux, then the primary MAC address, then a
//! `hostname:user` pair. The source value and its label are hashed together
//! so two sources that happen to produce the same text still yield distinct
//! ids. The result is cached under `~/.ccusage/machine_id` and any cached
//! 16-byte value is trusted on later runs.

use std::path::{Path, PathBuf};
use std::process::Command;

use sha2::{Digest, Sha256};
use tracing::debug;

const MACHINE_ID_LEN: usize = 16;

/// Cached or freshly derived machine id: 16 lowercase hex characters.
pub fn machine_id(home: &Path) -> String {
    let cache_path = cache_file(home);
    if let Some(cached) = read_cached(&cache_path) {
        return cached;
    }

    let (unique, source_label) = unique_identifier();
    let id = derive_id(&unique, source_label);
    debug!(source = source_label, "derived machine id");

    if let Some(parent) = cache_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(error) = std::fs::write(&cache_path, &id) {
        debug!(path = %cache_path.display(), error = %error, "failed to cache machine id");
    }
    id
}

pub fn cache_file(home: &Path) -> PathBuf {
    home.join(".ccusage").join("machine_id")
}

fn read_cached(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let trimmed = content.trim();
    if trimmed.len() == MACHINE_ID_LEN {
        Some(trimmed.to_string())
    } else {
        None
    }
}

fn derive_id(unique: &str, source_label: &str) -> String {
    let payload = format!("{unique}:{source_label}");
    let digest = Sha256::digest(payload.as_bytes());
    hex::encode(digest)[..MACHINE_ID_LEN].to_string()
}

fn unique_identifier() -> (String, &'static str) {
    if let Some(uuid) = hardware_uuid() {
        return (uuid, "hardware_uuid");
    }
    if let Some(id) = os_machine_id() {
        return (id, "machine_id");
    }
    if let Some(mac) = primary_mac_address() {
        return (mac, "mac_address");
    }
    (hostname_user(), "hostname_user")
}

#[cfg(target_os = "macos")]
fn hardware_uuid() -> Option<String> {
    let output = Command::new("ioreg")
        .args(["-rd1", "-c", "IOPlatformExpertDevice"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_ioreg_uuid(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(not(target_os = "macos"))]
fn hardware_uuid() -> Option<String> {
    None
}

#[allow(dead_code)]
fn parse_ioreg_uuid(output: &str) -> Option<String> {
    let line = output.lines().find(|line| line.contains("IOPlatformUUID"))?;
    let start = line.find('=')? + 1;
    let quoted = line[start..].trim().trim_matches('"');
    if quoted.is_empty() {
        None
    } else {
        Some(quoted.to_string())
    }
}

fn os_machine_id() -> Option<String> {
    for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
        if let Ok(content) = std::fs::read_to_string(path) {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

#[cfg(target_os = "macos")]
fn primary_mac_address() -> Option<String> {
    let output = Command::new("ifconfig").arg("en0").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_mac_after(&stdout, "ether ")
}

#[cfg(not(target_os = "macos"))]
fn primary_mac_address() -> Option<String> {
    let output = Command::new("ip").args(["link", "show"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_mac_after(&stdout, "link/ether ")
}

fn parse_mac_after(output: &str, marker: &str) -> Option<String> {
    for line in output.lines() {
        if let Some(idx) = line.find(marker) {
            let rest = &line[idx + marker.len()..];
            let mac = rest.split_whitespace().next().unwrap_or("");
            // All-zero addresses show up on loopback and tunnels.
            if !mac.is_empty() && mac != "00:00:00:00:00:00" {
                return Some(mac.to_ascii_lowercase());
            }
        }
    }
    None
}

fn hostname_user() -> String {
    let hostname = std::env::var("HOSTNAME")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| {
            std::env::var("COMPUTERNAME")
                .ok()
                .filter(|v| !v.trim().is_empty())
        })
        .or_else(|| {
            Command::new("hostname").output().ok().and_then(|output| {
                let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if name.is_empty() {
                    None
                } else {
                    Some(name)
                }
            })
        })
        .unwrap_or_else(|| "unknown-host".to_string());
    let user = std::env::var("USER")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| {
            std::env::var("USERNAME")
                .ok()
                .filter(|v| !v.trim().is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string());
    format!("{hostname}:{user}")
}
