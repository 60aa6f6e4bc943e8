//! Dashboard uploader: rebuilds the aggregation per provider so the payload
//! carries isolated daily / session / weekly reports, then POSTs them with
//! the pre-shared API key.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregate::{DateFilter, SummaryBuilder};
use crate::pricing::PricingMap;
use crate::providers::{EventConsumer, Provider, ProviderConfig, ScanOptions};
use crate::render::{
    daily_report_json, sessions_report_json, weekly_report_json, DailyReportJson,
    SessionsReportJson, WeeklyReportJson,
};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
pub struct ProviderUpload {
    pub name: String,
    #[serde(rename = "daily_summary_json")]
    pub daily_summary: DailyReportJson,
    #[serde(rename = "sessions_summary_json")]
    pub sessions_summary: SessionsReportJson,
    #[serde(rename = "weekly_summary_json")]
    pub weekly_summary: WeeklyReportJson,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadPayload {
    pub machine_id: String,
    pub timezone_offset_minutes: i32,
    pub providers: Vec<ProviderUpload>,
}

/// Run the pipeline once per provider. Scan failures degrade to an empty
/// report for that provider rather than aborting the upload.
pub fn build_provider_uploads(
    providers: &[&'static ProviderConfig],
    options: &ScanOptions,
    pricing: &PricingMap,
    filter: &DateFilter,
) -> Vec<ProviderUpload> {
    providers
        .iter()
        .copied()
        .map(|config| {
            let provider = Provider::new(config);
            let builder = Mutex::new(SummaryBuilder::new());
            {
                let consumer = EventConsumer::new(|event| {
                    builder.lock().expect("summary builder poisoned").add_event(event)
                });
                if let Err(error) = provider.stream_events(options, &consumer) {
                    warn!(provider = provider.name(), error = %error, "provider scan failed");
                }
            }
            let report = builder
                .into_inner()
                .expect("summary builder poisoned")
                .finish(pricing, filter);
            debug!(
                provider = provider.name(),
                days = report.daily.len(),
                sessions = report.sessions.len(),
                "provider report assembled"
            );
            ProviderUpload {
                name: config.name.to_string(),
                daily_summary: daily_report_json(&report),
                sessions_summary: sessions_report_json(&report),
                weekly_summary: weekly_report_json(&report),
            }
        })
        .collect()
}

/// POST the payload. Transport failures are printed, never propagated: the
/// caller's exit code stays zero once the API key existed.
pub async fn send_report(payload: &UploadPayload, api_url: &str, api_key: &str) -> Result<()> {
    let endpoint = format!("{}/api/usage/report", api_url.trim_end_matches('/'));

    let response = match post_report(payload, &endpoint, api_key, true).await {
        Ok(response) => Ok(response),
        Err(error) if is_invalid_cname_error(&error) => {
            // Some resolvers serve CNAME records the internal resolver
            // rejects; the libc resolver copes, so retry once through it.
            warn!(error = %error, "DNS lookup failed, retrying with the system resolver");
            post_report(payload, &endpoint, api_key, false).await
        }
        Err(error) => Err(error),
    };

    match response {
        Ok(response) => report_status(response.status()),
        Err(error) => eprintln!("Upload failed: {error:#}"),
    }
    Ok(())
}

async fn post_report(
    payload: &UploadPayload,
    endpoint: &str,
    api_key: &str,
    internal_resolver: bool,
) -> Result<reqwest::Response> {
    let client = reqwest::Client::builder()
        .timeout(UPLOAD_TIMEOUT)
        .hickory_dns(internal_resolver)
        .build()
        .context("failed to build upload HTTP client")?;
    client
        .post(endpoint)
        .header("X-API-Key", api_key)
        .json(payload)
        .send()
        .await
        .context("failed to reach the dashboard API")
}

fn report_status(status: reqwest::StatusCode) {
    match status.as_u16() {
        200 => println!("Upload succeeded"),
        401 => eprintln!("Authentication failed"),
        422 => eprintln!("Data validation error"),
        code if (500..600).contains(&code) => eprintln!("Server error"),
        code => eprintln!("Failed (HTTP {code})"),
    }
}

fn is_invalid_cname_error(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| cause.to_string().to_ascii_lowercase().contains("cname"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers;

    #[test]
    fn cname_errors_are_detected_in_the_chain() {
        let root = anyhow::anyhow!("invalid CNAME record");
        let wrapped = root.context("failed to reach the dashboard API");
        assert!(is_invalid_cname_error(&wrapped));
        assert!(!is_invalid_cname_error(&anyhow::anyhow!("timed out")));
    }

    #[test]
    fn uploads_cover_every_selected_provider() {
        let home = tempfile::tempdir().unwrap();
        let options = ScanOptions {
            home: home.path().to_path_buf(),
            tz_offset_minutes: 0,
        };
        let uploads = build_provider_uploads(
            providers::all(),
            &options,
            &PricingMap::new(),
            &DateFilter::default(),
        );
        assert_eq!(uploads.len(), providers::all().len());
        assert!(uploads.iter().all(|u| u.daily_summary.daily.is_empty()));
    }

    #[test]
    fn payload_serializes_with_expected_keys() {
        let home = tempfile::tempdir().unwrap();
        let options = ScanOptions {
            home: home.path().to_path_buf(),
            tz_offset_minutes: 540,
        };
        let payload = UploadPayload {
            machine_id: "0123456789abcdef".to_string(),
            timezone_offset_minutes: 540,
            providers: build_provider_uploads(
                providers::all(),
                &options,
                &PricingMap::new(),
                &DateFilter::default(),
            ),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["machine_id"], "0123456789abcdef");
        assert_eq!(json["timezone_offset_minutes"], 540);

        // The dashboard contract names the per-provider report keys with a
        // _json suffix; the Rust field names do not serialize as-is.
        let provider = &json["providers"][0];
        assert!(provider["name"].is_string());
        assert!(provider["daily_summary_json"]["daily"].is_array());
        assert!(provider["daily_summary_json"]["totals"].is_object());
        assert!(provider["sessions_summary_json"]["sessions"].is_array());
        assert!(provider["weekly_summary_json"]["weekly"].is_array());
        assert!(provider.get("daily_summary").is_none());
        assert!(provider.get("sessions_summary").is_none());
        assert!(provider.get("weekly_summary").is_none());
    }
}
