use std::process;
use std::sync::Mutex;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use tokenuze::aggregate::{DateFilter, SummaryBuilder};
use tokenuze::config;
use tokenuze::logging::init_logging;
use tokenuze::machine_id::machine_id;
use tokenuze::pricing::PricingMap;
use tokenuze::providers::{Provider, ScanOptions};
use tokenuze::render::{render_json, render_table, ReportView};
use tokenuze::upload;

#[derive(Parser)]
#[command(name = "tokenuze")]
#[command(version)]
#[command(about = "Aggregate token usage and spend across local coding-agent session logs")]
struct Cli {
    /// Inclusive start date (YYYYMMDD) on the local report date
    #[arg(long, value_name = "YYYYMMDD")]
    since: Option<String>,

    /// Inclusive end date (YYYYMMDD); must not precede --since
    #[arg(long, value_name = "YYYYMMDD")]
    until: Option<String>,

    /// Report timezone: UTC or ±HH[:MM]. Defaults to the host offset
    #[arg(long, value_name = "OFFSET")]
    tz: Option<String>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Restrict to a provider (repeatable): codex, claude, gemini, amp,
    /// opencode, crush, zed
    #[arg(long = "agent", value_name = "NAME")]
    agents: Vec<String>,

    /// Upload per-provider reports to the dashboard instead of rendering
    #[arg(long)]
    upload: bool,

    /// Per-session view
    #[arg(long)]
    sessions: bool,

    /// Per-ISO-week view
    #[arg(long)]
    weekly: bool,

    /// Emit JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Print the machine identifier and exit
    #[arg(long = "machine-id")]
    machine_id: bool,

    /// Skip the remote pricing manifest; price from built-in tables only
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() {
    init_logging();
    // clap's default exit code for bad usage is 2; this tool promises 1.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let code = if error.use_stderr() { 1 } else { 0 };
            let _ = error.print();
            process::exit(code);
        }
    };
    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(error) => {
            eprintln!("Error: {error:#}");
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let home = config::home_dir()?;

    if cli.machine_id {
        println!("{}", machine_id(&home));
        return Ok(0);
    }

    let filter = DateFilter {
        since: cli.since.as_deref().map(config::parse_compact_date).transpose()?,
        until: cli.until.as_deref().map(config::parse_compact_date).transpose()?,
    };
    if let (Some(since), Some(until)) = (&filter.since, &filter.until) {
        if until < since {
            anyhow::bail!("--until ({until}) must not precede --since ({since})");
        }
    }

    let tz_offset_minutes = match &cli.tz {
        Some(value) => config::parse_tz_offset(value)?,
        None => config::detect_host_offset_minutes(),
    };
    let selected = config::select_providers(&cli.agents)?;

    let mut pricing = PricingMap::new();
    if !cli.offline {
        if let Err(error) = pricing.fetch_remote().await {
            info!(error = %error, "remote pricing unavailable, falling back to built-in tables");
        }
    }
    for config in selected.iter().copied() {
        Provider::new(config).load_pricing_data(&mut pricing);
    }

    let options = ScanOptions {
        home,
        tz_offset_minutes,
    };

    if cli.upload {
        let Some(api_key) = config::dashboard_api_key() else {
            eprintln!(
                "DASHBOARD_API_KEY is not set. Export an API key for the dashboard \
                 (and optionally DASHBOARD_API_URL) before running --upload."
            );
            return Ok(1);
        };
        let payload = upload::UploadPayload {
            machine_id: machine_id(&options.home),
            timezone_offset_minutes: tz_offset_minutes,
            providers: upload::build_provider_uploads(&selected, &options, &pricing, &filter),
        };
        upload::send_report(&payload, &config::dashboard_api_url(), &api_key).await?;
        return Ok(0);
    }

    let builder = Mutex::new(SummaryBuilder::new());
    for config in selected.iter().copied() {
        let provider = Provider::new(config);
        if let Err(error) = provider.collect(&options, &builder) {
            warn!(provider = provider.name(), error = %error, "provider scan failed");
        }
    }
    let report = builder
        .into_inner()
        .expect("summary builder poisoned")
        .finish(&pricing, &filter);

    let view = if cli.sessions {
        ReportView::Sessions
    } else if cli.weekly {
        ReportView::Weekly
    } else {
        ReportView::Daily
    };

    if cli.json {
        println!("{}", render_json(&report, view, cli.pretty)?);
    } else {
        println!("{}", render_table(&report, view, tz_offset_minutes));
        if report.daily.is_empty() {
            println!("No usage data found for the selected providers.");
        }
    }
    Ok(0)
}
