//! Output rendering: the dashboard-compatible JSON shapes (also reused by
//! the uploader) and the bordered terminal tables.

use std::collections::BTreeMap;

use anyhow::Result;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, CellAlignment, Table};
use serde::Serialize;

use crate::aggregate::UsageReport;
use crate::models::{ModelSummary, SummaryTotals, TokenUsage};
use crate::timestamp::format_timezone_label;

/// Which aggregation a render pass shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportView {
    Daily,
    Sessions,
    Weekly,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenBlockJson {
    #[serde(rename = "inputTokens")]
    pub input_tokens: u64,
    #[serde(rename = "cacheCreationTokens")]
    pub cache_creation_tokens: u64,
    #[serde(rename = "cachedInputTokens")]
    pub cached_input_tokens: u64,
    #[serde(rename = "outputTokens")]
    pub output_tokens: u64,
    #[serde(rename = "reasoningOutputTokens")]
    pub reasoning_output_tokens: u64,
    #[serde(rename = "totalTokens")]
    pub total_tokens: u64,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
}

impl TokenBlockJson {
    fn new(usage: &TokenUsage, display_input_tokens: u64, cost_usd: f64) -> Self {
        Self {
            input_tokens: display_input_tokens,
            cache_creation_tokens: usage.cache_creation_input_tokens,
            cached_input_tokens: usage.cached_input_tokens,
            output_tokens: usage.output_tokens,
            reasoning_output_tokens: usage.reasoning_output_tokens,
            total_tokens: usage.total_tokens,
            cost_usd,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelJson {
    #[serde(flatten)]
    pub tokens: TokenBlockJson,
    #[serde(rename = "pricingAvailable")]
    pub pricing_available: bool,
    #[serde(rename = "isFallback")]
    pub is_fallback: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyJson {
    pub date: String,
    #[serde(rename = "isoDate")]
    pub iso_date: String,
    #[serde(flatten)]
    pub tokens: TokenBlockJson,
    pub models: BTreeMap<String, ModelJson>,
    #[serde(rename = "missingPricing")]
    pub missing_pricing: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TotalsJson {
    #[serde(flatten)]
    pub tokens: TokenBlockJson,
    #[serde(rename = "missingPricing")]
    pub missing_pricing: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyReportJson {
    pub daily: Vec<DailyJson>,
    pub totals: TotalsJson,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionJson {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "firstSeen")]
    pub first_seen: String,
    #[serde(rename = "lastSeen")]
    pub last_seen: String,
    #[serde(flatten)]
    pub tokens: TokenBlockJson,
    pub models: BTreeMap<String, ModelJson>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionsReportJson {
    pub sessions: Vec<SessionJson>,
    pub totals: TotalsJson,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeekJson {
    #[serde(rename = "isoYear")]
    pub iso_year: i32,
    #[serde(rename = "isoWeek")]
    pub iso_week: u32,
    #[serde(rename = "startDate")]
    pub start_date: String,
    #[serde(rename = "endDate")]
    pub end_date: String,
    #[serde(flatten)]
    pub tokens: TokenBlockJson,
    pub models: BTreeMap<String, ModelJson>,
    #[serde(rename = "missingPricing")]
    pub missing_pricing: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyReportJson {
    pub weekly: Vec<WeekJson>,
    pub totals: TotalsJson,
}

fn models_json(models: &BTreeMap<String, ModelSummary>) -> BTreeMap<String, ModelJson> {
    models
        .iter()
        .map(|(name, summary)| {
            (
                name.clone(),
                ModelJson {
                    tokens: TokenBlockJson::new(
                        &summary.usage,
                        summary.display_input_tokens,
                        summary.cost_usd,
                    ),
                    pricing_available: summary.pricing_available,
                    is_fallback: summary.is_fallback,
                },
            )
        })
        .collect()
}

fn totals_json(totals: &SummaryTotals) -> TotalsJson {
    TotalsJson {
        tokens: TokenBlockJson::new(&totals.usage, totals.display_input_tokens, totals.cost_usd),
        missing_pricing: totals.missing_pricing.iter().cloned().collect(),
    }
}

pub fn daily_report_json(report: &UsageReport) -> DailyReportJson {
    DailyReportJson {
        daily: report
            .daily
            .iter()
            .map(|day| DailyJson {
                date: day.display_date.clone(),
                iso_date: day.iso_date.clone(),
                tokens: TokenBlockJson::new(&day.usage, day.display_input_tokens, day.cost_usd),
                models: models_json(&day.models),
                missing_pricing: day.missing_pricing.iter().cloned().collect(),
            })
            .collect(),
        totals: totals_json(&report.totals),
    }
}

pub fn sessions_report_json(report: &UsageReport) -> SessionsReportJson {
    SessionsReportJson {
        sessions: report
            .sessions
            .iter()
            .map(|session| SessionJson {
                session_id: session.session_id.clone(),
                first_seen: session.first_seen_timestamp.clone(),
                last_seen: session.last_seen_timestamp.clone(),
                tokens: TokenBlockJson::new(
                    &session.usage,
                    session.display_input_tokens,
                    session.cost_usd,
                ),
                models: models_json(&session.model_breakdown),
            })
            .collect(),
        totals: totals_json(&report.totals),
    }
}

pub fn weekly_report_json(report: &UsageReport) -> WeeklyReportJson {
    WeeklyReportJson {
        weekly: report
            .weekly
            .iter()
            .map(|week| WeekJson {
                iso_year: week.iso_year,
                iso_week: week.iso_week,
                start_date: week.start_date.clone(),
                end_date: week.end_date.clone(),
                tokens: TokenBlockJson::new(&week.usage, week.display_input_tokens, week.cost_usd),
                models: models_json(&week.model_breakdown),
                missing_pricing: week.missing_pricing.iter().cloned().collect(),
            })
            .collect(),
        totals: totals_json(&report.totals),
    }
}

pub fn render_json(report: &UsageReport, view: ReportView, pretty: bool) -> Result<String> {
    let rendered = match view {
        ReportView::Daily => {
            let payload = daily_report_json(report);
            if pretty {
                serde_json::to_string_pretty(&payload)?
            } else {
                serde_json::to_string(&payload)?
            }
        }
        ReportView::Sessions => {
            let payload = sessions_report_json(report);
            if pretty {
                serde_json::to_string_pretty(&payload)?
            } else {
                serde_json::to_string(&payload)?
            }
        }
        ReportView::Weekly => {
            let payload = weekly_report_json(report);
            if pretty {
                serde_json::to_string_pretty(&payload)?
            } else {
                serde_json::to_string(&payload)?
            }
        }
    };
    Ok(rendered)
}

/// Insert thousand separators into a digit string; non-digit input is
/// returned unchanged.
pub fn format_digits_with_commas(digits: &str) -> String {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return digits.to_string();
    }
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let offset = digits.len() % 3;
    for (i, c) in digits.chars().enumerate() {
        if i != 0 && (i + 3 - offset) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn commas(value: u64) -> String {
    format_digits_with_commas(&value.to_string())
}

fn number_cell(value: u64) -> Cell {
    Cell::new(commas(value)).set_alignment(CellAlignment::Right)
}

fn cost_cell(value: f64) -> Cell {
    Cell::new(format!("${value:.2}")).set_alignment(CellAlignment::Right)
}

pub fn render_table(report: &UsageReport, view: ReportView, tz_offset_minutes: i32) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);

    match view {
        ReportView::Daily => {
            table.set_header(vec![
                format!("Date ({})", format_timezone_label(tz_offset_minutes)),
                "Models".to_string(),
                "Input".to_string(),
                "Output".to_string(),
                "Cache Create".to_string(),
                "Cache Read".to_string(),
                "Reasoning".to_string(),
                "Total".to_string(),
                "Cost (USD)".to_string(),
            ]);
            for day in &report.daily {
                table.add_row(vec![
                    Cell::new(&day.display_date),
                    Cell::new(model_lines(&day.models)),
                    number_cell(day.display_input_tokens),
                    number_cell(day.usage.output_tokens),
                    number_cell(day.usage.cache_creation_input_tokens),
                    number_cell(day.usage.cached_input_tokens),
                    number_cell(day.usage.reasoning_output_tokens),
                    number_cell(day.usage.total_tokens),
                    cost_cell(day.cost_usd),
                ]);
            }
            add_totals_row(&mut table, "Total", 1, &report.totals);
        }
        ReportView::Sessions => {
            table.set_header(vec![
                "Session".to_string(),
                "First Seen".to_string(),
                "Last Seen".to_string(),
                "Models".to_string(),
                "Input".to_string(),
                "Output".to_string(),
                "Total".to_string(),
                "Cost (USD)".to_string(),
            ]);
            for session in &report.sessions {
                table.add_row(vec![
                    Cell::new(&session.session_id),
                    Cell::new(&session.first_seen_timestamp),
                    Cell::new(&session.last_seen_timestamp),
                    Cell::new(model_lines(&session.model_breakdown)),
                    number_cell(session.display_input_tokens),
                    number_cell(session.usage.output_tokens),
                    number_cell(session.usage.total_tokens),
                    cost_cell(session.cost_usd),
                ]);
            }
        }
        ReportView::Weekly => {
            table.set_header(vec![
                "Week".to_string(),
                "From".to_string(),
                "To".to_string(),
                "Input".to_string(),
                "Output".to_string(),
                "Total".to_string(),
                "Cost (USD)".to_string(),
            ]);
            for week in &report.weekly {
                table.add_row(vec![
                    Cell::new(format!("{}-W{:02}", week.iso_year, week.iso_week)),
                    Cell::new(&week.start_date),
                    Cell::new(&week.end_date),
                    number_cell(week.display_input_tokens),
                    number_cell(week.usage.output_tokens),
                    number_cell(week.usage.total_tokens),
                    cost_cell(week.cost_usd),
                ]);
            }
            add_totals_row(&mut table, "Total", 2, &report.totals);
        }
    }

    let mut rendered = table.to_string();
    if !report.totals.missing_pricing.is_empty() {
        let names: Vec<&str> = report
            .totals
            .missing_pricing
            .iter()
            .map(String::as_str)
            .collect();
        rendered.push_str(&format!("\nNo pricing for: {}\n", names.join(", ")));
    }
    rendered
}

fn add_totals_row(table: &mut Table, label: &str, pad_cells: usize, totals: &SummaryTotals) {
    let mut row: Vec<Cell> = vec![Cell::new(label)];
    for _ in 0..pad_cells {
        row.push(Cell::new(""));
    }
    if pad_cells == 1 {
        row.extend([
            number_cell(totals.display_input_tokens),
            number_cell(totals.usage.output_tokens),
            number_cell(totals.usage.cache_creation_input_tokens),
            number_cell(totals.usage.cached_input_tokens),
            number_cell(totals.usage.reasoning_output_tokens),
            number_cell(totals.usage.total_tokens),
            cost_cell(totals.cost_usd),
        ]);
    } else {
        row.extend([
            number_cell(totals.display_input_tokens),
            number_cell(totals.usage.output_tokens),
            number_cell(totals.usage.total_tokens),
            cost_cell(totals.cost_usd),
        ]);
    }
    table.add_row(row);
}

fn model_lines(models: &BTreeMap<String, ModelSummary>) -> String {
    models
        .values()
        .map(|model| {
            if model.is_fallback {
                format!("{} (assumed)", model.name)
            } else {
                model.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
