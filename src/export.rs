//! Output tables: enriched reviews, problem timeline, sentiment timeline, insights.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::model::{EventKind, MonthlyBucket, SentimentEvent, YearMonth};
use crate::pipeline::PipelineReport;
use crate::timeline::format_shares;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Tsv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json => "json",
        }
    }
}

///Neutralizes spreadsheet formulas: a cell starting with `= + - @` (or tab/CR)
///gets a leading `'`. Cells that already start with `'` are left alone.
/// # Example
/// ```
/// use review_pulse::csv_safe_cell;
/// assert_eq!(csv_safe_cell("=SUM(A1)".to_string()), "'=SUM(A1)");
/// assert_eq!(csv_safe_cell("Pizza Hut".to_string()), "Pizza Hut");
/// ```
pub fn csv_safe_cell(cell: String) -> String {
    match cell.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t' | '\r') => format!("'{cell}"),
        _ => cell,
    }
}

#[derive(Debug, Serialize)]
pub struct EnrichedRow {
    pub restaurant_name: String,
    pub review_id: usize,
    pub review_date: Option<String>,
    pub year_month: Option<YearMonth>,
    pub rating: u8,
    pub review_text: String,
    pub cleaned_text: String,
    pub model_star: u8,
    pub model_confidence: f64,
    pub rating_score: f64,
    pub model_score: f64,
    pub final_score: f64,
    pub final_sentiment: String,
    pub top_words: String,
    pub categories: String,
}

#[derive(Debug, Serialize)]
pub struct ProblemTableRow {
    pub restaurant_name: String,
    pub year_month: YearMonth,
    pub detected_problem: String,
    pub problem_count: usize,
    pub problem_percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct TimelineRow {
    pub restaurant_name: String,
    pub year_month: YearMonth,
    pub review_count: usize,
    pub avg_final_score: f64,
    pub positive_ratio: f64,
    pub negative_ratio: f64,
    pub neutral_ratio: f64,
    pub positive_change: Option<f64>,
    pub negative_change: Option<f64>,
    pub sentiment_event: EventKind,
}

#[derive(Debug, Serialize)]
pub struct InsightRow {
    pub restaurant_name: String,
    pub top_problems: String,
    pub top_positive_features: String,
}

/// Buckets joined with their events on `(restaurant, year_month)`.
pub fn timeline_rows(buckets: &[MonthlyBucket], events: &[SentimentEvent]) -> Vec<TimelineRow> {
    let by_key: HashMap<(&str, YearMonth), &SentimentEvent> = events
        .iter()
        .map(|e| ((e.restaurant.as_str(), e.year_month), e))
        .collect();
    buckets
        .iter()
        .map(|b| {
            let event = by_key.get(&(b.restaurant.as_str(), b.year_month));
            TimelineRow {
                restaurant_name: b.restaurant.clone(),
                year_month: b.year_month,
                review_count: b.review_count,
                avg_final_score: b.avg_final_score,
                positive_ratio: b.positive_ratio,
                negative_ratio: b.negative_ratio,
                neutral_ratio: b.neutral_ratio,
                positive_change: event.and_then(|e| e.delta_positive),
                negative_change: event.and_then(|e| e.delta_negative),
                sentiment_event: event.map_or(EventKind::Stable, |e| e.kind),
            }
        })
        .collect()
}

fn enriched_rows(report: &PipelineReport, safe: fn(String) -> String) -> Vec<EnrichedRow> {
    report
        .reviews
        .iter()
        .map(|r| EnrichedRow {
            restaurant_name: safe(r.review.restaurant.clone()),
            review_id: r.review.id,
            review_date: r
                .review
                .timestamp
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            year_month: r.year_month(),
            rating: r.review.rating,
            review_text: safe(r.review.text.clone()),
            cleaned_text: safe(r.cleaned_text.clone()),
            model_star: r.assessment.predicted_star,
            model_confidence: r.assessment.model_confidence,
            rating_score: r.assessment.rating_score,
            model_score: r.assessment.model_score,
            final_score: r.assessment.final_score,
            final_sentiment: r.assessment.final_label.to_string(),
            top_words: safe(r.top_words.join(" ")),
            categories: safe(
                r.tags
                    .iter()
                    .map(|t| t.category.as_str())
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
        })
        .collect()
}

fn write_table<T: Serialize>(path: &Path, format: ExportFormat, rows: &[T]) -> Result<()> {
    match format {
        ExportFormat::Csv | ExportFormat::Tsv => {
            let delimiter = if format == ExportFormat::Tsv { b'\t' } else { b',' };
            let mut wtr = csv::WriterBuilder::new()
                .delimiter(delimiter)
                .from_path(path)?;
            for row in rows {
                wtr.serialize(row)?;
            }
            wtr.flush().map_err(|e| PipelineError::io(path, e))?;
        }
        ExportFormat::Json => {
            let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
            serde_json::to_writer_pretty(BufWriter::new(file), rows)?;
        }
    }
    Ok(())
}

/// Writes the four tables into `dir` and returns their paths.
pub fn write_report(report: &PipelineReport, dir: &Path, format: ExportFormat) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
    let safe: fn(String) -> String = match format {
        ExportFormat::Json => std::convert::identity,
        _ => csv_safe_cell,
    };
    let path_for = |name: &str| dir.join(format!("{name}.{}", format.extension()));
    let mut written = Vec::with_capacity(4);

    let path = path_for("enriched_reviews");
    write_table(&path, format, &enriched_rows(report, safe))?;
    written.push(path);

    let problems: Vec<ProblemTableRow> = report
        .problems
        .iter()
        .map(|p| ProblemTableRow {
            restaurant_name: safe(p.restaurant_name.clone()),
            year_month: p.year_month,
            detected_problem: safe(p.detected_problem.clone()),
            problem_count: p.problem_count,
            problem_percentage: p.problem_percentage,
        })
        .collect();
    let path = path_for("problem_timeline");
    write_table(&path, format, &problems)?;
    written.push(path);

    let mut timeline = timeline_rows(&report.buckets, &report.events);
    for row in &mut timeline {
        row.restaurant_name = safe(std::mem::take(&mut row.restaurant_name));
    }
    let path = path_for("sentiment_timeline");
    write_table(&path, format, &timeline)?;
    written.push(path);

    let insights: Vec<InsightRow> = report
        .insights
        .iter()
        .map(|i| InsightRow {
            restaurant_name: safe(i.restaurant.clone()),
            top_problems: safe(format_shares(&i.top_problems)),
            top_positive_features: safe(format_shares(&i.top_positive_features)),
        })
        .collect();
    let path = path_for("restaurant_insights");
    write_table(&path, format, &insights)?;
    written.push(path);

    Ok(written)
}

/// Human-readable digest for stdout.
pub fn render_summary(report: &PipelineReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Reviews processed: {} ({} skipped), monthly buckets: {}",
        report.reviews.len(),
        report.failures.len(),
        report.buckets.len()
    );
    for insight in &report.insights {
        let _ = writeln!(out, "\n{}", insight.restaurant);
        let _ = writeln!(out, "  Top problems: {}", or_none(format_shares(&insight.top_problems)));
        let _ = writeln!(
            out,
            "  Top positive features: {}",
            or_none(format_shares(&insight.top_positive_features))
        );
        for event in report
            .events
            .iter()
            .filter(|e| e.restaurant == insight.restaurant && e.kind != EventKind::Stable)
        {
            let _ = writeln!(
                out,
                "  {} sentiment {} ({:+.1} pts positive)",
                event.year_month,
                event.kind,
                event.delta_positive.unwrap_or_default()
            );
        }
    }
    out
}

fn or_none(s: String) -> String {
    if s.is_empty() { "-".to_string() } else { s }
}
