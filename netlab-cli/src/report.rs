//! Deployment summary: a table of lab containers or the same data as JSON.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use netlab_core::orchestrator::{DeployReport, NodeFailure};
use netlab_core::types::{GenericContainer, NODE_KIND_LABEL};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub name: String,
    pub container_id: String,
    pub image: String,
    pub kind: String,
    pub state: String,
    pub ipv4_address: String,
    pub ipv6_address: String,
}

impl SummaryRow {
    fn from_container(c: &GenericContainer) -> Self {
        let addr = |a: Option<String>| a.unwrap_or_else(|| "N/A".to_string());
        Self {
            name: c.name().unwrap_or_default().to_string(),
            container_id: c.short_id().to_string(),
            image: c.image.clone(),
            kind: c.labels.get(NODE_KIND_LABEL).cloned().unwrap_or_default(),
            state: c.state.clone(),
            ipv4_address: addr(c.network_settings.ipv4.map(|a| a.to_string())),
            ipv6_address: addr(c.network_settings.ipv6.map(|a| a.to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonSummary<'a> {
    lab: &'a str,
    started: String,
    finished: String,
    containers: Vec<SummaryRow>,
    failed: &'a [NodeFailure],
}

/// Rows sorted by container name.
#[must_use]
pub fn summary_rows(containers: &[GenericContainer]) -> Vec<SummaryRow> {
    let mut rows: Vec<SummaryRow> = containers.iter().map(SummaryRow::from_container).collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

const HEADERS: [&str; 8] = [
    "#",
    "Name",
    "Container ID",
    "Image",
    "Kind",
    "State",
    "IPv4 Address",
    "IPv6 Address",
];

#[must_use]
pub fn render_table(rows: &[SummaryRow]) -> String {
    let cells: Vec<[String; 8]> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| {
            [
                (i + 1).to_string(),
                r.name.clone(),
                r.container_id.clone(),
                r.image.clone(),
                r.kind.clone(),
                r.state.clone(),
                r.ipv4_address.clone(),
                r.ipv6_address.clone(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    let line = |out: &mut String, cols: &[&str]| {
        let padded: Vec<String> = cols
            .iter()
            .zip(widths)
            .map(|(c, w)| format!("{c:<w$}"))
            .collect();
        let _ = writeln!(out, "| {} |", padded.join(" | "));
    };
    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

    line(&mut out, &HEADERS);
    let _ = writeln!(out, "|-{}-|", sep.join("-|-"));
    for row in &cells {
        let cols: Vec<&str> = row.iter().map(String::as_str).collect();
        line(&mut out, &cols);
    }
    out
}

pub fn render_json(
    report: &DeployReport,
    started: DateTime<Utc>,
    finished: DateTime<Utc>,
) -> Result<String> {
    let summary = JsonSummary {
        lab: &report.lab,
        started: started.to_rfc3339(),
        finished: finished.to_rfc3339(),
        containers: summary_rows(&report.containers),
        failed: &report.failed,
    };
    serde_json::to_string_pretty(&summary).context("Failed to serialize deployment summary")
}

pub fn print_report(
    report: &DeployReport,
    format: OutputFormat,
    started: DateTime<Utc>,
    finished: DateTime<Utc>,
) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", render_json(report, started, finished)?);
        return Ok(());
    }

    println!();
    println!("🧪 Lab '{}'", report.lab);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Started:  {}", started.to_rfc3339());
    println!("Finished: {} ({:.1}s)", finished.to_rfc3339(), report.elapsed.as_secs_f64());
    println!();
    print!("{}", render_table(&summary_rows(&report.containers)));

    println!();
    if report.failed.is_empty() {
        println!("✅ All nodes deployed");
    } else {
        println!("❌ Post-deploy failed:");
        for failure in &report.failed {
            println!("  {}: {}", failure.node, failure.error);
        }
    }
    Ok(())
}
