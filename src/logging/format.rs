//! JSON log lines: one JSON object per line (ndjson) for ingestion and audit.

use crate::pipeline::PipelineReport;
use serde::Serialize;
use std::io::Write;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Flat per-mine summary of one cycle, written to stdout after each pass.
#[derive(Debug, Serialize)]
pub struct ReportLine<'a> {
    pub ts: String,
    pub mine_id: &'a str,
    pub probability: f64,
    pub risk_level: &'a str,
    pub stale: bool,
    pub notified: usize,
    pub delivered: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<&'a str>,
}

impl<'a> ReportLine<'a> {
    pub fn from_report(report: &'a PipelineReport) -> Self {
        let sent: Vec<_> = report.notifications.iter().filter(|n| !n.suppressed).collect();
        Self {
            ts: report.assessment.computed_at.to_rfc3339(),
            mine_id: &report.assessment.mine_id,
            probability: report.assessment.probability,
            risk_level: report.assessment.level.as_str(),
            stale: report.stale,
            notified: sent.len(),
            delivered: sent.iter().filter(|n| n.delivered).count(),
            channels: sent.iter().copied().filter_map(|n| n.channel_used.as_deref()).collect(),
        }
    }
}

/// Initialize tracing with JSON format (one JSON object per line)
pub struct StructuredLogger;

impl StructuredLogger {
    /// Install global subscriber on stderr, level from RUST_LOG or default.
    /// Stdout is reserved for report lines.
    pub fn init(json: bool, default_level: &str) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        if json {
            let fmt = tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NONE)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry().with(filter).with(fmt).try_init();
        } else {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init();
        }
    }

    /// Emit a single structured line without going through tracing
    pub fn emit_json(event: &impl Serialize, w: &mut impl Write) {
        if let Ok(line) = serde_json::to_string(event) {
            let _ = writeln!(w, "{}", line);
        }
    }
}
