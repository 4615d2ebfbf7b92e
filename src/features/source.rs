//! Feature source: CSV exports or JSON table rows → readings, plus the per-mine store.
//!
//! Missing or malformed numeric cells are recorded as zero and counted in
//! `ParsedReadings::defaulted_fields` so data-quality gaps stay visible.
//! Rows without a timestamp take a caller-supplied fallback; `load_readings`
//! passes the file's modification time so re-reading an unchanged file yields
//! the same readings.

use super::{Feature, SensorReading, FEATURE_COUNT};
use crate::error::{AgentError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Readings kept per mine; at 5-minute sampling this is one day.
pub const DEFAULT_HISTORY_LIMIT: usize = 288;

const BOM: char = '\u{feff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    MineId,
    Timestamp,
    Value(Feature),
}

/// Header / key names accepted for each column (case-insensitive).
fn resolve_column(name: &str) -> Option<Column> {
    let key = name.trim().trim_matches('"').to_ascii_lowercase();
    let col = match key.as_str() {
        "mine_id" | "mine" | "mineid" => Column::MineId,
        "timestamp" | "time" | "recorded_at" => Column::Timestamp,
        "displacement" | "displacement_mm" => Column::Value(Feature::Displacement),
        "strain" | "strain_microstrain" => Column::Value(Feature::Strain),
        "pore_pressure" | "pore_pressure_kpa" => Column::Value(Feature::PorePressure),
        "rainfall" | "rainfall_mm" => Column::Value(Feature::Rainfall),
        "temperature" | "temperature_c" => Column::Value(Feature::Temperature),
        "slope" | "slope_deg" | "slope_angle" => Column::Value(Feature::Slope),
        "crack_score" | "crack" => Column::Value(Feature::CrackScore),
        _ => return None,
    };
    Some(col)
}

fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim().trim_matches('"');
    if s.is_empty() || s.eq_ignore_ascii_case("null") {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim().trim_matches('"');
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Output of a parse: the readings plus data-quality counters.
#[derive(Debug, Default)]
pub struct ParsedReadings {
    pub readings: Vec<SensorReading>,
    /// Numeric cells that were missing or malformed and recorded as zero
    pub defaulted_fields: usize,
    /// Rows dropped for lacking a mine id or carrying more cells than the header
    pub skipped_rows: usize,
}

/// Cells collected for one row before it becomes a reading.
#[derive(Default)]
struct RowAccumulator {
    mine_id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    values: [Option<f64>; FEATURE_COUNT],
}

impl RowAccumulator {
    fn finish(self, fallback_ts: DateTime<Utc>, out: &mut ParsedReadings) {
        let Some(mine_id) = self.mine_id.filter(|m| !m.is_empty()) else {
            out.skipped_rows += 1;
            return;
        };
        let mut reading = SensorReading::zeroed(mine_id, self.timestamp.unwrap_or(fallback_ts));
        for feature in Feature::ALL {
            match self.values[feature.index()] {
                Some(v) => reading = reading.with(feature, v),
                None => out.defaulted_fields += 1,
            }
        }
        out.readings.push(reading);
    }
}

/// Split one CSV record. Double-quoted cells may contain commas, and `""`
/// inside quotes is a literal quote.
fn split_record(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(c),
        }
    }
    cells.push(cell);
    cells
}

/// Parse a CSV export with a header row. Unknown columns are ignored.
/// A row with non-empty cells beyond the header is malformed and skipped,
/// since its values cannot be matched to columns.
pub fn parse_csv(text: &str, fallback_ts: DateTime<Utc>) -> Result<ParsedReadings> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| AgentError::Parse("readings CSV is empty".into()))?;
    let columns: Vec<Option<Column>> = split_record(header)
        .iter()
        .map(|name| resolve_column(name))
        .collect();
    if !columns.contains(&Some(Column::MineId)) {
        return Err(AgentError::Parse(
            "readings CSV header has no mine_id column".into(),
        ));
    }

    let mut out = ParsedReadings::default();
    for line in lines {
        let cells = split_record(line);
        if cells[columns.len().min(cells.len())..]
            .iter()
            .any(|c| !c.trim().is_empty())
        {
            debug!(line, "row has more cells than the header; skipped");
            out.skipped_rows += 1;
            continue;
        }
        let mut row = RowAccumulator::default();
        for (cell, column) in cells.iter().zip(columns.iter()) {
            match column {
                Some(Column::MineId) => {
                    row.mine_id = Some(cell.trim().trim_matches('"').to_string());
                }
                Some(Column::Timestamp) => row.timestamp = parse_timestamp(cell),
                Some(Column::Value(f)) => row.values[f.index()] = parse_number(cell),
                None => {}
            }
        }
        row.finish(fallback_ts, &mut out);
    }
    Ok(out)
}

/// Parse a JSON array of row objects, as exported from a hosted table.
/// Numbers may arrive as JSON numbers or numeric strings.
pub fn parse_json_rows(text: &str, fallback_ts: DateTime<Utc>) -> Result<ParsedReadings> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let rows: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(text)?;
    let mut out = ParsedReadings::default();
    for obj in rows {
        let mut row = RowAccumulator::default();
        for (key, value) in &obj {
            let Some(column) = resolve_column(key) else {
                continue;
            };
            match (column, value) {
                (Column::MineId, serde_json::Value::String(s)) => row.mine_id = Some(s.trim().to_string()),
                (Column::MineId, serde_json::Value::Number(n)) => row.mine_id = Some(n.to_string()),
                (Column::Timestamp, serde_json::Value::String(s)) => row.timestamp = parse_timestamp(s),
                (Column::Value(f), serde_json::Value::Number(n)) => {
                    row.values[f.index()] = n.as_f64().filter(|v| v.is_finite());
                }
                (Column::Value(f), serde_json::Value::String(s)) => {
                    row.values[f.index()] = parse_number(s);
                }
                _ => {}
            }
        }
        row.finish(fallback_ts, &mut out);
    }
    Ok(out)
}

/// Read a readings file; `.json` is parsed as table rows, anything else as CSV.
/// Untimestamped rows are stamped with the file's modification time, or `now`
/// when the filesystem does not report one.
pub fn load_readings(path: &Path, now: DateTime<Utc>) -> Result<ParsedReadings> {
    let text = std::fs::read_to_string(path)?;
    let fallback_ts = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or(now);
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let parsed = if is_json {
        parse_json_rows(&text, fallback_ts)?
    } else {
        parse_csv(&text, fallback_ts)?
    };
    if parsed.defaulted_fields > 0 || parsed.skipped_rows > 0 {
        warn!(
            path = %path.display(),
            defaulted_fields = parsed.defaulted_fields,
            skipped_rows = parsed.skipped_rows,
            "readings file has gaps; missing values recorded as zero"
        );
    }
    debug!(path = %path.display(), count = parsed.readings.len(), "readings loaded");
    Ok(parsed)
}

/// Readings grouped by mine, each mine's history ordered by timestamp and
/// capped at `history_limit` entries (oldest dropped first).
#[derive(Debug)]
pub struct FeatureStore {
    by_mine: BTreeMap<String, Vec<SensorReading>>,
    history_limit: usize,
}

impl Default for FeatureStore {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl FeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            by_mine: BTreeMap::new(),
            history_limit: limit.max(1),
        }
    }

    /// Insert a reading. Returns `false` if a reading with the same
    /// `(mine_id, timestamp)` is already held, or if the history is full and the
    /// reading is older than everything retained. Recorded readings are never replaced.
    pub fn insert(&mut self, reading: SensorReading) -> bool {
        let limit = self.history_limit;
        let history = self.by_mine.entry(reading.mine_id.clone()).or_default();
        match history.binary_search_by(|r| r.timestamp.cmp(&reading.timestamp)) {
            Ok(_) => false,
            Err(0) if history.len() >= limit => false,
            Err(pos) => {
                history.insert(pos, reading);
                if history.len() > limit {
                    history.remove(0);
                }
                true
            }
        }
    }

    /// Insert many readings; returns how many were new.
    pub fn extend(&mut self, readings: impl IntoIterator<Item = SensorReading>) -> usize {
        let mut added = 0;
        for reading in readings {
            if self.insert(reading) {
                added += 1;
            }
        }
        added
    }

    pub fn latest(&self, mine_id: &str) -> Option<&SensorReading> {
        self.by_mine.get(mine_id).and_then(|h| h.last())
    }

    /// Most recent reading of every mine, ordered by mine id.
    pub fn latest_per_mine(&self) -> Vec<&SensorReading> {
        self.by_mine.values().filter_map(|h| h.last()).collect()
    }

    pub fn history(&self, mine_id: &str) -> &[SensorReading] {
        self.by_mine.get(mine_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn mine_ids(&self) -> impl Iterator<Item = &str> {
        self.by_mine.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_mine.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_mine.is_empty()
    }
}
