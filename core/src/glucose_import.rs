use std::io::Read;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

use crate::db::Database;
use crate::models::{GLUCOSE_MAX, GLUCOSE_MIN, NewGlucoseReading, ReadingContext};

/// A single row parsed from a meter CSV export.
#[derive(Debug, Clone)]
pub struct GlucoseCsvRow {
    pub line: usize,
    pub timestamp: String,
    pub value: String,
    pub context: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GlucoseImportSummary {
    pub rows_parsed: usize,
    pub imported: usize,
    pub duplicates: usize,
    /// Rows whose value is not a number or lies outside 20-600 mg/dL.
    pub skipped: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

/// Parse a glucose CSV export from any reader.
///
/// Required columns are `Timestamp` and `Glucose` (mg/dL); `Context` and
/// `Note` are optional. Header matching is case-insensitive.
pub fn parse_glucose_csv<R: Read>(reader: R) -> Result<Vec<GlucoseCsvRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    let col =
        |name: &str| -> Option<usize> { headers.iter().position(|h| h.eq_ignore_ascii_case(name)) };

    let Some(idx_time) = col("Timestamp") else {
        bail!("Missing required column: Timestamp");
    };
    let Some(idx_value) = col("Glucose") else {
        bail!("Missing required column: Glucose");
    };
    let idx_context = col("Context");
    let idx_note = col("Note");

    let mut rows = Vec::new();
    for (n, result) in rdr.records().enumerate() {
        let line = n + 2;
        let record = result.with_context(|| format!("Failed to parse CSV row {line}"))?;

        let timestamp = record.get(idx_time).unwrap_or("").to_string();
        let value = record.get(idx_value).unwrap_or("").to_string();
        if timestamp.is_empty() && value.is_empty() {
            continue;
        }

        let optional = |idx: Option<usize>| -> Option<String> {
            idx.and_then(|i| record.get(i))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        rows.push(GlucoseCsvRow {
            line,
            timestamp,
            value,
            context: optional(idx_context),
            note: optional(idx_note),
        });
    }

    Ok(rows)
}

/// Parse a meter timestamp. Zone-less forms are read as local time.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            if let Some(local) = Local.from_local_datetime(&naive).earliest() {
                return Ok(local.with_timezone(&Utc));
            }
        }
    }
    bail!("Cannot parse timestamp: '{raw}'")
}

fn parse_value(raw: &str) -> Option<i32> {
    let value: f64 = raw.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let rounded = value.round();
    if rounded < f64::from(GLUCOSE_MIN) || rounded > f64::from(GLUCOSE_MAX) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    Some(rounded as i32)
}

/// Import parsed rows for `user_id`.
///
/// Readings already stored with the same timestamp and value are counted as
/// duplicates and not inserted again. When `dry_run` is true, nothing is written.
pub fn import_glucose_readings(
    db: &Database,
    user_id: &str,
    rows: &[GlucoseCsvRow],
    dry_run: bool,
) -> Result<GlucoseImportSummary> {
    let mut summary = GlucoseImportSummary {
        rows_parsed: rows.len(),
        ..GlucoseImportSummary::default()
    };

    for row in rows {
        let recorded_at = parse_timestamp(&row.timestamp)
            .with_context(|| format!("Row {}", row.line))?;
        let Some(value) = parse_value(&row.value) else {
            tracing::debug!(line = row.line, value = %row.value, "skipping out-of-range glucose value");
            summary.skipped += 1;
            continue;
        };

        if db.reading_exists(user_id, recorded_at, value)? {
            summary.duplicates += 1;
            continue;
        }

        if !dry_run {
            db.insert_reading(&NewGlucoseReading {
                user_id: user_id.to_string(),
                value,
                recorded_at,
                context: row.context.as_deref().and_then(ReadingContext::parse),
                note: row.note.clone(),
            })?;
        }
        summary.imported += 1;
        summary.first = Some(summary.first.map_or(recorded_at, |f| f.min(recorded_at)));
        summary.last = Some(summary.last.map_or(recorded_at, |l| l.max(recorded_at)));
    }

    Ok(summary)
}
