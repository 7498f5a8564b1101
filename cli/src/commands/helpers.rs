use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use glyco_core::error::PlanError;
use glyco_core::models::{GlucoseReading, Recipe};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Parse when a reading was taken. Accepts RFC 3339, or `YYYY-MM-DD HH:MM`
/// and `HH:MM` (today) in local time. `None` means now.
pub(crate) fn parse_reading_time(at: Option<&str>) -> Result<DateTime<Utc>> {
    let Some(s) = at.map(str::trim) else {
        return Ok(Utc::now());
    };
    if s == "now" {
        return Ok(Utc::now());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").or_else(|_| {
        chrono::NaiveTime::parse_from_str(s, "%H:%M")
            .map(|t| Local::now().date_naive().and_time(t))
    });
    let Ok(naive) = naive else {
        bail!("Invalid time '{s}'. Use 'YYYY-MM-DD HH:MM', 'HH:MM' or RFC 3339");
    };
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("'{s}' does not exist in the local time zone"))
}

pub(crate) fn print_reading_table(readings: &[GlucoseReading]) {
    #[derive(Tabled)]
    struct ReadingRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "When")]
        when: String,
        #[tabled(rename = "mg/dL")]
        value: i32,
        #[tabled(rename = "Context")]
        context: String,
        #[tabled(rename = "Note")]
        note: String,
    }

    let rows: Vec<ReadingRow> = readings
        .iter()
        .map(|r| ReadingRow {
            id: r.id,
            when: r
                .recorded_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
            value: r.value,
            context: r.context.map(|c| c.as_str().to_string()).unwrap_or_default(),
            note: r.note.as_deref().map(|n| truncate(n, 30)).unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_recipe_table(recipes: &[Recipe]) {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Kcal")]
        calories: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Fiber")]
        fiber: String,
        #[tabled(rename = "Source")]
        source: String,
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id,
            name: truncate(&r.name, 35),
            meal: r.category.as_str().to_string(),
            calories: format!("{:.0}", r.calories),
            carbs: format!("{:.0}g", r.carbs),
            protein: format!("{:.0}g", r.protein),
            fiber: format!("{:.0}g", r.fiber),
            source: r.source.clone(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Print a plan error so scripts can tell a retryable failure from bad input.
pub(crate) fn report_plan_error(err: &PlanError, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({ "error": err.to_string(), "retryable": err.is_retryable() })
        );
    } else if err.is_retryable() {
        eprintln!("Error: {err}. Nothing was changed; try again.");
    } else {
        eprintln!("Error: {err}");
    }
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
