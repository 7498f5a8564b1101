use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;

use glyco_core::classify::{GlucoseStatus, GlucoseTier};
use glyco_core::models::{NewGlucoseReading, validate_reading_context};
use glyco_core::service::{GlycoService, TREND_WINDOW_DAYS};

use super::helpers::{json_error, parse_reading_time, print_reading_table};

pub(crate) fn cmd_glucose_log(
    svc: &GlycoService,
    user_id: &str,
    value: i32,
    context: Option<String>,
    at: Option<String>,
    note: Option<String>,
    json: bool,
) -> Result<()> {
    let context = context
        .as_deref()
        .map(validate_reading_context)
        .transpose()?;
    let recorded_at = parse_reading_time(at.as_deref())?;

    let reading = svc.log_reading(&NewGlucoseReading {
        user_id: user_id.to_string(),
        value,
        recorded_at,
        context,
        note,
    })?;

    let category = svc.get_profile(user_id)?.and_then(|p| p.diabetes_type);
    let status = glyco_core::classify::classify(reading.value, category, reading.context);

    if json {
        println!(
            "{}",
            serde_json::json!({ "reading": reading, "status": status })
        );
    } else {
        println!(
            "Logged {} mg/dL at {} (id {})",
            reading.value,
            reading
                .recorded_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M"),
            reading.id
        );
        print_status(&status);
    }

    Ok(())
}

pub(crate) fn cmd_glucose_history(
    svc: &GlycoService,
    user_id: &str,
    days: Option<u32>,
    limit: i64,
    json: bool,
) -> Result<()> {
    let readings = match days {
        Some(d) => svc.get_glucose_readings(user_id, i64::from(d))?,
        None => svc.recent_readings(user_id, limit)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&readings)?);
    } else if readings.is_empty() {
        eprintln!("No glucose readings found. Use `glyco glucose log` to record one.");
        std::process::exit(2);
    } else {
        print_reading_table(&readings);
    }

    Ok(())
}

/// Classify a value without storing it.
pub(crate) fn cmd_glucose_check(
    svc: &GlycoService,
    user_id: &str,
    value: i32,
    context: Option<String>,
    diabetes_type: Option<String>,
    json: bool,
) -> Result<()> {
    let status = match diabetes_type {
        Some(t) => GlycoService::classify_reading(value, Some(&t), context.as_deref()),
        None => {
            let profile_type = svc
                .get_profile(user_id)?
                .and_then(|p| p.diabetes_type)
                .map(|t| t.as_str());
            GlycoService::classify_reading(value, profile_type, context.as_deref())
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&status);
    }

    Ok(())
}

pub(crate) fn cmd_glucose_trend(svc: &GlycoService, user_id: &str, json: bool) -> Result<()> {
    let summary = svc.trend_for_user(user_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if summary.reading_count == 0 {
        eprintln!("No readings in the last {TREND_WINDOW_DAYS} days.");
        std::process::exit(2);
    }

    println!("Last {TREND_WINDOW_DAYS} days ({} readings)\n", summary.reading_count);
    println!("  Average:        {:.0} mg/dL", summary.average);
    println!("  Time in range:  {}% (70-140 mg/dL)", summary.time_in_range_percent);
    println!("  Trend:          {}", summary.trend.describe());
    println!("  Recent spikes:  {}", summary.recent_spike_count);
    if summary.reading_count < 2 {
        println!("\n  Log a few more readings for a meaningful trend.");
    }

    Ok(())
}

pub(crate) fn cmd_glucose_delete(
    svc: &GlycoService,
    user_id: &str,
    id: i64,
    json: bool,
) -> Result<()> {
    if svc.delete_reading(user_id, id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Deleted reading {id}");
        }
        return Ok(());
    }

    let message = format!("Reading {id} not found");
    if json {
        println!("{}", json_error(&message));
    } else {
        eprintln!("{message}");
    }
    std::process::exit(2);
}

pub(crate) fn cmd_glucose_import(
    svc: &GlycoService,
    user_id: &str,
    path: &Path,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let summary = svc.import_glucose_csv(user_id, &data, dry_run)?;

    if summary.rows_parsed == 0 {
        if json {
            println!("{}", json_error("No rows found in CSV file"));
        } else {
            eprintln!("No rows found in CSV file.");
        }
        return Ok(());
    }

    if json {
        let mut value = serde_json::to_value(&summary)?;
        value["dry_run"] = serde_json::Value::Bool(dry_run);
        println!("{value}");
        return Ok(());
    }

    if dry_run {
        println!("Dry run, no changes made.\n");
        println!("  Rows parsed:       {}", summary.rows_parsed);
        println!("  Readings to add:   {}", summary.imported);
    } else {
        println!("Import complete.\n");
        println!("  Rows parsed:       {}", summary.rows_parsed);
        println!("  Readings added:    {}", summary.imported);
    }
    println!("  Already stored:    {}", summary.duplicates);
    println!("  Skipped (invalid): {}", summary.skipped);
    if let (Some(first), Some(last)) = (summary.first, summary.last) {
        println!(
            "  Span:              {} to {}",
            first.with_timezone(&Local).format("%Y-%m-%d"),
            last.with_timezone(&Local).format("%Y-%m-%d")
        );
    }

    Ok(())
}

fn print_status(status: &GlucoseStatus) {
    let label = match status.tier {
        GlucoseTier::Low => "LOW",
        GlucoseTier::Normal => "NORMAL",
        GlucoseTier::High => "HIGH",
        GlucoseTier::VeryHigh => "VERY HIGH",
    };
    println!("  Status: {label}");
    println!("  {}", status.message);
    println!("  {}", status.recommendation);
}
