use anyhow::Result;

use glyco_core::carbs::max_carbs;
use glyco_core::models::{DiabetesProfile, validate_diabetes_type};
use glyco_core::service::GlycoService;
use glyco_core::targets::{TargetContext, targets_for};
use glyco_core::trend::NEUTRAL_AVERAGE;

use super::helpers::json_error;

/// Update only the fields that were given; the rest keep their stored values.
pub(crate) fn cmd_profile_set(
    svc: &GlycoService,
    user_id: &str,
    diabetes_type: Option<String>,
    insulin: Option<bool>,
    medications: Option<Vec<String>>,
    average: Option<f64>,
    json: bool,
) -> Result<()> {
    let mut profile = svc
        .get_profile(user_id)?
        .unwrap_or_else(|| DiabetesProfile::new(user_id));

    if let Some(t) = diabetes_type {
        profile.diabetes_type = Some(validate_diabetes_type(&t)?);
    }
    if let Some(i) = insulin {
        profile.insulin_dependent = i;
    }
    if let Some(m) = medications {
        profile.medications = m
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(avg) = average {
        profile.average_blood_sugar = Some(avg);
    }

    let saved = svc.save_profile(&profile)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        println!("Profile saved.");
        print_profile(&saved);
    }

    Ok(())
}

pub(crate) fn cmd_profile_show(svc: &GlycoService, user_id: &str, json: bool) -> Result<()> {
    let Some(profile) = svc.get_profile(user_id)? else {
        let message = format!("No profile for '{user_id}'");
        if json {
            println!("{}", json_error(&message));
        } else {
            eprintln!("{message}. Use `glyco profile set --type type2` to create one.");
        }
        std::process::exit(2);
    };

    if json {
        let targets = targets_for(profile.diabetes_type);
        println!(
            "{}",
            serde_json::json!({ "profile": profile, "targets": targets })
        );
    } else {
        print_profile(&profile);
    }

    Ok(())
}

fn print_profile(profile: &DiabetesProfile) {
    let type_label = profile
        .diabetes_type
        .map_or("not set", |t| t.as_str());
    println!("  User:          {}", profile.user_id);
    println!("  Diabetes type: {type_label}");
    println!(
        "  Insulin:       {}",
        if profile.insulin_dependent { "yes" } else { "no" }
    );
    if !profile.medications.is_empty() {
        println!("  Medications:   {}", profile.medications.join(", "));
    }
    if let Some(avg) = profile.average_blood_sugar {
        println!("  Usual average: {avg:.0} mg/dL");
    }

    let targets = targets_for(profile.diabetes_type);
    println!("\n  Targets (mg/dL):");
    for context in TargetContext::ALL {
        let range = targets.range(context);
        let label = match context {
            TargetContext::Fasting => "fasting",
            TargetContext::BeforeMeal => "before meals",
            TargetContext::AfterMeal => "after meals",
            TargetContext::Bedtime => "bedtime",
        };
        if range.min == 0 {
            println!("    {label:<13} under {}", range.max);
        } else {
            println!("    {label:<13} {}-{}", range.min, range.max);
        }
    }

    let ceiling = max_carbs(
        profile.diabetes_type,
        profile.insulin_dependent,
        profile.average_blood_sugar.unwrap_or(NEUTRAL_AVERAGE),
    );
    println!("\n  Carb ceiling per meal: {ceiling}g");
}
