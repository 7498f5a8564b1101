use anyhow::Result;

use glyco_core::carbs::max_carbs;
use glyco_core::models::{MealType, validate_diabetes_type, validate_meal_type};
use glyco_core::recommend::{
    CARB_SORT_THRESHOLD, RecipeCatalog, RecommendationSource, recommend,
};
use glyco_core::service::{GlycoService, TREND_WINDOW_DAYS};

use crate::catalog::RestCatalogClient;
use crate::config::Config;

use super::helpers::print_recipe_table;

/// Show the per-meal carb ceiling from the stored profile and recent
/// readings. Any flag overrides the stored value.
pub(crate) fn cmd_carbs(
    svc: &GlycoService,
    user_id: &str,
    diabetes_type: Option<String>,
    insulin: Option<bool>,
    average: Option<f64>,
    json: bool,
) -> Result<()> {
    // the meal does not affect the ceiling
    let request = svc.recommendation_request(user_id, MealType::Lunch, 0)?;
    let category = match diabetes_type {
        Some(t) => Some(validate_diabetes_type(&t)?),
        None => request.category,
    };
    let insulin_dependent = insulin.unwrap_or(request.insulin_dependent);
    let recent_average = average.unwrap_or(request.recent_average);
    let ceiling = max_carbs(category, insulin_dependent, recent_average);

    if json {
        println!(
            "{}",
            serde_json::json!({
                "max_carbs": ceiling,
                "diabetes_type": category,
                "insulin_dependent": insulin_dependent,
                "recent_average": recent_average,
            })
        );
    } else {
        println!("Carb ceiling: {ceiling}g per meal");
        println!(
            "  Based on {}, {}, average {recent_average:.0} mg/dL",
            category.map_or("unknown type", |c| c.as_str()),
            if insulin_dependent {
                "on insulin"
            } else {
                "no insulin"
            }
        );
    }

    Ok(())
}

pub(crate) async fn cmd_recommend(
    svc: &GlycoService,
    config: &Config,
    meal: &str,
    count: usize,
    offline: bool,
    json: bool,
) -> Result<()> {
    let meal = validate_meal_type(meal)?;
    let request = svc.recommendation_request(&config.user_id, meal, count)?;

    let remote = match (&config.catalog, offline) {
        (Some(settings), false) => Some(RestCatalogClient::new(settings, config.catalog_timeout)?),
        _ => None,
    };
    let local;
    let catalog: &dyn RecipeCatalog = if let Some(client) = &remote {
        client
    } else {
        local = svc.local_catalog()?;
        &local
    };

    let result = recommend(&request, catalog, config.catalog_timeout).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.recipes.is_empty() {
        eprintln!("No {} recipes to suggest.", meal.as_str());
        std::process::exit(2);
    }

    let origin = if remote.is_some() { "catalog" } else { "local recipes" };
    let note = match result.source {
        RecommendationSource::Strict => format!("from {origin}"),
        RecommendationSource::Relaxed => {
            format!("from {origin}, ceiling relaxed: nothing fit exactly")
        }
        RecommendationSource::Fallback => {
            "built-in suggestions: no matches available right now".to_string()
        }
    };
    println!(
        "{} ideas, up to {}g carbs ({note})",
        capitalize(meal.as_str()),
        result.ceiling
    );
    if request.recent_average > CARB_SORT_THRESHOLD {
        println!(
            "Your {TREND_WINDOW_DAYS}-day average is {:.0} mg/dL, so lower-carb options come first.",
            request.recent_average
        );
    }
    print_recipe_table(&result.recipes);

    Ok(())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
