use crate::models::DiabetesType;

/// No recommendation ever goes below this many grams per meal.
pub const ABSOLUTE_CARB_FLOOR: u32 = 20;
const DEFAULT_BASE: u32 = 45;

/// Per-meal carbohydrate ceiling in grams.
///
/// The single source of truth for "how many carbs is safe right now". Both the
/// meal-plan recommender and ad-hoc recipe searches call this.
#[must_use]
pub fn max_carbs(
    category: Option<DiabetesType>,
    insulin_dependent: bool,
    recent_average: f64,
) -> u32 {
    let base = match (category, insulin_dependent) {
        (Some(DiabetesType::Type1), true) => 50,
        (Some(DiabetesType::Type1), false) => 40,
        (Some(DiabetesType::Type2), true) => 45,
        (Some(DiabetesType::Type2), false) => 35,
        _ => DEFAULT_BASE,
    };

    let adjusted = if recent_average > 180.0 {
        base.saturating_sub(15).max(20)
    } else if recent_average > 140.0 {
        base.saturating_sub(10).max(25)
    } else if recent_average < 80.0 {
        base + 10
    } else {
        base
    };

    adjusted.max(ABSOLUTE_CARB_FLOOR)
}
