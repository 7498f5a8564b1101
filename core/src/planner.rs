use anyhow::Result;
use chrono::NaiveDate;

use crate::error::PlanError;
use crate::models::{MEAL_SLOTS, MealPlan, MealSlot, PlannedMeal, Recipe};

/// Persistence for day plans, keyed by `(user_id, date)`.
///
/// `put_meal_plan` must replace the whole record in one write.
pub trait PlanStore {
    fn get_meal_plan(&self, user_id: &str, date: NaiveDate) -> Result<Option<MealPlan>>;
    fn put_meal_plan(&self, plan: &MealPlan) -> Result<()>;
}

/// Recompute the aggregate totals from the currently assigned slots.
pub fn recompute_totals(plan: &mut MealPlan) {
    let (calories, carbs, protein) = MEAL_SLOTS
        .iter()
        .filter_map(|s| plan.slot(*s))
        .fold((0.0, 0.0, 0.0), |(kcal, c, p), m| {
            (kcal + m.calories, c + m.carbs, p + m.protein)
        });
    plan.total_calories = calories;
    plan.total_carbs = carbs;
    plan.total_protein = protein;
}

/// Apply one slot change to an existing plan (or a fresh one) without I/O.
#[must_use]
pub fn with_meal(
    existing: Option<MealPlan>,
    user_id: &str,
    date: NaiveDate,
    slot: MealSlot,
    recipe: Option<&Recipe>,
) -> MealPlan {
    let mut plan = existing.unwrap_or_else(|| MealPlan::empty(user_id, date));
    *plan.slot_mut(slot) = recipe.map(PlannedMeal::from);
    recompute_totals(&mut plan);
    plan.updated_at = chrono::Local::now().to_rfc3339();
    plan
}

/// Assign (or clear, with `None`) one slot of a user's plan for `date`.
///
/// Read, mutate, recompute, write. The updated plan is only returned once the
/// write succeeded; a failed write surfaces as a retryable [`PlanError::Store`].
pub fn assign_meal(
    store: &dyn PlanStore,
    user_id: &str,
    date: NaiveDate,
    slot: MealSlot,
    recipe: Option<&Recipe>,
) -> Result<MealPlan, PlanError> {
    let existing = store
        .get_meal_plan(user_id, date)
        .map_err(PlanError::Store)?;
    let plan = with_meal(existing, user_id, date, slot, recipe);
    store.put_meal_plan(&plan).map_err(PlanError::Store)?;
    Ok(plan)
}

pub fn add_snack(
    store: &dyn PlanStore,
    user_id: &str,
    date: NaiveDate,
    snack: &str,
) -> Result<MealPlan, PlanError> {
    append_note(store, user_id, date, snack, |plan| &mut plan.snacks)
}

pub fn add_reminder(
    store: &dyn PlanStore,
    user_id: &str,
    date: NaiveDate,
    reminder: &str,
) -> Result<MealPlan, PlanError> {
    append_note(store, user_id, date, reminder, |plan| &mut plan.reminders)
}

fn append_note(
    store: &dyn PlanStore,
    user_id: &str,
    date: NaiveDate,
    text: &str,
    list: fn(&mut MealPlan) -> &mut Vec<String>,
) -> Result<MealPlan, PlanError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(PlanError::InvalidInput("text must not be empty".to_string()));
    }
    let mut plan = store
        .get_meal_plan(user_id, date)
        .map_err(PlanError::Store)?
        .unwrap_or_else(|| MealPlan::empty(user_id, date));
    list(&mut plan).push(text.to_string());
    plan.updated_at = chrono::Local::now().to_rfc3339();
    store.put_meal_plan(&plan).map_err(PlanError::Store)?;
    Ok(plan)
}
