use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::{NaiveDate, Utc};

use crate::catalog::LocalCatalog;
use crate::classify::{GlucoseStatus, classify};
use crate::db::Database;
use crate::error::PlanError;
use crate::glucose_import::{self, GlucoseImportSummary};
use crate::models::{
    DiabetesProfile, DiabetesType, GlucoseReading, MealPlan, MealSlot, MealType,
    NewGlucoseReading, NewRecipe, ReadingContext, Recipe, validate_glucose_value,
    validate_new_recipe,
};
use crate::planner::{self, PlanStore};
use crate::recommend::{
    Recommendation, RecommendationRequest, RecipeCatalog, fallback_recipes, recommend,
};
use crate::trend::{self, TrendSummary};

/// Days of history the trend and the carb ceiling look at.
pub const TREND_WINDOW_DAYS: i64 = 7;

pub struct GlycoService {
    db: Database,
}

impl GlycoService {
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Database::open(Path::new(db_path))?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    // --- Pure engine operations ---

    /// Classify one reading. Unknown category or context strings are treated
    /// as absent rather than rejected.
    #[must_use]
    pub fn classify_reading(
        value: i32,
        category: Option<&str>,
        context: Option<&str>,
    ) -> GlucoseStatus {
        classify(
            value,
            category.and_then(DiabetesType::parse),
            context.and_then(ReadingContext::parse),
        )
    }

    #[must_use]
    pub fn analyze_trend(readings: &[GlucoseReading]) -> TrendSummary {
        trend::analyze(readings)
    }

    // --- Profile ---

    pub fn get_profile(&self, user_id: &str) -> Result<Option<DiabetesProfile>> {
        self.db.get_profile(user_id)
    }

    pub fn save_profile(&self, profile: &DiabetesProfile) -> Result<DiabetesProfile> {
        if let Some(avg) = profile.average_blood_sugar {
            if !avg.is_finite() || avg <= 0.0 {
                anyhow::bail!("Average blood sugar must be a positive number");
            }
        }
        self.db.upsert_profile(profile)
    }

    // --- Glucose readings ---

    pub fn log_reading(&self, reading: &NewGlucoseReading) -> Result<GlucoseReading> {
        validate_glucose_value(reading.value)?;
        self.db.insert_reading(reading)
    }

    /// Readings in the last `window_days` days, most recent first.
    pub fn get_glucose_readings(
        &self,
        user_id: &str,
        window_days: i64,
    ) -> Result<Vec<GlucoseReading>> {
        self.db.get_glucose_readings(user_id, window_days, Utc::now())
    }

    pub fn recent_readings(&self, user_id: &str, limit: i64) -> Result<Vec<GlucoseReading>> {
        self.db.recent_readings(user_id, limit)
    }

    pub fn delete_reading(&self, user_id: &str, id: i64) -> Result<bool> {
        self.db.delete_reading(user_id, id)
    }

    pub fn trend_for_user(&self, user_id: &str) -> Result<TrendSummary> {
        let readings = self.get_glucose_readings(user_id, TREND_WINDOW_DAYS)?;
        Ok(trend::analyze(&readings))
    }

    pub fn import_glucose_csv(
        &self,
        user_id: &str,
        csv_data: &str,
        dry_run: bool,
    ) -> Result<GlucoseImportSummary> {
        let rows = glucose_import::parse_glucose_csv(csv_data.as_bytes())?;
        glucose_import::import_glucose_readings(&self.db, user_id, &rows, dry_run)
    }

    // --- Recipes ---

    pub fn add_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        validate_new_recipe(recipe)?;
        self.db.insert_recipe(recipe)
    }

    /// Stored recipe by id. Negative ids resolve to the fallback set.
    pub fn get_recipe(&self, id: i64) -> Result<Option<Recipe>> {
        if id < 0 {
            return Ok(fallback_recipes().into_iter().find(|r| r.id == id));
        }
        self.db.get_recipe(id)
    }

    pub fn list_recipes(&self, category: Option<MealType>) -> Result<Vec<Recipe>> {
        self.db.list_recipes(category)
    }

    pub fn search_recipes(&self, query: &str) -> Result<Vec<Recipe>> {
        self.db.search_recipes(query)
    }

    /// Snapshot of the stored recipes usable as an offline catalog.
    pub fn local_catalog(&self) -> Result<LocalCatalog> {
        Ok(LocalCatalog::new(self.db.list_recipes(None)?))
    }

    // --- Recommendations ---

    /// Build a recommendation request from the stored profile and the last
    /// week of readings.
    ///
    /// With fewer than two readings the trend average is only a neutral
    /// placeholder, so a profile baseline takes precedence when one is set.
    pub fn recommendation_request(
        &self,
        user_id: &str,
        meal: MealType,
        count: usize,
    ) -> Result<RecommendationRequest> {
        let profile = self.db.get_profile(user_id)?;
        let readings = self.get_glucose_readings(user_id, TREND_WINDOW_DAYS)?;
        let summary = trend::analyze(&readings);

        let baseline = profile.as_ref().and_then(|p| p.average_blood_sugar);
        let recent_average = match baseline {
            Some(avg) if readings.len() < 2 => avg,
            _ => summary.average,
        };

        Ok(RecommendationRequest {
            meal,
            category: profile.as_ref().and_then(|p| p.diabetes_type),
            insulin_dependent: profile.as_ref().is_some_and(|p| p.insulin_dependent),
            recent_average,
            count,
        })
    }

    /// Recommend recipes for `meal`. Only storage errors are returned; catalog
    /// failures resolve to the fallback set.
    pub async fn recommend_meals(
        &self,
        catalog: &dyn RecipeCatalog,
        user_id: &str,
        meal: MealType,
        count: usize,
        timeout: Duration,
    ) -> Result<Recommendation> {
        let request = self.recommendation_request(user_id, meal, count)?;
        Ok(recommend(&request, catalog, timeout).await)
    }

    // --- Meal plans ---

    pub fn get_meal_plan(&self, user_id: &str, date: NaiveDate) -> Result<Option<MealPlan>> {
        self.db.get_meal_plan(user_id, date)
    }

    /// Assign a recipe to a slot, or clear the slot with `None`.
    pub fn assign_meal_to_plan(
        &self,
        user_id: &str,
        date: NaiveDate,
        slot: MealSlot,
        recipe_id: Option<i64>,
    ) -> Result<MealPlan, PlanError> {
        let recipe = match recipe_id {
            Some(id) => Some(
                self.get_recipe(id)
                    .map_err(PlanError::Store)?
                    .ok_or(PlanError::RecipeNotFound(id))?,
            ),
            None => None,
        };
        planner::assign_meal(&self.db, user_id, date, slot, recipe.as_ref())
    }

    pub fn add_snack(
        &self,
        user_id: &str,
        date: NaiveDate,
        snack: &str,
    ) -> Result<MealPlan, PlanError> {
        planner::add_snack(&self.db, user_id, date, snack)
    }

    pub fn add_reminder(
        &self,
        user_id: &str,
        date: NaiveDate,
        reminder: &str,
    ) -> Result<MealPlan, PlanError> {
        planner::add_reminder(&self.db, user_id, date, reminder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::GlucoseTier;
    use crate::error::CatalogError;
    use crate::recommend::{CatalogQuery, RecommendationSource};
    use async_trait::async_trait;

    struct DownCatalog;

    #[async_trait]
    impl RecipeCatalog for DownCatalog {
        async fn search_recipes(&self, _query: &CatalogQuery) -> Result<Vec<Recipe>, CatalogError> {
            Err(CatalogError::Transport("connection refused".to_string()))
        }
    }

    fn sample_recipe(name: &str, category: MealType, carbs: f64) -> NewRecipe {
        NewRecipe {
            name: name.to_string(),
            category,
            calories: 400.0,
            carbs,
            protein: 25.0,
            fat: 12.0,
            fiber: 6.0,
            sugar: 4.0,
            sodium: 300.0,
            difficulty: None,
            tags: vec![],
            ingredients: vec![],
            instructions: vec![],
            source: "manual".to_string(),
        }
    }

    fn log(svc: &GlycoService, user: &str, value: i32, hours_ago: i64) {
        svc.log_reading(&NewGlucoseReading {
            user_id: user.to_string(),
            value,
            recorded_at: Utc::now() - chrono::Duration::hours(hours_ago),
            context: None,
            note: None,
        })
        .unwrap();
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    #[test]
    fn test_classify_reading_lenient_category() {
        let status = GlycoService::classify_reading(131, Some("Type 1"), Some("fasting"));
        assert_eq!(status.tier, GlucoseTier::High);
        assert!(status.recommendation.contains("correction dose"));

        // unknown category uses the type2 table
        let status = GlycoService::classify_reading(130, Some("mystery"), Some("fasting"));
        assert_eq!(status.tier, GlucoseTier::Normal);
    }

    #[test]
    fn test_log_reading_validates_domain() {
        let svc = GlycoService::new_in_memory().unwrap();
        let err = svc
            .log_reading(&NewGlucoseReading {
                user_id: "u1".to_string(),
                value: 5,
                recorded_at: Utc::now(),
                context: None,
                note: None,
            })
            .unwrap_err();
        assert!(err.to_string().contains("between 20 and 600"));
    }

    #[test]
    fn test_trend_for_user_window() {
        let svc = GlycoService::new_in_memory().unwrap();
        log(&svc, "u1", 200, 1);
        log(&svc, "u1", 210, 2);
        log(&svc, "u1", 175, 3);
        log(&svc, "u1", 100, 30);
        log(&svc, "u1", 95, 31);
        log(&svc, "u1", 105, 32);
        // outside the 7-day window
        log(&svc, "u1", 400, 24 * 9);

        let summary = svc.trend_for_user("u1").unwrap();
        assert_eq!(summary.reading_count, 6);
        assert_eq!(summary.recent_spike_count, 2);
        assert_eq!(summary.trend, trend::GlucoseTrend::Rising);
    }

    #[test]
    fn test_request_without_profile_uses_defaults() {
        let svc = GlycoService::new_in_memory().unwrap();
        let request = svc
            .recommendation_request("nobody", MealType::Lunch, 3)
            .unwrap();
        assert_eq!(request.category, None);
        assert!(!request.insulin_dependent);
        assert!((request.recent_average - trend::NEUTRAL_AVERAGE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_request_prefers_baseline_when_history_is_thin() {
        let svc = GlycoService::new_in_memory().unwrap();
        let mut profile = DiabetesProfile::new("u1");
        profile.diabetes_type = Some(DiabetesType::Type2);
        profile.average_blood_sugar = Some(190.0);
        svc.save_profile(&profile).unwrap();
        log(&svc, "u1", 110, 1);

        let request = svc.recommendation_request("u1", MealType::Dinner, 3).unwrap();
        assert_eq!(request.category, Some(DiabetesType::Type2));
        assert!((request.recent_average - 190.0).abs() < f64::EPSILON);

        log(&svc, "u1", 130, 2);
        let request = svc.recommendation_request("u1", MealType::Dinner, 3).unwrap();
        assert!((request.recent_average - 120.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_recommend_meals_offline_catalog() {
        let svc = GlycoService::new_in_memory().unwrap();
        let mut profile = DiabetesProfile::new("u1");
        profile.diabetes_type = Some(DiabetesType::Type1);
        profile.insulin_dependent = true;
        svc.save_profile(&profile).unwrap();
        svc.add_recipe(&sample_recipe("Chili", MealType::Dinner, 45.0))
            .unwrap();
        svc.add_recipe(&sample_recipe("Lasagna", MealType::Dinner, 70.0))
            .unwrap();

        let catalog = svc.local_catalog().unwrap();
        let rec = svc
            .recommend_meals(&catalog, "u1", MealType::Dinner, 5, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(rec.ceiling, 50);
        assert_eq!(rec.source, RecommendationSource::Strict);
        assert_eq!(rec.recipes.len(), 1);
        assert_eq!(rec.recipes[0].name, "Chili");
    }

    #[tokio::test]
    async fn test_recommend_meals_catalog_down_serves_fallback() {
        let svc = GlycoService::new_in_memory().unwrap();
        let rec = svc
            .recommend_meals(&DownCatalog, "u1", MealType::Lunch, 4, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(rec.source, RecommendationSource::Fallback);
        assert_eq!(rec.recipes.len(), 4);
        assert_eq!(rec.recipes[0].category, MealType::Lunch);
    }

    #[test]
    fn test_assign_meal_to_plan_breakfast_then_lunch() {
        let svc = GlycoService::new_in_memory().unwrap();
        let oats = svc
            .add_recipe(&sample_recipe("Oats", MealType::Breakfast, 30.0))
            .unwrap();
        let soup = svc
            .add_recipe(&sample_recipe("Soup", MealType::Lunch, 20.0))
            .unwrap();

        svc.assign_meal_to_plan("u1", day(), MealSlot::Breakfast, Some(oats.id))
            .unwrap();
        svc.assign_meal_to_plan("u1", day(), MealSlot::Lunch, Some(soup.id))
            .unwrap();

        let plan = svc.get_meal_plan("u1", day()).unwrap().unwrap();
        assert_eq!(plan.breakfast.as_ref().unwrap().name, "Oats");
        assert_eq!(plan.lunch.as_ref().unwrap().name, "Soup");
        assert!((plan.total_carbs - 50.0).abs() < f64::EPSILON);
        assert!((plan.total_calories - 800.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_assign_then_clear_dinner() {
        let svc = GlycoService::new_in_memory().unwrap();
        let stew = svc
            .add_recipe(&sample_recipe("Stew", MealType::Dinner, 35.0))
            .unwrap();
        svc.assign_meal_to_plan("u1", day(), MealSlot::Dinner, Some(stew.id))
            .unwrap();
        let plan = svc
            .assign_meal_to_plan("u1", day(), MealSlot::Dinner, None)
            .unwrap();
        assert!(plan.dinner.is_none());
        assert!(plan.total_carbs.abs() < f64::EPSILON);
    }

    #[test]
    fn test_assign_fallback_recipe_by_negative_id() {
        let svc = GlycoService::new_in_memory().unwrap();
        let plan = svc
            .assign_meal_to_plan("u1", day(), MealSlot::Breakfast, Some(-1))
            .unwrap();
        assert_eq!(
            plan.breakfast.as_ref().unwrap().name,
            "Veggie Egg Scramble"
        );
    }

    #[test]
    fn test_assign_unknown_recipe_is_not_retryable() {
        let svc = GlycoService::new_in_memory().unwrap();
        let err = svc
            .assign_meal_to_plan("u1", day(), MealSlot::Lunch, Some(404))
            .unwrap_err();
        assert!(matches!(err, PlanError::RecipeNotFound(404)));
        assert!(!err.is_retryable());
        assert!(svc.get_meal_plan("u1", day()).unwrap().is_none());
    }

    #[test]
    fn test_add_recipe_rejects_blank_name() {
        let svc = GlycoService::new_in_memory().unwrap();
        assert!(svc
            .add_recipe(&sample_recipe("  ", MealType::Snack, 10.0))
            .is_err());
    }

    #[test]
    fn test_import_glucose_csv() {
        let svc = GlycoService::new_in_memory().unwrap();
        let csv = "Timestamp,Glucose\n2024-06-10T07:00:00Z,98\n2024-06-10T12:00:00Z,700\n";
        let summary = svc.import_glucose_csv("u1", csv, false).unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(svc.recent_readings("u1", 10).unwrap().len(), 1);
    }
}
