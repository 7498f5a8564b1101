use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::carbs::max_carbs;
use crate::error::CatalogError;
use crate::models::{DiabetesType, MealType, Recipe};

/// Allowance for rounding differences in catalog nutrition data.
pub const ACCEPT_TOLERANCE_G: u32 = 5;
/// Extra grams allowed when the strict query comes back empty.
pub const RELAX_STEP_G: u32 = 10;
/// Above this recent average, candidates are sorted by ascending carbs.
pub const CARB_SORT_THRESHOLD: f64 = 140.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSort {
    CarbsAscending,
    Name,
}

/// One server-side search against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    pub category: MealType,
    pub max_carbs: u32,
    pub sort: CatalogSort,
    pub limit: usize,
}

/// External recipe catalog.
///
/// Implementations return `Ok(vec![])` when nothing matches and an error only
/// for transport or availability failures.
#[async_trait]
pub trait RecipeCatalog: Send + Sync {
    async fn search_recipes(&self, query: &CatalogQuery) -> Result<Vec<Recipe>, CatalogError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationRequest {
    pub meal: MealType,
    pub category: Option<DiabetesType>,
    pub insulin_dependent: bool,
    pub recent_average: f64,
    pub count: usize,
}

/// Which step of the pipeline produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    Strict,
    Relaxed,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub recipes: Vec<Recipe>,
    pub source: RecommendationSource,
    pub ceiling: u32,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Strict,
    Relaxed,
}

const PIPELINE: [Step; 2] = [Step::Strict, Step::Relaxed];

impl Step {
    const fn source(self) -> RecommendationSource {
        match self {
            Self::Strict => RecommendationSource::Strict,
            Self::Relaxed => RecommendationSource::Relaxed,
        }
    }

    fn query(self, request: &RecommendationRequest, ceiling: u32) -> CatalogQuery {
        let sort = if request.recent_average > CARB_SORT_THRESHOLD {
            CatalogSort::CarbsAscending
        } else {
            CatalogSort::Name
        };
        let max_carbs = match self {
            Self::Strict => ceiling,
            Self::Relaxed => ceiling + RELAX_STEP_G,
        };
        CatalogQuery {
            category: request.meal,
            max_carbs,
            sort,
            limit: request.count,
        }
    }

    fn accept(self, ceiling: u32, candidates: Vec<Recipe>) -> Vec<Recipe> {
        match self {
            Self::Strict => {
                let limit = f64::from(ceiling + ACCEPT_TOLERANCE_G);
                candidates.into_iter().filter(|r| r.carbs <= limit).collect()
            }
            Self::Relaxed => candidates,
        }
    }
}

/// Recommend recipes for a meal under the current carb ceiling.
///
/// Tries a strict catalog query, then a relaxed one, then serves the local
/// fallback set, with the requested meal's recipe first. Catalog failures and
/// timeouts go straight to the fallback; this function never fails and never
/// returns more than `request.count`.
pub async fn recommend(
    request: &RecommendationRequest,
    catalog: &dyn RecipeCatalog,
    timeout: Duration,
) -> Recommendation {
    let ceiling = max_carbs(
        request.category,
        request.insulin_dependent,
        request.recent_average,
    );

    if request.count == 0 {
        return Recommendation {
            recipes: Vec::new(),
            source: RecommendationSource::Strict,
            ceiling,
        };
    }

    for step in PIPELINE {
        let query = step.query(request, ceiling);
        match search_with_timeout(catalog, &query, timeout).await {
            Ok(candidates) => {
                let mut accepted = step.accept(ceiling, candidates);
                if accepted.is_empty() {
                    debug!(?step, ?query, "catalog step yielded nothing");
                    continue;
                }
                accepted.truncate(request.count);
                return Recommendation {
                    recipes: accepted,
                    source: step.source(),
                    ceiling,
                };
            }
            Err(err) => {
                warn!(?step, error = %err, "recipe catalog failed, using fallback recipes");
                break;
            }
        }
    }

    warn!(meal = request.meal.as_str(), ceiling, "serving fallback recipes");
    let mut recipes = fallback_recipes();
    recipes.sort_by_key(|r| r.category != request.meal);
    recipes.truncate(request.count);
    Recommendation {
        recipes,
        source: RecommendationSource::Fallback,
        ceiling,
    }
}

async fn search_with_timeout(
    catalog: &dyn RecipeCatalog,
    query: &CatalogQuery,
    timeout: Duration,
) -> Result<Vec<Recipe>, CatalogError> {
    tokio::time::timeout(timeout, catalog.search_recipes(query))
        .await
        .map_err(|_| CatalogError::Timeout(timeout))?
}

/// The fixed set served when the catalog is unavailable or empty.
///
/// Ids are negative so they never collide with stored recipes.
#[must_use]
pub fn fallback_recipes() -> Vec<Recipe> {
    fn recipe(
        id: i64,
        name: &str,
        category: MealType,
        nutrition: [f64; 7],
        ingredients: &[&str],
    ) -> Recipe {
        let [calories, carbs, protein, fat, fiber, sugar, sodium] = nutrition;
        Recipe {
            id,
            name: name.to_string(),
            category,
            calories,
            carbs,
            protein,
            fat,
            fiber,
            sugar,
            sodium,
            difficulty: Some("easy".to_string()),
            tags: vec!["diabetes-friendly".to_string(), "balanced".to_string()],
            ingredients: ingredients.iter().map(ToString::to_string).collect(),
            instructions: Vec::new(),
            source: "fallback".to_string(),
        }
    }

    vec![
        recipe(
            -1,
            "Veggie Egg Scramble",
            MealType::Breakfast,
            [280.0, 12.0, 20.0, 17.0, 4.0, 5.0, 420.0],
            &["3 eggs", "1 cup spinach", "1/2 bell pepper", "1 slice whole-grain toast"],
        ),
        recipe(
            -2,
            "Grilled Chicken Quinoa Salad",
            MealType::Lunch,
            [420.0, 32.0, 35.0, 16.0, 7.0, 5.0, 480.0],
            &["120g chicken breast", "1/2 cup cooked quinoa", "mixed greens", "olive oil"],
        ),
        recipe(
            -3,
            "Baked Salmon with Roasted Vegetables",
            MealType::Dinner,
            [450.0, 22.0, 34.0, 24.0, 6.0, 7.0, 390.0],
            &["140g salmon fillet", "broccoli", "zucchini", "1/2 cup chickpeas"],
        ),
        recipe(
            -4,
            "Greek Yogurt with Berries and Almonds",
            MealType::Snack,
            [210.0, 18.0, 15.0, 9.0, 4.0, 11.0, 60.0],
            &["170g plain Greek yogurt", "1/2 cup berries", "10 almonds"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn recipe(id: i64, name: &str, carbs: f64) -> Recipe {
        Recipe {
            id,
            name: name.to_string(),
            category: MealType::Lunch,
            calories: 400.0,
            carbs,
            protein: 25.0,
            fat: 12.0,
            fiber: 5.0,
            sugar: 4.0,
            sodium: 300.0,
            difficulty: None,
            tags: vec![],
            ingredients: vec![],
            instructions: vec![],
            source: "catalog".to_string(),
        }
    }

    /// Replays one scripted answer per call and records every query.
    struct ScriptedCatalog {
        answers: Mutex<VecDeque<Result<Vec<Recipe>, CatalogError>>>,
        queries: Mutex<Vec<CatalogQuery>>,
    }

    impl ScriptedCatalog {
        fn new(answers: Vec<Result<Vec<Recipe>, CatalogError>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn queries(&self) -> Vec<CatalogQuery> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RecipeCatalog for ScriptedCatalog {
        async fn search_recipes(
            &self,
            query: &CatalogQuery,
        ) -> Result<Vec<Recipe>, CatalogError> {
            self.queries.lock().unwrap().push(query.clone());
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    struct SlowCatalog;

    #[async_trait]
    impl RecipeCatalog for SlowCatalog {
        async fn search_recipes(
            &self,
            _query: &CatalogQuery,
        ) -> Result<Vec<Recipe>, CatalogError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![recipe(1, "Too Late", 10.0)])
        }
    }

    fn ids(recipes: &[Recipe]) -> Vec<i64> {
        recipes.iter().map(|r| r.id).collect()
    }

    fn request(average: f64, count: usize) -> RecommendationRequest {
        RecommendationRequest {
            meal: MealType::Lunch,
            category: Some(DiabetesType::Type1),
            insulin_dependent: true,
            recent_average: average,
            count,
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_strict_query_shape_and_name_sort() {
        let catalog = ScriptedCatalog::new(vec![Ok(vec![recipe(1, "Bowl", 30.0)])]);
        let rec = recommend(&request(100.0, 3), &catalog, TIMEOUT).await;

        assert_eq!(rec.source, RecommendationSource::Strict);
        assert_eq!(rec.ceiling, 50);
        assert_eq!(
            catalog.queries(),
            vec![CatalogQuery {
                category: MealType::Lunch,
                max_carbs: 50,
                sort: CatalogSort::Name,
                limit: 3,
            }]
        );
    }

    #[tokio::test]
    async fn test_high_average_sorts_by_carbs() {
        let catalog = ScriptedCatalog::new(vec![Ok(vec![recipe(1, "Bowl", 20.0)])]);
        let rec = recommend(&request(150.0, 3), &catalog, TIMEOUT).await;
        assert_eq!(rec.ceiling, 40);
        assert_eq!(catalog.queries()[0].sort, CatalogSort::CarbsAscending);
        assert_eq!(catalog.queries()[0].max_carbs, 40);
    }

    #[tokio::test]
    async fn test_acceptance_filter_allows_five_gram_tolerance() {
        let catalog = ScriptedCatalog::new(vec![Ok(vec![
            recipe(1, "Exact", 50.0),
            recipe(2, "Rounded", 55.0),
            recipe(3, "Too Much", 55.5),
        ])]);
        let rec = recommend(&request(100.0, 5), &catalog, TIMEOUT).await;
        let ids: Vec<i64> = rec.recipes.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(rec.recipes.iter().all(|r| r.carbs <= f64::from(rec.ceiling + 5)));
    }

    #[tokio::test]
    async fn test_never_returns_more_than_count() {
        let many: Vec<Recipe> = (1..=10).map(|i| recipe(i, "Dish", 10.0)).collect();
        let catalog = ScriptedCatalog::new(vec![Ok(many)]);
        let rec = recommend(&request(100.0, 4), &catalog, TIMEOUT).await;
        assert_eq!(rec.recipes.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_strict_result_relaxes_ceiling() {
        let catalog = ScriptedCatalog::new(vec![
            Ok(vec![]),
            Ok(vec![recipe(7, "Pasta", 58.0)]),
        ]);
        let rec = recommend(&request(100.0, 3), &catalog, TIMEOUT).await;

        assert_eq!(rec.source, RecommendationSource::Relaxed);
        assert_eq!(rec.recipes[0].id, 7);
        let queries = catalog.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1].max_carbs, 60);
        assert_eq!(queries[1].category, MealType::Lunch);
    }

    #[tokio::test]
    async fn test_strict_result_filtered_to_nothing_relaxes() {
        let catalog = ScriptedCatalog::new(vec![
            Ok(vec![recipe(1, "Mislabelled", 90.0)]),
            Ok(vec![recipe(2, "Risotto", 59.0)]),
        ]);
        let rec = recommend(&request(100.0, 3), &catalog, TIMEOUT).await;
        assert_eq!(rec.source, RecommendationSource::Relaxed);
        assert_eq!(rec.recipes[0].id, 2);
    }

    #[tokio::test]
    async fn test_both_queries_empty_serves_fallback() {
        let catalog = ScriptedCatalog::new(vec![Ok(vec![]), Ok(vec![])]);
        let rec = recommend(&request(100.0, 4), &catalog, TIMEOUT).await;
        assert_eq!(rec.source, RecommendationSource::Fallback);
        assert_eq!(ids(&rec.recipes), vec![-2, -1, -3, -4]);
        assert_eq!(catalog.queries().len(), 2);
    }

    #[tokio::test]
    async fn test_catalog_failure_serves_fallback_without_retry() {
        let catalog = ScriptedCatalog::new(vec![Err(CatalogError::Status(503))]);
        let rec = recommend(&request(100.0, 4), &catalog, TIMEOUT).await;
        assert_eq!(rec.source, RecommendationSource::Fallback);
        assert_eq!(rec.recipes.len(), 4);
        assert_eq!(catalog.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_relaxed_failure_serves_fallback() {
        let catalog = ScriptedCatalog::new(vec![
            Ok(vec![]),
            Err(CatalogError::Transport("connection reset".to_string())),
        ]);
        let rec = recommend(&request(100.0, 4), &catalog, TIMEOUT).await;
        assert_eq!(rec.source, RecommendationSource::Fallback);
        assert_eq!(ids(&rec.recipes), vec![-2, -1, -3, -4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_treated_as_failure() {
        let rec = recommend(&request(100.0, 4), &SlowCatalog, Duration::from_secs(2)).await;
        assert_eq!(rec.source, RecommendationSource::Fallback);
        assert_eq!(rec.recipes.len(), 4);
    }

    #[tokio::test]
    async fn test_fallback_respects_count() {
        let catalog = ScriptedCatalog::new(vec![Err(CatalogError::Status(500))]);
        let rec = recommend(&request(100.0, 2), &catalog, TIMEOUT).await;
        assert_eq!(ids(&rec.recipes), vec![-2, -1]);
    }

    #[tokio::test]
    async fn test_fallback_leads_with_requested_meal() {
        let catalog = ScriptedCatalog::new(vec![Err(CatalogError::Status(503))]);
        let dinner = RecommendationRequest {
            meal: MealType::Dinner,
            ..request(100.0, 1)
        };
        let rec = recommend(&dinner, &catalog, TIMEOUT).await;
        assert_eq!(rec.source, RecommendationSource::Fallback);
        assert_eq!(ids(&rec.recipes), vec![-3]);
        assert_eq!(rec.recipes[0].name, "Baked Salmon with Roasted Vegetables");
    }

    #[tokio::test]
    async fn test_zero_count_skips_catalog() {
        let catalog = ScriptedCatalog::new(vec![]);
        let rec = recommend(&request(100.0, 0), &catalog, TIMEOUT).await;
        assert!(rec.recipes.is_empty());
        assert!(catalog.queries().is_empty());
    }

    #[test]
    fn test_fallback_set_is_four_balanced_recipes() {
        let set = fallback_recipes();
        assert_eq!(set.len(), 4);
        assert!(set.iter().all(|r| r.id < 0));
        assert!(set.iter().all(|r| r.carbs <= 35.0 && r.protein >= 15.0));
    }
}
