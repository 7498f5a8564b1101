use async_trait::async_trait;
use serde::Deserialize;

use crate::error::CatalogError;
use crate::models::{MealType, Recipe, validate_meal_type};
use crate::recommend::{CatalogQuery, CatalogSort, RecipeCatalog};

/// A row of the remote `recipes` table.
#[derive(Debug, Deserialize)]
pub struct CatalogRecipeRow {
    pub id: i64,
    pub name: Option<String>,
    pub category: Option<String>,
    pub calories: Option<f64>,
    pub carbs: Option<f64>,
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub fiber: Option<f64>,
    pub sugar: Option<f64>,
    pub sodium: Option<f64>,
    pub difficulty: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub ingredients: Option<Vec<String>>,
    #[serde(default)]
    pub instructions: Option<Vec<String>>,
}

/// Convert a catalog row, dropping rows without a name, category, or carbs.
#[must_use]
pub fn row_to_recipe(row: CatalogRecipeRow) -> Option<Recipe> {
    let name = row.name.filter(|n| !n.trim().is_empty())?;
    let category = validate_meal_type(row.category.as_deref()?).ok()?;
    let carbs = row.carbs?;

    Some(Recipe {
        id: row.id,
        name,
        category,
        calories: row.calories.unwrap_or(0.0),
        carbs,
        protein: row.protein.unwrap_or(0.0),
        fat: row.fat.unwrap_or(0.0),
        fiber: row.fiber.unwrap_or(0.0),
        sugar: row.sugar.unwrap_or(0.0),
        sodium: row.sodium.unwrap_or(0.0),
        difficulty: row.difficulty.filter(|d| !d.is_empty()),
        tags: row.tags.unwrap_or_default(),
        ingredients: row.ingredients.unwrap_or_default(),
        instructions: row.instructions.unwrap_or_default(),
        source: "catalog".to_string(),
    })
}

/// PostgREST filter parameters for a catalog query.
#[must_use]
pub fn query_params(query: &CatalogQuery) -> Vec<(&'static str, String)> {
    let order = match query.sort {
        CatalogSort::CarbsAscending => "carbs.asc",
        CatalogSort::Name => "name.asc",
    };
    vec![
        ("select", "*".to_string()),
        ("category", format!("eq.{}", query.category.as_str())),
        ("carbs", format!("lte.{}", query.max_carbs)),
        ("order", order.to_string()),
        ("limit", query.limit.to_string()),
    ]
}

/// Catalog answered from an in-memory snapshot of locally stored recipes.
///
/// Applies the same filter and ordering the remote catalog does, so the
/// recommendation pipeline behaves identically offline.
pub struct LocalCatalog {
    recipes: Vec<Recipe>,
}

impl LocalCatalog {
    #[must_use]
    pub const fn new(recipes: Vec<Recipe>) -> Self {
        Self { recipes }
    }

    fn matching(&self, category: MealType, max_carbs: u32) -> Vec<Recipe> {
        let limit = f64::from(max_carbs);
        self.recipes
            .iter()
            .filter(|r| r.category == category && r.carbs <= limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RecipeCatalog for LocalCatalog {
    async fn search_recipes(&self, query: &CatalogQuery) -> Result<Vec<Recipe>, CatalogError> {
        let mut found = self.matching(query.category, query.max_carbs);
        match query.sort {
            CatalogSort::CarbsAscending => found.sort_by(|a, b| a.carbs.total_cmp(&b.carbs)),
            CatalogSort::Name => found.sort_by_key(|r| r.name.to_lowercase()),
        }
        found.truncate(query.limit);
        Ok(found)
    }
}
