use anyhow::Result;

use glyco_core::models::{NewRecipe, Recipe, validate_meal_type};
use glyco_core::service::GlycoService;

use super::helpers::{json_error, no_neg_zero, print_recipe_table};

/// Nutrition values for `recipe add`, per serving.
pub(crate) struct RecipeNutrition {
    pub calories: f64,
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub sodium: f64,
}

pub(crate) struct RecipeDetails {
    pub difficulty: Option<String>,
    pub tags: Vec<String>,
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
}

pub(crate) fn cmd_recipe_add(
    svc: &GlycoService,
    name: &str,
    meal: &str,
    nutrition: RecipeNutrition,
    details: RecipeDetails,
    json: bool,
) -> Result<()> {
    let recipe = svc.add_recipe(&NewRecipe {
        name: name.trim().to_string(),
        category: validate_meal_type(meal)?,
        calories: nutrition.calories,
        carbs: nutrition.carbs,
        protein: nutrition.protein,
        fat: nutrition.fat,
        fiber: nutrition.fiber,
        sugar: nutrition.sugar,
        sodium: nutrition.sodium,
        difficulty: details.difficulty,
        tags: details.tags,
        ingredients: details.ingredients,
        instructions: details.steps,
        source: "custom".to_string(),
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        println!(
            "Saved recipe '{}' (id {}) with {:.0}g carbs",
            recipe.name, recipe.id, recipe.carbs
        );
    }

    Ok(())
}

pub(crate) fn cmd_recipe_list(
    svc: &GlycoService,
    meal: Option<String>,
    search: Option<String>,
    json: bool,
) -> Result<()> {
    let category = meal.as_deref().map(validate_meal_type).transpose()?;
    let mut recipes = match search {
        Some(q) => svc.search_recipes(&q)?,
        None => svc.list_recipes(category)?,
    };
    if let Some(c) = category {
        recipes.retain(|r| r.category == c);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
    } else if recipes.is_empty() {
        eprintln!("No recipes found. Use `glyco recipe add` to create one.");
        std::process::exit(2);
    } else {
        print_recipe_table(&recipes);
    }

    Ok(())
}

pub(crate) fn cmd_recipe_show(svc: &GlycoService, id: i64, json: bool) -> Result<()> {
    let Some(recipe) = svc.get_recipe(id)? else {
        let message = format!("Recipe {id} not found");
        if json {
            println!("{}", json_error(&message));
        } else {
            eprintln!("{message}");
        }
        std::process::exit(2);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        print_recipe(&recipe);
    }

    Ok(())
}

fn print_recipe(recipe: &Recipe) {
    println!("{} (id {}, {})", recipe.name, recipe.id, recipe.category.as_str());
    if let Some(d) = &recipe.difficulty {
        println!("  Difficulty: {d}");
    }
    if !recipe.tags.is_empty() {
        println!("  Tags: {}", recipe.tags.join(", "));
    }
    println!(
        "\n  {:.0} kcal | {:.1}g carbs | {:.1}g protein | {:.1}g fat",
        no_neg_zero(recipe.calories),
        no_neg_zero(recipe.carbs),
        no_neg_zero(recipe.protein),
        no_neg_zero(recipe.fat)
    );
    println!(
        "  {:.1}g fiber | {:.1}g sugar | {:.0}mg sodium",
        no_neg_zero(recipe.fiber),
        no_neg_zero(recipe.sugar),
        no_neg_zero(recipe.sodium)
    );

    if !recipe.ingredients.is_empty() {
        println!("\n  Ingredients:");
        for item in &recipe.ingredients {
            println!("    - {item}");
        }
    }
    if !recipe.instructions.is_empty() {
        println!("\n  Steps:");
        for (i, step) in recipe.instructions.iter().enumerate() {
            println!("    {}. {step}", i + 1);
        }
    }
}
