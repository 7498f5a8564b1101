mod glucose;
mod helpers;
mod plan;
mod profile;
mod recipe;
mod recommend;

pub(crate) use glucose::{
    cmd_glucose_check, cmd_glucose_delete, cmd_glucose_history, cmd_glucose_import,
    cmd_glucose_log, cmd_glucose_trend,
};
pub(crate) use plan::{
    cmd_plan_assign, cmd_plan_clear, cmd_plan_remind, cmd_plan_show, cmd_plan_snack,
};
pub(crate) use profile::{cmd_profile_set, cmd_profile_show};
pub(crate) use recipe::{
    RecipeDetails, RecipeNutrition, cmd_recipe_add, cmd_recipe_list, cmd_recipe_show,
};
pub(crate) use recommend::{cmd_carbs, cmd_recommend};
