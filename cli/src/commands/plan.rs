use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use glyco_core::error::PlanError;
use glyco_core::models::{MEAL_SLOTS, MealPlan, validate_meal_slot};
use glyco_core::service::GlycoService;

use super::helpers::{json_error, no_neg_zero, parse_date, report_plan_error, truncate};

pub(crate) fn cmd_plan_show(
    svc: &GlycoService,
    user_id: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let Some(plan) = svc.get_meal_plan(user_id, date)? else {
        let message = format!("No meal plan for {}", date.format("%Y-%m-%d"));
        if json {
            println!("{}", json_error(&message));
        } else {
            eprintln!("{message}. Use `glyco plan assign` to start one.");
        }
        std::process::exit(2);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan);
    }

    Ok(())
}

pub(crate) fn cmd_plan_assign(
    svc: &GlycoService,
    user_id: &str,
    slot: &str,
    recipe_id: i64,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let slot = validate_meal_slot(slot)?;
    let date = parse_date(date)?;
    let result = svc.assign_meal_to_plan(user_id, date, slot, Some(recipe_id));
    finish(result, json)
}

pub(crate) fn cmd_plan_clear(
    svc: &GlycoService,
    user_id: &str,
    slot: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let slot = validate_meal_slot(slot)?;
    let date = parse_date(date)?;
    let result = svc.assign_meal_to_plan(user_id, date, slot, None);
    finish(result, json)
}

pub(crate) fn cmd_plan_snack(
    svc: &GlycoService,
    user_id: &str,
    snack: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    finish(svc.add_snack(user_id, date, snack), json)
}

pub(crate) fn cmd_plan_remind(
    svc: &GlycoService,
    user_id: &str,
    reminder: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    finish(svc.add_reminder(user_id, date, reminder), json)
}

fn finish(result: Result<MealPlan, PlanError>, json: bool) -> Result<()> {
    match result {
        Ok(plan) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan);
            }
            Ok(())
        }
        Err(e) => {
            report_plan_error(&e, json);
            std::process::exit(1);
        }
    }
}

fn print_plan(plan: &MealPlan) {
    #[derive(Tabled)]
    struct SlotRow {
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Recipe")]
        recipe: String,
        #[tabled(rename = "Kcal")]
        calories: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Protein")]
        protein: String,
    }

    println!("Meal plan for {}\n", plan.date.format("%A %Y-%m-%d"));

    let mut rows: Vec<SlotRow> = MEAL_SLOTS
        .iter()
        .map(|slot| match plan.slot(*slot) {
            Some(m) => SlotRow {
                meal: slot.as_str().to_string(),
                recipe: format!("{} (#{})", truncate(&m.name, 30), m.recipe_id),
                calories: format!("{:.0}", m.calories),
                carbs: format!("{:.0}g", m.carbs),
                protein: format!("{:.0}g", m.protein),
            },
            None => SlotRow {
                meal: slot.as_str().to_string(),
                recipe: "-".to_string(),
                calories: String::new(),
                carbs: String::new(),
                protein: String::new(),
            },
        })
        .collect();
    rows.push(SlotRow {
        meal: "TOTAL".to_string(),
        recipe: String::new(),
        calories: format!("{:.0}", no_neg_zero(plan.total_calories)),
        carbs: format!("{:.0}g", no_neg_zero(plan.total_carbs)),
        protein: format!("{:.0}g", no_neg_zero(plan.total_protein)),
    });

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    if !plan.snacks.is_empty() {
        println!("\nSnacks:");
        for s in &plan.snacks {
            println!("  - {s}");
        }
    }
    if !plan.reminders.is_empty() {
        println!("\nReminders:");
        for r in &plan.reminders {
            println!("  - {r}");
        }
    }
}
