mod catalog;
mod commands;
mod config;
mod server;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::catalog::RestCatalogClient;
use crate::commands::{
    RecipeDetails, RecipeNutrition, cmd_carbs, cmd_glucose_check, cmd_glucose_delete,
    cmd_glucose_history, cmd_glucose_import, cmd_glucose_log, cmd_glucose_trend, cmd_plan_assign,
    cmd_plan_clear, cmd_plan_remind, cmd_plan_show, cmd_plan_snack, cmd_profile_set,
    cmd_profile_show, cmd_recipe_add, cmd_recipe_list, cmd_recipe_show, cmd_recommend,
};
use crate::config::Config;
use glyco_core::recommend::RecipeCatalog;
use glyco_core::service::GlycoService;

#[derive(Parser)]
#[command(
    name = "glyco",
    version,
    about = "Glucose log and carb-aware meal planner",
    long_about = "Log blood glucose readings, see how they are trending, and get meal \
                  suggestions that fit a carbohydrate ceiling derived from your profile \
                  and recent readings.\n\nNot a medical device. Follow your care team's advice."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log, review and import glucose readings
    Glucose {
        #[command(subcommand)]
        command: GlucoseCommands,
    },
    /// Manage your diabetes profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Show your per-meal carbohydrate ceiling
    Carbs {
        /// Override the diabetes type: type1, type2, gestational, prediabetes
        #[arg(long = "type")]
        diabetes_type: Option<String>,
        /// Override insulin use (true/false)
        #[arg(long)]
        insulin: Option<bool>,
        /// Override the recent average (mg/dL)
        #[arg(long)]
        average: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Suggest recipes for a meal under your carb ceiling
    Recommend {
        /// Meal: breakfast, lunch, dinner, snack
        meal: String,
        /// Number of suggestions
        #[arg(short, long, default_value = "3")]
        count: usize,
        /// Use stored recipes even when a remote catalog is configured
        #[arg(long)]
        offline: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build a day's meal plan
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Manage stored recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum GlucoseCommands {
    /// Record a reading
    Log {
        /// Glucose value in mg/dL (20-600)
        value: i32,
        /// Context: fasting, pre_meal, post_meal, bedtime, random, exercise
        #[arg(short, long)]
        context: Option<String>,
        /// When it was taken ("YYYY-MM-DD HH:MM", "HH:MM" or RFC 3339; default: now)
        #[arg(long)]
        at: Option<String>,
        /// Optional note
        #[arg(long)]
        note: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent readings
    History {
        /// Only readings from the last N days (at most 3650)
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=3650))]
        days: Option<u32>,
        /// Maximum readings to show when --days is not given
        #[arg(short, long, default_value = "20")]
        limit: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Classify a value without recording it
    Check {
        /// Glucose value in mg/dL
        value: i32,
        /// Context: fasting, pre_meal, post_meal, bedtime, random, exercise
        #[arg(short, long)]
        context: Option<String>,
        /// Diabetes type to classify against (default: from profile)
        #[arg(long = "type")]
        diabetes_type: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Summarize the last week of readings
    Trend {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a reading by ID
    Delete {
        /// Reading ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import readings from a meter CSV export (Timestamp, Glucose[, Context, Note])
    Import {
        /// Path to the CSV file
        file: PathBuf,
        /// Preview import without making changes
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Create or update your profile (only the given fields change)
    Set {
        /// Diabetes type: type1, type2, gestational, prediabetes
        #[arg(long = "type")]
        diabetes_type: Option<String>,
        /// Whether you use insulin (true/false)
        #[arg(long)]
        insulin: Option<bool>,
        /// Comma-separated medication list (replaces the stored list)
        #[arg(long, value_delimiter = ',')]
        medications: Option<Vec<String>>,
        /// Your usual average blood sugar (mg/dL), used until enough readings exist
        #[arg(long)]
        average: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show your profile and target ranges
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Show the plan for a day
    Show {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Put a recipe into a slot
    Assign {
        /// Slot: breakfast, lunch, dinner
        slot: String,
        /// Recipe ID (negative IDs are the built-in suggestions)
        #[arg(allow_negative_numbers = true)]
        recipe_id: i64,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Empty a slot
    Clear {
        /// Slot: breakfast, lunch, dinner
        slot: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a snack idea to the day
    Snack {
        /// Snack description
        text: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a reminder to the day
    Remind {
        /// Reminder text
        text: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Store a recipe (nutrition per serving)
    Add {
        /// Recipe name
        name: String,
        /// Meal: breakfast, lunch, dinner, snack
        #[arg(short, long)]
        meal: String,
        #[arg(long)]
        calories: f64,
        /// Carbohydrates in grams
        #[arg(long)]
        carbs: f64,
        #[arg(long, default_value = "0")]
        protein: f64,
        #[arg(long, default_value = "0")]
        fat: f64,
        #[arg(long, default_value = "0")]
        fiber: f64,
        #[arg(long, default_value = "0")]
        sugar: f64,
        /// Sodium in mg
        #[arg(long, default_value = "0")]
        sodium: f64,
        /// easy, medium or hard
        #[arg(long)]
        difficulty: Option<String>,
        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Ingredient line (repeatable)
        #[arg(long = "ingredient")]
        ingredients: Vec<String>,
        /// Instruction step (repeatable, in order)
        #[arg(long = "step")]
        steps: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored recipes
    List {
        /// Only this meal: breakfast, lunch, dinner, snack
        #[arg(short, long)]
        meal: Option<String>,
        /// Search names and tags
        #[arg(short, long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recipe details
    Show {
        /// Recipe ID
        #[arg(allow_negative_numbers = true)]
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Diagnostics go to stderr so `--json` output on stdout stays parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let svc = GlycoService::new(&config.db_path.to_string_lossy())?;
    let user = config.user_id.as_str();
    tracing::debug!(db = %config.db_path.display(), user, "opened local store");

    match cli.command {
        Commands::Glucose { command } => match command {
            GlucoseCommands::Log {
                value,
                context,
                at,
                note,
                json,
            } => cmd_glucose_log(&svc, user, value, context, at, note, json),
            GlucoseCommands::History { days, limit, json } => {
                cmd_glucose_history(&svc, user, days, limit, json)
            }
            GlucoseCommands::Check {
                value,
                context,
                diabetes_type,
                json,
            } => cmd_glucose_check(&svc, user, value, context, diabetes_type, json),
            GlucoseCommands::Trend { json } => cmd_glucose_trend(&svc, user, json),
            GlucoseCommands::Delete { id, json } => cmd_glucose_delete(&svc, user, id, json),
            GlucoseCommands::Import {
                file,
                dry_run,
                json,
            } => cmd_glucose_import(&svc, user, &file, dry_run, json),
        },
        Commands::Profile { command } => match command {
            ProfileCommands::Set {
                diabetes_type,
                insulin,
                medications,
                average,
                json,
            } => cmd_profile_set(&svc, user, diabetes_type, insulin, medications, average, json),
            ProfileCommands::Show { json } => cmd_profile_show(&svc, user, json),
        },
        Commands::Carbs {
            diabetes_type,
            insulin,
            average,
            json,
        } => cmd_carbs(&svc, user, diabetes_type, insulin, average, json),
        Commands::Recommend {
            meal,
            count,
            offline,
            json,
        } => cmd_recommend(&svc, &config, &meal, count, offline, json).await,
        Commands::Plan { command } => match command {
            PlanCommands::Show { date, json } => cmd_plan_show(&svc, user, date, json),
            PlanCommands::Assign {
                slot,
                recipe_id,
                date,
                json,
            } => cmd_plan_assign(&svc, user, &slot, recipe_id, date, json),
            PlanCommands::Clear { slot, date, json } => {
                cmd_plan_clear(&svc, user, &slot, date, json)
            }
            PlanCommands::Snack { text, date, json } => {
                cmd_plan_snack(&svc, user, &text, date, json)
            }
            PlanCommands::Remind { text, date, json } => {
                cmd_plan_remind(&svc, user, &text, date, json)
            }
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::Add {
                name,
                meal,
                calories,
                carbs,
                protein,
                fat,
                fiber,
                sugar,
                sodium,
                difficulty,
                tags,
                ingredients,
                steps,
                json,
            } => cmd_recipe_add(
                &svc,
                &name,
                &meal,
                RecipeNutrition {
                    calories,
                    carbs,
                    protein,
                    fat,
                    fiber,
                    sugar,
                    sodium,
                },
                RecipeDetails {
                    difficulty,
                    tags,
                    ingredients,
                    steps,
                },
                json,
            ),
            RecipeCommands::List { meal, search, json } => {
                cmd_recipe_list(&svc, meal, search, json)
            }
            RecipeCommands::Show { id, json } => cmd_recipe_show(&svc, id, json),
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let (api_key, new_api_key) = if no_auth {
                (None, false)
            } else {
                let (key, new) = config.load_or_create_api_key()?;
                (Some(key), new)
            };
            let catalog = match &config.catalog {
                Some(settings) => Some(Arc::new(RestCatalogClient::new(
                    settings,
                    config.catalog_timeout,
                )?) as Arc<dyn RecipeCatalog>),
                None => None,
            };
            server::start_server(
                svc,
                server::ServerOptions {
                    port,
                    bind,
                    api_key,
                    new_api_key,
                    catalog,
                    catalog_timeout: config.catalog_timeout,
                },
            )
            .await
        }
    }
}
