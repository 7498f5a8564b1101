use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::models::{
    DiabetesProfile, DiabetesType, GlucoseReading, MealPlan, MealType, NewGlucoseReading,
    NewRecipe, ReadingContext, Recipe, validate_meal_type,
};
use crate::planner::PlanStore;

const RECIPE_COLUMNS: &str = "id, name, category, calories, carbs, protein, fat, fiber, sugar, \
     sodium, difficulty, tags, ingredients, instructions, source";

const READING_COLUMNS: &str = "id, uuid, user_id, value, recorded_at, context, note, created_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS profiles (
                    user_id TEXT PRIMARY KEY,
                    diabetes_type TEXT,
                    insulin_dependent INTEGER NOT NULL DEFAULT 0,
                    medications TEXT NOT NULL DEFAULT '[]',
                    average_blood_sugar REAL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS glucose_readings (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    user_id TEXT NOT NULL,
                    value INTEGER NOT NULL CHECK (value BETWEEN 20 AND 600),
                    recorded_at TEXT NOT NULL,
                    context TEXT,
                    note TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_glucose_user_time
                    ON glucose_readings(user_id, recorded_at);

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    category TEXT NOT NULL,
                    calories REAL NOT NULL,
                    carbs REAL NOT NULL,
                    protein REAL NOT NULL,
                    fat REAL NOT NULL,
                    fiber REAL NOT NULL DEFAULT 0,
                    sugar REAL NOT NULL DEFAULT 0,
                    sodium REAL NOT NULL DEFAULT 0,
                    difficulty TEXT,
                    tags TEXT NOT NULL DEFAULT '[]',
                    ingredients TEXT NOT NULL DEFAULT '[]',
                    instructions TEXT NOT NULL DEFAULT '[]',
                    source TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_recipes_category_carbs ON recipes(category, carbs);
                CREATE INDEX IF NOT EXISTS idx_recipes_name ON recipes(name);

                CREATE TABLE IF NOT EXISTS meal_plans (
                    user_id TEXT NOT NULL,
                    date TEXT NOT NULL,
                    breakfast TEXT,
                    lunch TEXT,
                    dinner TEXT,
                    snacks TEXT NOT NULL DEFAULT '[]',
                    reminders TEXT NOT NULL DEFAULT '[]',
                    total_calories REAL NOT NULL DEFAULT 0,
                    total_carbs REAL NOT NULL DEFAULT 0,
                    total_protein REAL NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, date)
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn reading_from_row(row: &rusqlite::Row) -> rusqlite::Result<GlucoseReading> {
        let recorded_at: String = row.get(4)?;
        let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?
            .with_timezone(&Utc);
        Ok(GlucoseReading {
            id: row.get(0)?,
            uuid: row.get(1)?,
            user_id: row.get(2)?,
            value: row.get(3)?,
            recorded_at,
            context: row
                .get::<_, Option<String>>(5)?
                .as_deref()
                .and_then(ReadingContext::parse),
            note: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        let category: String = row.get(2)?;
        let category = validate_meal_type(&category)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;
        Ok(Recipe {
            id: row.get(0)?,
            name: row.get(1)?,
            category,
            calories: row.get(3)?,
            carbs: row.get(4)?,
            protein: row.get(5)?,
            fat: row.get(6)?,
            fiber: row.get(7)?,
            sugar: row.get(8)?,
            sodium: row.get(9)?,
            difficulty: row.get(10)?,
            tags: json_column(row, 11)?,
            ingredients: json_column(row, 12)?,
            instructions: json_column(row, 13)?,
            source: row.get(14)?,
        })
    }

    fn profile_from_row(row: &rusqlite::Row) -> rusqlite::Result<DiabetesProfile> {
        Ok(DiabetesProfile {
            user_id: row.get(0)?,
            diabetes_type: row
                .get::<_, Option<String>>(1)?
                .as_deref()
                .and_then(DiabetesType::parse),
            insulin_dependent: row.get(2)?,
            medications: json_column(row, 3)?,
            average_blood_sugar: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    // Expects columns:
    // 0: user_id, 1: date, 2: breakfast, 3: lunch, 4: dinner, 5: snacks,
    // 6: reminders, 7: total_calories, 8: total_carbs, 9: total_protein,
    // 10: updated_at
    fn meal_plan_from_row(row: &rusqlite::Row) -> rusqlite::Result<MealPlan> {
        let date: String = row.get(1)?;
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
        Ok(MealPlan {
            user_id: row.get(0)?,
            date,
            breakfast: optional_json_column(row, 2)?,
            lunch: optional_json_column(row, 3)?,
            dinner: optional_json_column(row, 4)?,
            snacks: json_column(row, 5)?,
            reminders: json_column(row, 6)?,
            total_calories: row.get(7)?,
            total_carbs: row.get(8)?,
            total_protein: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    // --- Profiles ---

    pub fn upsert_profile(&self, profile: &DiabetesProfile) -> Result<DiabetesProfile> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO profiles (user_id, diabetes_type, insulin_dependent, medications, average_blood_sugar, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                diabetes_type = excluded.diabetes_type,
                insulin_dependent = excluded.insulin_dependent,
                medications = excluded.medications,
                average_blood_sugar = excluded.average_blood_sugar,
                updated_at = excluded.updated_at",
            params![
                profile.user_id,
                profile.diabetes_type.map(DiabetesType::as_str),
                profile.insulin_dependent,
                to_json(&profile.medications)?,
                profile.average_blood_sugar,
                now,
            ],
        )?;
        self.get_profile(&profile.user_id)?
            .context("Profile not found after upsert")
    }

    pub fn get_profile(&self, user_id: &str) -> Result<Option<DiabetesProfile>> {
        let profile = self
            .conn
            .query_row(
                "SELECT user_id, diabetes_type, insulin_dependent, medications, average_blood_sugar, updated_at
                 FROM profiles WHERE user_id = ?1",
                params![user_id],
                Self::profile_from_row,
            )
            .optional()?;
        Ok(profile)
    }

    // --- Glucose readings ---

    pub fn insert_reading(&self, reading: &NewGlucoseReading) -> Result<GlucoseReading> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO glucose_readings (uuid, user_id, value, recorded_at, context, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                uuid,
                reading.user_id,
                reading.value,
                stamp(reading.recorded_at),
                reading.context.map(ReadingContext::as_str),
                reading.note,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_reading(id)
    }

    pub fn get_reading(&self, id: i64) -> Result<GlucoseReading> {
        self.conn
            .query_row(
                &format!("SELECT {READING_COLUMNS} FROM glucose_readings WHERE id = ?1"),
                params![id],
                Self::reading_from_row,
            )
            .context("Glucose reading not found")
    }

    /// Readings recorded in the `window_days` days up to `now`, most recent first.
    pub fn get_glucose_readings(
        &self,
        user_id: &str,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<GlucoseReading>> {
        let since = Duration::try_days(window_days)
            .and_then(|window| now.checked_sub_signed(window))
            .with_context(|| format!("Reading window of {window_days} days is out of range"))?;
        let since = stamp(since);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {READING_COLUMNS} FROM glucose_readings
             WHERE user_id = ?1 AND recorded_at >= ?2 AND recorded_at <= ?3
             ORDER BY recorded_at DESC, id DESC"
        ))?;
        let readings = stmt
            .query_map(params![user_id, since, stamp(now)], Self::reading_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(readings)
    }

    /// The latest `limit` readings regardless of age, most recent first.
    pub fn recent_readings(&self, user_id: &str, limit: i64) -> Result<Vec<GlucoseReading>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {READING_COLUMNS} FROM glucose_readings
             WHERE user_id = ?1
             ORDER BY recorded_at DESC, id DESC
             LIMIT ?2"
        ))?;
        let readings = stmt
            .query_map(params![user_id, limit], Self::reading_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(readings)
    }

    pub fn reading_exists(
        &self,
        user_id: &str,
        recorded_at: DateTime<Utc>,
        value: i32,
    ) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM glucose_readings
                 WHERE user_id = ?1 AND recorded_at = ?2 AND value = ?3 LIMIT 1",
                params![user_id, stamp(recorded_at), value],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn delete_reading(&self, user_id: &str, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM glucose_readings WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }

    // --- Recipes ---

    pub fn insert_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO recipes (name, category, calories, carbs, protein, fat, fiber, sugar, sodium, difficulty, tags, ingredients, instructions, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                recipe.name.trim(),
                recipe.category.as_str(),
                recipe.calories,
                recipe.carbs,
                recipe.protein,
                recipe.fat,
                recipe.fiber,
                recipe.sugar,
                recipe.sodium,
                recipe.difficulty,
                to_json(&recipe.tags)?,
                to_json(&recipe.ingredients)?,
                to_json(&recipe.instructions)?,
                recipe.source,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_recipe(id)?.context("Recipe not found after insert")
    }

    pub fn get_recipe(&self, id: i64) -> Result<Option<Recipe>> {
        let recipe = self
            .conn
            .query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"),
                params![id],
                Self::recipe_from_row,
            )
            .optional()?;
        Ok(recipe)
    }

    pub fn list_recipes(&self, category: Option<MealType>) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes
             WHERE ?1 IS NULL OR category = ?1
             ORDER BY name COLLATE NOCASE"
        ))?;
        let recipes = stmt
            .query_map(
                params![category.map(MealType::as_str)],
                Self::recipe_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    /// Case-insensitive substring match on name or tags.
    pub fn search_recipes(&self, query: &str) -> Result<Vec<Recipe>> {
        let escaped = query
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{escaped}%");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes
             WHERE name LIKE ?1 ESCAPE '\\' OR tags LIKE ?1 ESCAPE '\\'
             ORDER BY name COLLATE NOCASE LIMIT 50"
        ))?;
        let recipes = stmt
            .query_map(params![pattern], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }
}

impl PlanStore for Database {
    fn get_meal_plan(&self, user_id: &str, date: NaiveDate) -> Result<Option<MealPlan>> {
        let plan = self
            .conn
            .query_row(
                "SELECT user_id, date, breakfast, lunch, dinner, snacks, reminders,
                        total_calories, total_carbs, total_protein, updated_at
                 FROM meal_plans WHERE user_id = ?1 AND date = ?2",
                params![user_id, date.format("%Y-%m-%d").to_string()],
                Self::meal_plan_from_row,
            )
            .optional()?;
        Ok(plan)
    }

    fn put_meal_plan(&self, plan: &MealPlan) -> Result<()> {
        let updated_at = if plan.updated_at.is_empty() {
            Local::now().to_rfc3339()
        } else {
            plan.updated_at.clone()
        };
        self.conn.execute(
            "INSERT INTO meal_plans (user_id, date, breakfast, lunch, dinner, snacks, reminders, total_calories, total_carbs, total_protein, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(user_id, date) DO UPDATE SET
                breakfast = excluded.breakfast,
                lunch = excluded.lunch,
                dinner = excluded.dinner,
                snacks = excluded.snacks,
                reminders = excluded.reminders,
                total_calories = excluded.total_calories,
                total_carbs = excluded.total_carbs,
                total_protein = excluded.total_protein,
                updated_at = excluded.updated_at",
            params![
                plan.user_id,
                plan.date.format("%Y-%m-%d").to_string(),
                plan.breakfast.as_ref().map(to_json).transpose()?,
                plan.lunch.as_ref().map(to_json).transpose()?,
                plan.dinner.as_ref().map(to_json).transpose()?,
                to_json(&plan.snacks)?,
                to_json(&plan.reminders)?,
                plan.total_calories,
                plan.total_carbs,
                plan.total_protein,
                updated_at,
            ],
        )
        .context("Failed to save meal plan")?;
        Ok(())
    }
}

/// Timestamps are stored as UTC RFC 3339 with a fixed width so that text
/// ordering matches time ordering.
fn stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("Failed to encode column as JSON")
}

fn json_column<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_json_column<T: DeserializeOwned>(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}
