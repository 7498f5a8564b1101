use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Lowest glucose value (mg/dL) a meter can report.
pub const GLUCOSE_MIN: i32 = 20;
/// Highest glucose value (mg/dL) a meter can report.
pub const GLUCOSE_MAX: i32 = 600;

// --- Enumerations ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiabetesType {
    Type1,
    Type2,
    Gestational,
    Prediabetes,
}

impl DiabetesType {
    pub const ALL: [Self; 4] = [
        Self::Type1,
        Self::Type2,
        Self::Gestational,
        Self::Prediabetes,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Type1 => "type1",
            Self::Type2 => "type2",
            Self::Gestational => "gestational",
            Self::Prediabetes => "prediabetes",
        }
    }

    /// Lenient parse: accepts "type1", "Type 1", "t1", "type_1", etc.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "type1" | "t1" | "t1d" => Some(Self::Type1),
            "type2" | "t2" | "t2d" => Some(Self::Type2),
            "gestational" | "gdm" => Some(Self::Gestational),
            "prediabetes" | "prediabetic" => Some(Self::Prediabetes),
            _ => None,
        }
    }
}

/// Situational tag recorded with a glucose reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingContext {
    Fasting,
    PreMeal,
    PostMeal,
    Bedtime,
    Random,
    Exercise,
}

impl ReadingContext {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fasting => "fasting",
            Self::PreMeal => "pre_meal",
            Self::PostMeal => "post_meal",
            Self::Bedtime => "bedtime",
            Self::Random => "random",
            Self::Exercise => "exercise",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fasting" => Some(Self::Fasting),
            "pre_meal" | "premeal" | "before_meal" => Some(Self::PreMeal),
            "post_meal" | "postmeal" | "after_meal" => Some(Self::PostMeal),
            "bedtime" | "bed" => Some(Self::Bedtime),
            "random" => Some(Self::Random),
            "exercise" => Some(Self::Exercise),
            _ => None,
        }
    }
}

/// Recipe category as published by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
        }
    }
}

/// One of the three positions in a day's plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
}

pub const MEAL_SLOTS: [MealSlot; 3] = [MealSlot::Breakfast, MealSlot::Lunch, MealSlot::Dinner];

impl MealSlot {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.meal_type().as_str()
    }

    #[must_use]
    pub const fn meal_type(self) -> MealType {
        match self {
            Self::Breakfast => MealType::Breakfast,
            Self::Lunch => MealType::Lunch,
            Self::Dinner => MealType::Dinner,
        }
    }
}

pub fn validate_meal_type(meal: &str) -> Result<MealType> {
    match meal.trim().to_lowercase().as_str() {
        "breakfast" => Ok(MealType::Breakfast),
        "lunch" => Ok(MealType::Lunch),
        "dinner" => Ok(MealType::Dinner),
        "snack" | "snacks" => Ok(MealType::Snack),
        _ => bail!("Invalid meal type '{meal}'. Must be one of: breakfast, lunch, dinner, snack"),
    }
}

pub fn validate_meal_slot(slot: &str) -> Result<MealSlot> {
    match validate_meal_type(slot)? {
        MealType::Breakfast => Ok(MealSlot::Breakfast),
        MealType::Lunch => Ok(MealSlot::Lunch),
        MealType::Dinner => Ok(MealSlot::Dinner),
        MealType::Snack => {
            bail!("'{slot}' is not a plan slot. Must be one of: breakfast, lunch, dinner")
        }
    }
}

pub fn validate_diabetes_type(s: &str) -> Result<DiabetesType> {
    DiabetesType::parse(s).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid diabetes type '{s}'. Must be one of: type1, type2, gestational, prediabetes"
        )
    })
}

pub fn validate_reading_context(s: &str) -> Result<ReadingContext> {
    ReadingContext::parse(s).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid context '{s}'. Must be one of: fasting, pre_meal, post_meal, bedtime, random, exercise"
        )
    })
}

/// Check a value for a *new* log entry. The classifier clamps instead.
pub fn validate_glucose_value(value: i32) -> Result<i32> {
    if !(GLUCOSE_MIN..=GLUCOSE_MAX).contains(&value) {
        bail!("Glucose value must be between {GLUCOSE_MIN} and {GLUCOSE_MAX} mg/dL (got {value})");
    }
    Ok(value)
}

// --- Glucose ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlucoseReading {
    pub id: i64,
    #[serde(default)]
    pub uuid: String,
    pub user_id: String,
    pub value: i32,
    pub recorded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub context: Option<ReadingContext>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub note: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewGlucoseReading {
    pub user_id: String,
    pub value: i32,
    pub recorded_at: DateTime<Utc>,
    pub context: Option<ReadingContext>,
    pub note: Option<String>,
}

// --- Profile ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiabetesProfile {
    pub user_id: String,
    pub diabetes_type: Option<DiabetesType>,
    #[serde(default)]
    pub insulin_dependent: bool,
    #[serde(default)]
    pub medications: Vec<String>,
    /// Self-reported average blood sugar (mg/dL) from onboarding.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub average_blood_sugar: Option<f64>,
    #[serde(default)]
    pub updated_at: String,
}

impl DiabetesProfile {
    #[must_use]
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            diabetes_type: None,
            insulin_dependent: false,
            medications: Vec::new(),
            average_blood_sugar: None,
            updated_at: String::new(),
        }
    }
}

// --- Recipes ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub name: String,
    pub category: MealType,
    pub calories: f64,
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
    #[serde(default)]
    pub fiber: f64,
    #[serde(default)]
    pub sugar: f64,
    #[serde(default)]
    pub sodium: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub name: String,
    pub category: MealType,
    pub calories: f64,
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub sodium: f64,
    pub difficulty: Option<String>,
    pub tags: Vec<String>,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub source: String,
}

pub fn validate_new_recipe(recipe: &NewRecipe) -> Result<()> {
    if recipe.name.trim().is_empty() {
        bail!("Recipe name must not be empty");
    }
    let fields = [
        ("calories", recipe.calories),
        ("carbs", recipe.carbs),
        ("protein", recipe.protein),
        ("fat", recipe.fat),
        ("fiber", recipe.fiber),
        ("sugar", recipe.sugar),
        ("sodium", recipe.sodium),
    ];
    for (name, value) in fields {
        if !value.is_finite() || value < 0.0 {
            bail!("Recipe {name} must be a non-negative number");
        }
    }
    Ok(())
}

// --- Meal plans ---

/// Nutrition snapshot of the recipe assigned to a plan slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedMeal {
    pub recipe_id: i64,
    pub name: String,
    pub calories: f64,
    pub carbs: f64,
    pub protein: f64,
}

impl From<&Recipe> for PlannedMeal {
    fn from(recipe: &Recipe) -> Self {
        Self {
            recipe_id: recipe.id,
            name: recipe.name.clone(),
            calories: recipe.calories,
            carbs: recipe.carbs,
            protein: recipe.protein,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlan {
    pub user_id: String,
    pub date: NaiveDate,
    pub breakfast: Option<PlannedMeal>,
    pub lunch: Option<PlannedMeal>,
    pub dinner: Option<PlannedMeal>,
    #[serde(default)]
    pub snacks: Vec<String>,
    #[serde(default)]
    pub reminders: Vec<String>,
    pub total_calories: f64,
    pub total_carbs: f64,
    pub total_protein: f64,
    #[serde(default)]
    pub updated_at: String,
}

impl MealPlan {
    #[must_use]
    pub fn empty(user_id: &str, date: NaiveDate) -> Self {
        Self {
            user_id: user_id.to_string(),
            date,
            breakfast: None,
            lunch: None,
            dinner: None,
            snacks: Vec::new(),
            reminders: Vec::new(),
            total_calories: 0.0,
            total_carbs: 0.0,
            total_protein: 0.0,
            updated_at: String::new(),
        }
    }

    #[must_use]
    pub const fn slot(&self, slot: MealSlot) -> Option<&PlannedMeal> {
        match slot {
            MealSlot::Breakfast => self.breakfast.as_ref(),
            MealSlot::Lunch => self.lunch.as_ref(),
            MealSlot::Dinner => self.dinner.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, slot: MealSlot) -> &mut Option<PlannedMeal> {
        match slot {
            MealSlot::Breakfast => &mut self.breakfast,
            MealSlot::Lunch => &mut self.lunch,
            MealSlot::Dinner => &mut self.dinner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diabetes_type_parse_variants() {
        assert_eq!(DiabetesType::parse("type1"), Some(DiabetesType::Type1));
        assert_eq!(DiabetesType::parse("Type 1"), Some(DiabetesType::Type1));
        assert_eq!(DiabetesType::parse("type_2"), Some(DiabetesType::Type2));
        assert_eq!(DiabetesType::parse("T2"), Some(DiabetesType::Type2));
        assert_eq!(
            DiabetesType::parse("Gestational"),
            Some(DiabetesType::Gestational)
        );
        assert_eq!(
            DiabetesType::parse("pre-diabetes"),
            Some(DiabetesType::Prediabetes)
        );
        assert_eq!(DiabetesType::parse("lada"), None);
    }

    #[test]
    fn test_diabetes_type_round_trips_as_str() {
        for t in DiabetesType::ALL {
            assert_eq!(DiabetesType::parse(t.as_str()), Some(t));
        }
    }

    #[test]
    fn test_reading_context_parse() {
        assert_eq!(ReadingContext::parse("pre-meal"), Some(ReadingContext::PreMeal));
        assert_eq!(
            ReadingContext::parse("AFTER_MEAL"),
            Some(ReadingContext::PostMeal)
        );
        assert_eq!(ReadingContext::parse("bedtime"), Some(ReadingContext::Bedtime));
        assert_eq!(ReadingContext::parse("nap"), None);
    }

    #[test]
    fn test_validate_meal_type() {
        assert_eq!(validate_meal_type("Lunch").unwrap(), MealType::Lunch);
        assert_eq!(validate_meal_type("snacks").unwrap(), MealType::Snack);
        assert!(validate_meal_type("brunch").is_err());
    }

    #[test]
    fn test_validate_meal_slot_rejects_snack() {
        assert_eq!(validate_meal_slot("dinner").unwrap(), MealSlot::Dinner);
        assert!(validate_meal_slot("snack").is_err());
    }

    #[test]
    fn test_validate_glucose_value_bounds() {
        assert!(validate_glucose_value(20).is_ok());
        assert!(validate_glucose_value(600).is_ok());
        assert!(validate_glucose_value(19).is_err());
        assert!(validate_glucose_value(601).is_err());
    }

    #[test]
    fn test_validate_new_recipe_negative_carbs() {
        let recipe = NewRecipe {
            name: "Oats".to_string(),
            category: MealType::Breakfast,
            calories: 300.0,
            carbs: -1.0,
            protein: 10.0,
            fat: 5.0,
            fiber: 4.0,
            sugar: 1.0,
            sodium: 0.0,
            difficulty: None,
            tags: vec![],
            ingredients: vec![],
            instructions: vec![],
            source: "manual".to_string(),
        };
        let err = validate_new_recipe(&recipe).unwrap_err();
        assert!(err.to_string().contains("carbs"));
    }

    #[test]
    fn test_meal_plan_slot_access() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let mut plan = MealPlan::empty("u1", date);
        assert!(plan.slot(MealSlot::Lunch).is_none());
        *plan.slot_mut(MealSlot::Lunch) = Some(PlannedMeal {
            recipe_id: 7,
            name: "Soup".to_string(),
            calories: 200.0,
            carbs: 20.0,
            protein: 8.0,
        });
        assert_eq!(plan.slot(MealSlot::Lunch).unwrap().recipe_id, 7);
        assert!(plan.slot(MealSlot::Dinner).is_none());
    }
}
