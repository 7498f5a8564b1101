use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use glyco_core::classify::GlucoseStatus;
use glyco_core::error::PlanError;
use glyco_core::models::{
    DiabetesProfile, GlucoseReading, MealPlan, NewGlucoseReading, NewRecipe, Recipe,
    validate_diabetes_type, validate_glucose_value, validate_meal_slot, validate_meal_type,
    validate_new_recipe, validate_reading_context,
};
use glyco_core::recommend::{Recommendation, RecipeCatalog, recommend};
use glyco_core::service::{GlycoService, TREND_WINDOW_DAYS};
use glyco_core::trend::{self, TrendSummary};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB
const DEFAULT_READING_LIMIT: i64 = 50;
const MAX_READING_LIMIT: i64 = 500;
const DEFAULT_RECOMMENDATION_COUNT: usize = 3;
const MAX_RECOMMENDATION_COUNT: usize = 20;
const MAX_WINDOW_DAYS: u32 = 3650;

#[derive(Clone)]
struct AppState {
    svc: Arc<Mutex<GlycoService>>,
    /// `None` serves recommendations from the stored recipes.
    catalog: Option<Arc<dyn RecipeCatalog>>,
    catalog_timeout: Duration,
    api_key: Option<String>,
}

impl AppState {
    fn svc(&self) -> MutexGuard<'_, GlycoService> {
        self.svc
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct ClassifyRequest {
    value: i32,
    diabetes_type: Option<String>,
    context: Option<String>,
}

#[derive(Deserialize)]
struct CreateReadingRequest {
    value: i32,
    context: Option<String>,
    /// RFC 3339; defaults to now.
    recorded_at: Option<String>,
    note: Option<String>,
}

#[derive(Serialize)]
struct CreateReadingResponse {
    reading: GlucoseReading,
    status: GlucoseStatus,
}

#[derive(Deserialize)]
struct ReadingsQuery {
    days: Option<u32>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct TrendQuery {
    days: Option<u32>,
}

#[derive(Deserialize)]
struct UpdateProfileRequest {
    diabetes_type: Option<String>,
    insulin_dependent: Option<bool>,
    medications: Option<Vec<String>>,
    average_blood_sugar: Option<f64>,
}

#[derive(Deserialize)]
struct RecommendationQuery {
    meal: String,
    count: Option<usize>,
}

#[derive(Deserialize)]
struct AssignMealRequest {
    /// `null` clears the slot.
    recipe_id: Option<i64>,
}

#[derive(Deserialize)]
struct RecipeListQuery {
    meal: Option<String>,
    q: Option<String>,
}

#[derive(Deserialize)]
struct CreateRecipeRequest {
    name: String,
    category: String,
    calories: f64,
    carbs: f64,
    protein: f64,
    fat: f64,
    #[serde(default)]
    fiber: f64,
    #[serde(default)]
    sugar: f64,
    #[serde(default)]
    sodium: f64,
    difficulty: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    ingredients: Vec<String>,
    #[serde(default)]
    instructions: Vec<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    retryable: bool,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// Storage failed; nothing was changed and the request can be repeated.
    Store(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, retryable) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg, false),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, false),
            Self::Store(err) => {
                tracing::error!("storage error: {err:#}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage temporarily unavailable".to_string(),
                    true,
                )
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: message,
                retryable,
            }),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(err)
    }
}

impl From<PlanError> for ApiError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Store(e) => Self::Store(e),
            PlanError::RecipeNotFound(id) => Self::NotFound(format!("Recipe {id} not found")),
            PlanError::InvalidInput(msg) => Self::BadRequest(msg),
        }
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err}"))
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{raw}'. Use YYYY-MM-DD")))
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                    retryable: false,
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    response
}

// --- Glucose ---

async fn classify_glucose(Json(req): Json<ClassifyRequest>) -> Json<GlucoseStatus> {
    Json(GlycoService::classify_reading(
        req.value,
        req.diabetes_type.as_deref(),
        req.context.as_deref(),
    ))
}

async fn list_readings(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(query): Query<ReadingsQuery>,
) -> Result<Json<Vec<GlucoseReading>>, ApiError> {
    let svc = state.svc();
    let readings = match query.days {
        Some(days) => svc.get_glucose_readings(&user, window_days(days)?)?,
        None => {
            let limit = query
                .limit
                .unwrap_or(DEFAULT_READING_LIMIT)
                .clamp(1, MAX_READING_LIMIT);
            svc.recent_readings(&user, limit)?
        }
    };
    Ok(Json(readings))
}

fn window_days(days: u32) -> Result<i64, ApiError> {
    if days > MAX_WINDOW_DAYS {
        return Err(ApiError::BadRequest(format!(
            "days must be at most {MAX_WINDOW_DAYS}, got {days}"
        )));
    }
    Ok(i64::from(days))
}

async fn create_reading(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<CreateReadingRequest>,
) -> Result<(StatusCode, Json<CreateReadingResponse>), ApiError> {
    let value = validate_glucose_value(req.value).map_err(|e| bad_request(&e))?;
    let context = req
        .context
        .as_deref()
        .map(validate_reading_context)
        .transpose()
        .map_err(|e| bad_request(&e))?;
    let recorded_at = match req.recorded_at.as_deref() {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|_| {
                ApiError::BadRequest(format!("Invalid recorded_at '{raw}'. Use RFC 3339"))
            })?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let svc = state.svc();
    let reading = svc.log_reading(&NewGlucoseReading {
        user_id: user.clone(),
        value,
        recorded_at,
        context,
        note: req.note.filter(|n| !n.trim().is_empty()),
    })?;
    let category = svc.get_profile(&user)?.and_then(|p| p.diabetes_type);
    let status = glyco_core::classify::classify(reading.value, category, reading.context);

    Ok((
        StatusCode::CREATED,
        Json(CreateReadingResponse { reading, status }),
    ))
}

async fn delete_reading(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    if state.svc().delete_reading(&user, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Reading {id} not found")))
    }
}

async fn get_trend(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<TrendSummary>, ApiError> {
    let days = match query.days {
        Some(days) => window_days(days)?,
        None => TREND_WINDOW_DAYS,
    };
    let readings = state.svc().get_glucose_readings(&user, days)?;
    Ok(Json(trend::analyze(&readings)))
}

// --- Profile ---

async fn get_profile(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<DiabetesProfile>, ApiError> {
    state
        .svc()
        .get_profile(&user)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No profile for '{user}'")))
}

async fn update_profile(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<DiabetesProfile>, ApiError> {
    let diabetes_type = req
        .diabetes_type
        .as_deref()
        .map(validate_diabetes_type)
        .transpose()
        .map_err(|e| bad_request(&e))?;
    if let Some(avg) = req.average_blood_sugar {
        if !avg.is_finite() || avg <= 0.0 {
            return Err(ApiError::BadRequest(
                "average_blood_sugar must be a positive number".to_string(),
            ));
        }
    }

    let svc = state.svc();
    let mut profile = svc
        .get_profile(&user)?
        .unwrap_or_else(|| DiabetesProfile::new(&user));
    if diabetes_type.is_some() {
        profile.diabetes_type = diabetes_type;
    }
    if let Some(i) = req.insulin_dependent {
        profile.insulin_dependent = i;
    }
    if let Some(m) = req.medications {
        profile.medications = m;
    }
    if req.average_blood_sugar.is_some() {
        profile.average_blood_sugar = req.average_blood_sugar;
    }

    Ok(Json(svc.save_profile(&profile)?))
}

// --- Recommendations ---

async fn get_recommendations(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(query): Query<RecommendationQuery>,
) -> Result<Json<Recommendation>, ApiError> {
    let meal = validate_meal_type(&query.meal).map_err(|e| bad_request(&e))?;
    let count = query.count.unwrap_or(DEFAULT_RECOMMENDATION_COUNT);
    if count > MAX_RECOMMENDATION_COUNT {
        return Err(ApiError::BadRequest(format!(
            "count must be at most {MAX_RECOMMENDATION_COUNT}"
        )));
    }

    // the store lock must not be held across the catalog call
    let (request, catalog) = {
        let svc = state.svc();
        let request = svc.recommendation_request(&user, meal, count)?;
        let catalog: Arc<dyn RecipeCatalog> = match &state.catalog {
            Some(remote) => Arc::clone(remote),
            None => Arc::new(svc.local_catalog()?),
        };
        (request, catalog)
    };

    Ok(Json(
        recommend(&request, catalog.as_ref(), state.catalog_timeout).await,
    ))
}

// --- Meal plans ---

async fn get_plan(
    State(state): State<AppState>,
    Path((user, date)): Path<(String, String)>,
) -> Result<Json<MealPlan>, ApiError> {
    let date = parse_date(&date)?;
    state
        .svc()
        .get_meal_plan(&user, date)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No meal plan for {date}")))
}

async fn assign_plan_slot(
    State(state): State<AppState>,
    Path((user, date, slot)): Path<(String, String, String)>,
    Json(req): Json<AssignMealRequest>,
) -> Result<Json<MealPlan>, ApiError> {
    let date = parse_date(&date)?;
    let slot = validate_meal_slot(&slot).map_err(|e| bad_request(&e))?;
    let plan = state
        .svc()
        .assign_meal_to_plan(&user, date, slot, req.recipe_id)?;
    Ok(Json(plan))
}

// --- Recipes ---

async fn list_recipes(
    State(state): State<AppState>,
    Query(query): Query<RecipeListQuery>,
) -> Result<Json<Vec<Recipe>>, ApiError> {
    let category = query
        .meal
        .as_deref()
        .map(validate_meal_type)
        .transpose()
        .map_err(|e| bad_request(&e))?;

    let svc = state.svc();
    let mut recipes = match query.q.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => svc.search_recipes(q)?,
        _ => svc.list_recipes(category)?,
    };
    if let Some(c) = category {
        recipes.retain(|r| r.category == c);
    }
    Ok(Json(recipes))
}

async fn create_recipe(
    State(state): State<AppState>,
    Json(req): Json<CreateRecipeRequest>,
) -> Result<(StatusCode, Json<Recipe>), ApiError> {
    let category = validate_meal_type(&req.category).map_err(|e| bad_request(&e))?;
    let new_recipe = NewRecipe {
        name: req.name.trim().to_string(),
        category,
        calories: req.calories,
        carbs: req.carbs,
        protein: req.protein,
        fat: req.fat,
        fiber: req.fiber,
        sugar: req.sugar,
        sodium: req.sodium,
        difficulty: req.difficulty,
        tags: req.tags,
        ingredients: req.ingredients,
        instructions: req.instructions,
        source: "custom".to_string(),
    };
    validate_new_recipe(&new_recipe).map_err(|e| bad_request(&e))?;

    let recipe = state.svc().add_recipe(&new_recipe)?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Recipe>, ApiError> {
    state
        .svc()
        .get_recipe(id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Recipe {id} not found")))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/glucose/classify", post(classify_glucose))
        .route(
            "/api/users/{user}/readings",
            get(list_readings).post(create_reading),
        )
        .route(
            "/api/users/{user}/readings/{id}",
            axum::routing::delete(delete_reading),
        )
        .route("/api/users/{user}/trend", get(get_trend))
        .route(
            "/api/users/{user}/profile",
            get(get_profile).put(update_profile),
        )
        .route(
            "/api/users/{user}/recommendations",
            get(get_recommendations),
        )
        .route("/api/users/{user}/plans/{date}", get(get_plan))
        .route(
            "/api/users/{user}/plans/{date}/{slot}",
            put(assign_plan_slot),
        )
        .route("/api/recipes", get(list_recipes).post(create_recipe))
        .route("/api/recipes/{id}", get(get_recipe))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub struct ServerOptions {
    pub port: u16,
    pub bind: String,
    pub api_key: Option<String>,
    /// The key was generated on this run and has already been printed in full.
    pub new_api_key: bool,
    pub catalog: Option<Arc<dyn RecipeCatalog>>,
    pub catalog_timeout: Duration,
}

pub async fn start_server(svc: GlycoService, options: ServerOptions) -> anyhow::Result<()> {
    let ServerOptions {
        port,
        bind,
        api_key,
        new_api_key,
        catalog,
        catalog_timeout,
    } = options;

    if let Some(ref key) = api_key {
        if !new_api_key {
            eprintln!(
                "API key: {}...{} (see api_key file in data directory)",
                &key[..4],
                &key[key.len() - 4..],
            );
        }
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can read these glucose records."
        );
    }

    if catalog.is_none() {
        eprintln!("No recipe catalog configured; recommendations use stored recipes.");
    }

    let state = AppState {
        svc: Arc::new(Mutex::new(svc)),
        catalog,
        catalog_timeout,
        api_key,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
