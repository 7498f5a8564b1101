use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use glyco_core::catalog::{CatalogRecipeRow, query_params, row_to_recipe};
use glyco_core::error::CatalogError;
use glyco_core::models::Recipe;
use glyco_core::recommend::{CatalogQuery, RecipeCatalog};

use crate::config::CatalogSettings;

/// Client for the `recipes` table exposed by the managed backend's REST API.
pub struct RestCatalogClient {
    client: reqwest::Client,
    recipes_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RestCatalogClient {
    pub fn new(settings: &CatalogSettings, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "glyco-cli/{} (meal planner)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5).min(timeout))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            recipes_url: format!("{}/rest/v1/recipes", settings.base_url),
            api_key: settings.api_key.clone(),
            timeout,
        })
    }
}

#[async_trait]
impl RecipeCatalog for RestCatalogClient {
    async fn search_recipes(&self, query: &CatalogQuery) -> Result<Vec<Recipe>, CatalogError> {
        let mut request = self
            .client
            .get(&self.recipes_url)
            .query(&query_params(query));
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CatalogError::Timeout(self.timeout)
            } else {
                CatalogError::Transport(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        let rows: Vec<CatalogRecipeRow> = resp
            .json()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))?;
        let total = rows.len();
        let recipes: Vec<Recipe> = rows.into_iter().filter_map(row_to_recipe).collect();
        if recipes.len() < total {
            tracing::debug!(
                dropped = total - recipes.len(),
                "ignored incomplete catalog rows"
            );
        }
        Ok(recipes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use glyco_core::models::MealType;
    use glyco_core::recommend::CatalogSort;
    use std::collections::HashMap;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base_url: String, timeout: Duration) -> RestCatalogClient {
        RestCatalogClient::new(
            &CatalogSettings {
                base_url,
                api_key: Some("anon-key".to_string()),
            },
            timeout,
        )
        .unwrap()
    }

    fn dinner_query() -> CatalogQuery {
        CatalogQuery {
            category: MealType::Dinner,
            max_carbs: 35,
            sort: CatalogSort::CarbsAscending,
            limit: 3,
        }
    }

    #[tokio::test]
    async fn test_search_sends_filters_and_keys() {
        async fn recipes(
            headers: HeaderMap,
            Query(params): Query<HashMap<String, String>>,
        ) -> Result<Json<serde_json::Value>, StatusCode> {
            let authorized = headers.get("apikey").is_some_and(|v| v == "anon-key")
                && headers
                    .get("authorization")
                    .is_some_and(|v| v == "Bearer anon-key");
            if !authorized {
                return Err(StatusCode::UNAUTHORIZED);
            }
            assert_eq!(params.get("category").map(String::as_str), Some("eq.dinner"));
            assert_eq!(params.get("carbs").map(String::as_str), Some("lte.35"));
            assert_eq!(params.get("order").map(String::as_str), Some("carbs.asc"));
            assert_eq!(params.get("limit").map(String::as_str), Some("3"));
            Ok(Json(serde_json::json!([
                {"id": 10, "name": "Turkey Chili", "category": "dinner", "carbs": 28, "calories": 410},
                {"id": 11, "name": null, "category": "dinner", "carbs": 12}
            ])))
        }

        let base = spawn(Router::new().route("/rest/v1/recipes", get(recipes))).await;
        let found = client(base, Duration::from_secs(5))
            .search_recipes(&dinner_query())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Turkey Chili");
        assert_eq!(found[0].source, "catalog");
    }

    #[tokio::test]
    async fn test_non_success_status_is_distinguishable() {
        let app = Router::new().route(
            "/rest/v1/recipes",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let base = spawn(app).await;
        let err = client(base, Duration::from_secs(5))
            .search_recipes(&dinner_query())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Status(503)));
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        let app = Router::new().route("/rest/v1/recipes", get(|| async { "<html>oops</html>" }));
        let base = spawn(app).await;
        let err = client(base, Duration::from_secs(5))
            .search_recipes(&dinner_query())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Decode(_)));
    }

    #[tokio::test]
    async fn test_empty_result_is_not_an_error() {
        let app = Router::new().route(
            "/rest/v1/recipes",
            get(|| async { Json(serde_json::json!([])) }),
        );
        let base = spawn(app).await;
        let found = client(base, Duration::from_secs(5))
            .search_recipes(&dinner_query())
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_transport_error() {
        // bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(format!("http://{addr}"), Duration::from_secs(5))
            .search_recipes(&dinner_query())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Transport(_)));
    }

    #[tokio::test]
    async fn test_slow_catalog_times_out() {
        let app = Router::new().route(
            "/rest/v1/recipes",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(serde_json::json!([]))
            }),
        );
        let base = spawn(app).await;
        let err = client(base, Duration::from_millis(200))
            .search_recipes(&dinner_query())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Timeout(_)));
    }

    // --- Integration test (hits the configured remote catalog) ---

    #[tokio::test]
    #[ignore = "hits the remote recipe catalog in GLYCO_CATALOG_URL"]
    async fn test_live_catalog_respects_ceiling() {
        let _ = dotenvy::dotenv();
        let base_url = std::env::var("GLYCO_CATALOG_URL").expect("GLYCO_CATALOG_URL not set");
        let live = RestCatalogClient::new(
            &CatalogSettings {
                base_url,
                api_key: std::env::var("GLYCO_CATALOG_KEY").ok(),
            },
            Duration::from_secs(10),
        )
        .unwrap();
        let found = live.search_recipes(&dinner_query()).await.unwrap();
        assert!(found.len() <= 3);
        for recipe in &found {
            assert_eq!(recipe.category, MealType::Dinner);
            assert!(recipe.carbs <= 35.0);
        }
    }
}
