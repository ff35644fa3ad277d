//! Quote collection routes.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use quotesync_engine::{CategoryFilter, Record};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::AppState;

/// `?category=` filter; absent or `all` means every category.
#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    pub category: Option<String>,
}

impl FilterQuery {
    fn filter(&self) -> CategoryFilter {
        CategoryFilter::parse(self.category.as_deref())
    }
}

/// Body of `POST /quotes`.
#[derive(Debug, Deserialize)]
pub struct NewQuote {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub category: String,
}

/// Create quote routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/quotes", get(list_quotes).post(add_quote))
        .route("/quotes/random", get(random_quote))
        .route("/categories", get(list_categories))
}

/// GET /quotes - Records matching the filter, by id.
async fn list_quotes(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Json<Vec<Record>> {
    Json(state.engine.active_records(&query.filter()).await)
}

/// GET /quotes/random - One random record matching the filter.
async fn random_quote(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Record>> {
    state
        .engine
        .random_record(&query.filter())
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no quotes in this category".to_string()))
}

/// POST /quotes - Add a local quote.
async fn add_quote(
    State(state): State<AppState>,
    Json(body): Json<NewQuote>,
) -> Result<(StatusCode, Json<Record>)> {
    let record = state
        .engine
        .add_local_record(&body.text, &body.category)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /categories - Distinct categories, sorted.
async fn list_categories(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.engine.categories().await)
}
