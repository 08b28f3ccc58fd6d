use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use super::{repo, CatalogItem};
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    extract::{AppPath, AppQuery},
    state::AppState,
};

const MAX_LIMIT: i64 = 100;

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/catalog", get(list_catalog))
        .route("/catalog/:id", get(get_catalog_item))
}

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
fn default_limit() -> i64 {
    20
}

impl CatalogQuery {
    fn normalized(&self) -> Result<(Option<&str>, Option<&str>, i64, i64), ApiError> {
        if self.limit < 1 || self.offset < 0 {
            return Err(ApiError::bad_request("Invalid pagination"));
        }
        let q = self.q.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let category = self
            .category
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        Ok((q, category, self.limit.min(MAX_LIMIT), self.offset))
    }
}

#[derive(Debug, Serialize)]
pub struct CatalogPage {
    pub items: Vec<CatalogItem>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[instrument(skip(state))]
pub async fn list_catalog(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    AppQuery(p): AppQuery<CatalogQuery>,
) -> ApiResult<Json<CatalogPage>> {
    let (q, category, limit, offset) = p.normalized()?;
    let (items, total) = repo::search(&state.db, q, category, limit, offset).await?;
    Ok(Json(CatalogPage {
        items,
        total,
        limit,
        offset,
    }))
}

#[instrument(skip(state))]
pub async fn get_catalog_item(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> ApiResult<Json<CatalogItem>> {
    repo::get(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Catalog item not found"))
}
