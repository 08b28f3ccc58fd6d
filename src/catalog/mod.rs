pub mod handlers;
mod repo;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::state::AppState;
use crate::weights::WeightUnit;
use axum::Router;

/// Shared gear reference, independent of any pack.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub category: Option<String>,
    pub weight: Option<f64>,
    pub weight_unit: Option<WeightUnit>,
    pub price: Option<f64>,
    pub product_url: Option<String>,
    pub image: Option<String>,
    pub specs: Option<serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

pub fn router() -> Router<AppState> {
    handlers::catalog_routes()
}
