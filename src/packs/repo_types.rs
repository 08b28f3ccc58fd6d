use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "pack_category", rename_all = "snake_case")]
pub enum PackCategory {
    Hiking,
    Backpacking,
    Camping,
    Climbing,
    Winter,
    Desert,
    WaterSports,
    Skiing,
    #[default]
    Custom,
}

/// Pack row. Weights are never stored; they are derived from the items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Pack {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: PackCategory,
    pub is_public: bool,
    pub image: Option<String>,
    pub tags: Vec<String>,
    pub deleted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
