use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::weights::WeightUnit;

/// Gear item inside a pack. `user_id` duplicates the pack's owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PackItem {
    pub id: Uuid,
    pub pack_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub weight: f64,
    pub weight_unit: WeightUnit,
    pub quantity: i32,
    pub consumable: bool,
    pub worn: bool,
    pub image: Option<String>,
    pub notes: Option<String>,
    pub catalog_item_id: Option<Uuid>,
    pub deleted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[cfg(test)]
impl PackItem {
    pub fn sample(name: &str, weight: f64, weight_unit: WeightUnit) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            pack_id: Uuid::nil(),
            user_id: Uuid::nil(),
            name: name.to_string(),
            description: None,
            category: None,
            weight,
            weight_unit,
            quantity: 1,
            consumable: false,
            worn: false,
            image: None,
            notes: None,
            catalog_item_id: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}
