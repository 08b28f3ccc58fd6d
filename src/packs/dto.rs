use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Pack, PackCategory};
use crate::error::ApiError;
use crate::items::PackItem;
use crate::weights::{compute_pack_weights, CategorySummary, WeightUnit};

const MAX_TAGS: usize = 20;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePackRequest {
    pub id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub category: PackCategory,
    #[serde(default)]
    pub is_public: bool,
    pub image: Option<String>,
    pub image_grant: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Absent fields are left alone. Nullable fields take an explicit `null`
/// to clear them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePackRequest {
    pub name: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub description: Option<Option<String>>,
    pub category: Option<PackCategory>,
    pub is_public: Option<bool>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub image: Option<Option<String>>,
    pub image_grant: Option<String>,
    pub tags: Option<Vec<String>>,
}

fn check_tags(tags: &[String]) -> Result<(), ApiError> {
    if tags.len() > MAX_TAGS {
        return Err(ApiError::bad_request("Too many tags"));
    }
    if tags.iter().any(|t| t.trim().is_empty()) {
        return Err(ApiError::bad_request("Tags must not be empty"));
    }
    Ok(())
}

impl CreatePackRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::bad_request("Pack name is required"));
        }
        check_tags(&self.tags)
    }
}

impl UpdatePackRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if matches!(&self.name, Some(n) if n.trim().is_empty()) {
            return Err(ApiError::bad_request("Pack name must not be empty"));
        }
        match &self.tags {
            Some(tags) => check_tags(tags),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackQuery {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_since: Option<OffsetDateTime>,
    #[serde(default)]
    pub unit: WeightUnit,
}

#[derive(Debug, Default, Deserialize)]
pub struct UnitQuery {
    #[serde(default)]
    pub unit: WeightUnit,
}

/// Pack with its live items and derived weights.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackResponse {
    #[serde(flatten)]
    pub pack: Pack,
    pub items: Vec<PackItem>,
    pub base_weight: f64,
    pub total_weight: f64,
    pub weight_unit: WeightUnit,
}

impl PackResponse {
    pub fn new(pack: Pack, items: Vec<PackItem>, unit: WeightUnit) -> Self {
        let weights = compute_pack_weights(&items, unit);
        Self {
            pack,
            items,
            base_weight: weights.base_weight,
            total_weight: weights.total_weight,
            weight_unit: weights.unit,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackSummary {
    pub pack_id: Uuid,
    pub base_weight: f64,
    pub total_weight: f64,
    pub weight_unit: WeightUnit,
    pub categories: Vec<CategorySummary>,
}
