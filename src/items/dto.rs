use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ApiError;
use crate::weights::WeightUnit;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    /// Client-generated id, so items created offline keep their identity.
    pub id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub weight: f64,
    #[serde(default)]
    pub weight_unit: WeightUnit,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    #[serde(default)]
    pub consumable: bool,
    #[serde(default)]
    pub worn: bool,
    pub image: Option<String>,
    pub image_grant: Option<String>,
    pub notes: Option<String>,
    pub catalog_item_id: Option<Uuid>,
}
fn default_quantity() -> i32 {
    1
}

/// Absent fields are left alone; `null` clears a nullable field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub name: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub category: Option<Option<String>>,
    pub weight: Option<f64>,
    pub weight_unit: Option<WeightUnit>,
    pub quantity: Option<i32>,
    pub consumable: Option<bool>,
    pub worn: Option<bool>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub image: Option<Option<String>>,
    pub image_grant: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub notes: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub catalog_item_id: Option<Option<Uuid>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesQuery {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_since: Option<OffsetDateTime>,
}

fn check_weight(weight: f64) -> Result<(), ApiError> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(ApiError::bad_request("Weight must be a non-negative number"));
    }
    Ok(())
}

fn check_quantity(quantity: i32) -> Result<(), ApiError> {
    if quantity < 0 {
        return Err(ApiError::bad_request("Quantity must not be negative"));
    }
    Ok(())
}

impl CreateItemRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::bad_request("Item name is required"));
        }
        check_weight(self.weight)?;
        check_quantity(self.quantity)
    }
}

impl UpdateItemRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if matches!(&self.name, Some(n) if n.trim().is_empty()) {
            return Err(ApiError::bad_request("Item name must not be empty"));
        }
        if let Some(w) = self.weight {
            check_weight(w)?;
        }
        if let Some(q) = self.quantity {
            check_quantity(q)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_defaults() {
        let req: CreateItemRequest =
            serde_json::from_str(r#"{"name":"Tent","weight":1.2,"weightUnit":"kg"}"#).unwrap();
        assert_eq!(req.quantity, 1);
        assert_eq!(req.weight_unit, WeightUnit::Kg);
        assert!(!req.consumable && !req.worn);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        let req: CreateItemRequest =
            serde_json::from_str(r#"{"name":"  ","weight":1}"#).unwrap();
        assert!(req.validate().is_err());
        let req: CreateItemRequest =
            serde_json::from_str(r#"{"name":"Rock","weight":-1}"#).unwrap();
        assert!(req.validate().is_err());
        let upd = UpdateItemRequest {
            quantity: Some(-2),
            ..Default::default()
        };
        assert!(upd.validate().is_err());
    }

    #[test]
    fn update_null_clears_and_absent_keeps() {
        let upd: UpdateItemRequest = serde_json::from_str(
            r#"{"notes":null,"category":null,"catalogItemId":null,"description":"Ti"}"#,
        )
        .unwrap();
        assert_eq!(upd.notes, Some(None));
        assert_eq!(upd.category, Some(None));
        assert_eq!(upd.catalog_item_id, Some(None));
        assert_eq!(upd.description, Some(Some("Ti".into())));
        assert_eq!(upd.image, None);
        assert_eq!(upd.weight, None);
    }

    #[test]
    fn unknown_unit_is_a_parse_error() {
        let res = serde_json::from_str::<CreateItemRequest>(
            r#"{"name":"Rock","weight":1,"weightUnit":"stone"}"#,
        );
        assert!(res.is_err());
    }
}
