use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::items::PackItem;
use crate::packs::Pack;

/// A server record that can be mirrored locally.
pub trait SyncEntity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Used in log fields.
    const KIND: &'static str;
    /// HTTP method the server accepts for edits.
    const UPDATE_METHOD: &'static str;

    fn id(&self) -> Uuid;
    fn updated_at(&self) -> OffsetDateTime;
    fn is_deleted(&self) -> bool;
    fn mark_deleted(&mut self, at: OffsetDateTime);

    /// Collection path for list and create, relative to `/api`.
    fn collection_path(&self) -> String;
    fn list_path() -> &'static str;
    fn resource_path(id: Uuid) -> String;

    /// JSON body for create and update. Image references are left out:
    /// attaching an image goes through an upload grant, not through sync.
    fn write_body(&self) -> Value;
}

impl SyncEntity for Pack {
    const KIND: &'static str = "pack";
    const UPDATE_METHOD: &'static str = "PUT";

    fn id(&self) -> Uuid {
        self.id
    }

    fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn mark_deleted(&mut self, at: OffsetDateTime) {
        self.deleted = true;
        self.updated_at = at;
    }

    fn collection_path(&self) -> String {
        "/packs".into()
    }

    fn list_path() -> &'static str {
        "/packs"
    }

    fn resource_path(id: Uuid) -> String {
        format!("/packs/{id}")
    }

    fn write_body(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "description": self.description,
            "category": self.category,
            "isPublic": self.is_public,
            "tags": self.tags,
        })
    }
}

impl SyncEntity for PackItem {
    const KIND: &'static str = "item";
    const UPDATE_METHOD: &'static str = "PATCH";

    fn id(&self) -> Uuid {
        self.id
    }

    fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn mark_deleted(&mut self, at: OffsetDateTime) {
        self.deleted = true;
        self.updated_at = at;
    }

    fn collection_path(&self) -> String {
        format!("/packs/{}/items", self.pack_id)
    }

    fn list_path() -> &'static str {
        "/items"
    }

    fn resource_path(id: Uuid) -> String {
        format!("/items/{id}")
    }

    fn write_body(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "description": self.description,
            "category": self.category,
            "weight": self.weight,
            "weightUnit": self.weight_unit,
            "quantity": self.quantity,
            "consumable": self.consumable,
            "worn": self.worn,
            "notes": self.notes,
            "catalogItemId": self.catalog_item_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::UpdateItemRequest;
    use crate::weights::WeightUnit;

    #[test]
    fn item_body_targets_its_pack_and_omits_image() {
        let mut item = PackItem::sample("Stove", 80.0, WeightUnit::G);
        item.pack_id = Uuid::new_v4();
        item.image = Some("u/x-stove.jpg".into());

        assert_eq!(item.collection_path(), format!("/packs/{}/items", item.pack_id));
        let body = item.write_body();
        assert_eq!(body["weightUnit"], "g");
        assert_eq!(body["id"], item.id.to_string());
        assert!(body.get("image").is_none());
    }

    #[test]
    fn cleared_fields_are_sent_as_null() {
        let item = PackItem::sample("Stove", 80.0, WeightUnit::G);
        let upd: UpdateItemRequest = serde_json::from_value(item.write_body()).unwrap();
        assert_eq!(upd.notes, Some(None));
        assert_eq!(upd.category, Some(None));
        assert_eq!(upd.image, None);
    }

    #[test]
    fn mark_deleted_stamps_time() {
        let mut item = PackItem::sample("Tarp", 300.0, WeightUnit::G);
        let at = item.updated_at + time::Duration::seconds(5);
        item.mark_deleted(at);
        assert!(item.is_deleted());
        assert_eq!(SyncEntity::updated_at(&item), at);
    }
}
