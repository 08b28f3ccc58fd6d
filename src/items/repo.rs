use anyhow::Context;
use sqlx::{PgExecutor, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::{CreateItemRequest, UpdateItemRequest};
use super::repo_types::PackItem;

const ITEM_COLUMNS: &str = "id, pack_id, user_id, name, description, category, weight, weight_unit, \
     quantity, consumable, worn, image, notes, catalog_item_id, deleted, created_at, updated_at";

async fn touch_pack(db: impl PgExecutor<'_>, pack_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("UPDATE packs SET updated_at = now() WHERE id = $1")
        .bind(pack_id)
        .execute(db)
        .await
        .context("bump pack updated_at")?;
    Ok(())
}

/// True when `pack_id` exists, is live, and belongs to `user_id`.
pub async fn owns_pack(db: &PgPool, user_id: Uuid, pack_id: Uuid) -> anyhow::Result<bool> {
    let found = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM packs WHERE id = $1 AND user_id = $2 AND deleted = FALSE)",
    )
    .bind(pack_id)
    .bind(user_id)
    .fetch_one(db)
    .await
    .context("check pack ownership")?;
    Ok(found)
}

pub async fn list_by_pack(db: &PgPool, pack_id: Uuid) -> anyhow::Result<Vec<PackItem>> {
    let rows = sqlx::query_as::<_, PackItem>(&format!(
        r#"
        SELECT {ITEM_COLUMNS}
        FROM pack_items
        WHERE pack_id = $1 AND deleted = FALSE
        ORDER BY created_at ASC
        "#
    ))
    .bind(pack_id)
    .fetch_all(db)
    .await
    .context("list items by pack")?;
    Ok(rows)
}

pub async fn list_by_packs(db: &PgPool, pack_ids: &[Uuid]) -> anyhow::Result<Vec<PackItem>> {
    let rows = sqlx::query_as::<_, PackItem>(&format!(
        r#"
        SELECT {ITEM_COLUMNS}
        FROM pack_items
        WHERE pack_id = ANY($1) AND deleted = FALSE
        ORDER BY created_at ASC
        "#
    ))
    .bind(pack_ids)
    .fetch_all(db)
    .await
    .context("list items by packs")?;
    Ok(rows)
}

/// Live items, or every change after `since` including tombstones.
pub async fn list_for_user(
    db: &PgPool,
    user_id: Uuid,
    since: Option<OffsetDateTime>,
) -> anyhow::Result<Vec<PackItem>> {
    let rows = sqlx::query_as::<_, PackItem>(&format!(
        r#"
        SELECT {ITEM_COLUMNS}
        FROM pack_items
        WHERE user_id = $1
          AND (($2::timestamptz IS NULL AND deleted = FALSE) OR updated_at > $2)
        ORDER BY updated_at ASC
        "#
    ))
    .bind(user_id)
    .bind(since)
    .fetch_all(db)
    .await
    .context("list items for user")?;
    Ok(rows)
}

pub async fn get(db: &PgPool, user_id: Uuid, item_id: Uuid) -> anyhow::Result<Option<PackItem>> {
    let row = sqlx::query_as::<_, PackItem>(&format!(
        r#"
        SELECT {ITEM_COLUMNS}
        FROM pack_items
        WHERE id = $1 AND user_id = $2 AND deleted = FALSE
        "#
    ))
    .bind(item_id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("get item")?;
    Ok(row)
}

pub async fn insert(
    db: &PgPool,
    user_id: Uuid,
    pack_id: Uuid,
    req: &CreateItemRequest,
) -> anyhow::Result<PackItem> {
    let mut tx = db.begin().await.context("begin tx")?;
    let item = sqlx::query_as::<_, PackItem>(&format!(
        r#"
        INSERT INTO pack_items (id, pack_id, user_id, name, description, category, weight,
                                weight_unit, quantity, consumable, worn, image, notes, catalog_item_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING {ITEM_COLUMNS}
        "#
    ))
    .bind(req.id.unwrap_or_else(Uuid::new_v4))
    .bind(pack_id)
    .bind(user_id)
    .bind(req.name.trim())
    .bind(&req.description)
    .bind(&req.category)
    .bind(req.weight)
    .bind(req.weight_unit)
    .bind(req.quantity)
    .bind(req.consumable)
    .bind(req.worn)
    .bind(&req.image)
    .bind(&req.notes)
    .bind(req.catalog_item_id)
    .fetch_one(&mut *tx)
    .await
    .context("insert item")?;
    touch_pack(&mut *tx, pack_id).await?;
    tx.commit().await.context("commit tx")?;
    Ok(item)
}

pub async fn update(
    db: &PgPool,
    user_id: Uuid,
    item_id: Uuid,
    req: &UpdateItemRequest,
) -> anyhow::Result<Option<PackItem>> {
    let mut tx = db.begin().await.context("begin tx")?;
    let item = sqlx::query_as::<_, PackItem>(&format!(
        r#"
        UPDATE pack_items SET
            name            = COALESCE($3, name),
            description     = CASE WHEN $4 THEN $5 ELSE description END,
            category        = CASE WHEN $6 THEN $7 ELSE category END,
            weight          = COALESCE($8, weight),
            weight_unit     = COALESCE($9, weight_unit),
            quantity        = COALESCE($10, quantity),
            consumable      = COALESCE($11, consumable),
            worn            = COALESCE($12, worn),
            image           = CASE WHEN $13 THEN $14 ELSE image END,
            notes           = CASE WHEN $15 THEN $16 ELSE notes END,
            catalog_item_id = CASE WHEN $17 THEN $18 ELSE catalog_item_id END,
            updated_at      = now()
        WHERE id = $1 AND user_id = $2 AND deleted = FALSE
        RETURNING {ITEM_COLUMNS}
        "#
    ))
    .bind(item_id)
    .bind(user_id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(req.description.is_some())
    .bind(req.description.as_ref().and_then(|d| d.as_deref()))
    .bind(req.category.is_some())
    .bind(req.category.as_ref().and_then(|c| c.as_deref()))
    .bind(req.weight)
    .bind(req.weight_unit)
    .bind(req.quantity)
    .bind(req.consumable)
    .bind(req.worn)
    .bind(req.image.is_some())
    .bind(req.image.as_ref().and_then(|i| i.as_deref()))
    .bind(req.notes.is_some())
    .bind(req.notes.as_ref().and_then(|n| n.as_deref()))
    .bind(req.catalog_item_id.is_some())
    .bind(req.catalog_item_id.flatten())
    .fetch_optional(&mut *tx)
    .await
    .context("update item")?;
    if let Some(item) = &item {
        touch_pack(&mut *tx, item.pack_id).await?;
    }
    tx.commit().await.context("commit tx")?;
    Ok(item)
}

pub async fn soft_delete(db: &PgPool, user_id: Uuid, item_id: Uuid) -> anyhow::Result<bool> {
    let mut tx = db.begin().await.context("begin tx")?;
    let pack_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        UPDATE pack_items SET deleted = TRUE, updated_at = now()
        WHERE id = $1 AND user_id = $2 AND deleted = FALSE
        RETURNING pack_id
        "#,
    )
    .bind(item_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await
    .context("soft delete item")?;
    if let Some(pack_id) = pack_id {
        touch_pack(&mut *tx, pack_id).await?;
    }
    tx.commit().await.context("commit tx")?;
    Ok(pack_id.is_some())
}
