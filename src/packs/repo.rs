use anyhow::Context;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::{CreatePackRequest, UpdatePackRequest};
use super::repo_types::Pack;

const PACK_COLUMNS: &str =
    "id, user_id, name, description, category, is_public, image, tags, deleted, created_at, updated_at";

/// Live packs, or every change after `since` including tombstones.
pub async fn list_by_user(
    db: &PgPool,
    user_id: Uuid,
    since: Option<OffsetDateTime>,
) -> anyhow::Result<Vec<Pack>> {
    let rows = sqlx::query_as::<_, Pack>(&format!(
        r#"
        SELECT {PACK_COLUMNS}
        FROM packs
        WHERE user_id = $1
          AND (($2::timestamptz IS NULL AND deleted = FALSE) OR updated_at > $2)
        ORDER BY updated_at DESC
        "#
    ))
    .bind(user_id)
    .bind(since)
    .fetch_all(db)
    .await
    .context("list packs by user")?;
    Ok(rows)
}

/// A live pack visible to `viewer`: their own, or a public one.
pub async fn get_visible(db: &PgPool, viewer: Uuid, pack_id: Uuid) -> anyhow::Result<Option<Pack>> {
    let row = sqlx::query_as::<_, Pack>(&format!(
        r#"
        SELECT {PACK_COLUMNS}
        FROM packs
        WHERE id = $1 AND deleted = FALSE AND (user_id = $2 OR is_public)
        "#
    ))
    .bind(pack_id)
    .bind(viewer)
    .fetch_optional(db)
    .await
    .context("get pack")?;
    Ok(row)
}

pub async fn insert(db: &PgPool, user_id: Uuid, req: &CreatePackRequest) -> anyhow::Result<Pack> {
    let row = sqlx::query_as::<_, Pack>(&format!(
        r#"
        INSERT INTO packs (id, user_id, name, description, category, is_public, image, tags)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {PACK_COLUMNS}
        "#
    ))
    .bind(req.id.unwrap_or_else(Uuid::new_v4))
    .bind(user_id)
    .bind(req.name.trim())
    .bind(&req.description)
    .bind(req.category)
    .bind(req.is_public)
    .bind(&req.image)
    .bind(&req.tags)
    .fetch_one(db)
    .await
    .context("insert pack")?;
    Ok(row)
}

pub async fn update(
    db: &PgPool,
    user_id: Uuid,
    pack_id: Uuid,
    req: &UpdatePackRequest,
) -> anyhow::Result<Option<Pack>> {
    let row = sqlx::query_as::<_, Pack>(&format!(
        r#"
        UPDATE packs SET
            name        = COALESCE($3, name),
            description = CASE WHEN $4 THEN $5 ELSE description END,
            category    = COALESCE($6, category),
            is_public   = COALESCE($7, is_public),
            image       = CASE WHEN $8 THEN $9 ELSE image END,
            tags        = COALESCE($10, tags),
            updated_at  = now()
        WHERE id = $1 AND user_id = $2 AND deleted = FALSE
        RETURNING {PACK_COLUMNS}
        "#
    ))
    .bind(pack_id)
    .bind(user_id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(req.description.is_some())
    .bind(req.description.as_ref().and_then(|d| d.as_deref()))
    .bind(req.category)
    .bind(req.is_public)
    .bind(req.image.is_some())
    .bind(req.image.as_ref().and_then(|i| i.as_deref()))
    .bind(&req.tags)
    .fetch_optional(db)
    .await
    .context("update pack")?;
    Ok(row)
}

/// Tombstones the pack and every item in it.
pub async fn soft_delete(db: &PgPool, user_id: Uuid, pack_id: Uuid) -> anyhow::Result<bool> {
    let mut tx = db.begin().await.context("begin tx")?;
    let res = sqlx::query(
        r#"
        UPDATE packs SET deleted = TRUE, updated_at = now()
        WHERE id = $1 AND user_id = $2 AND deleted = FALSE
        "#,
    )
    .bind(pack_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .context("soft delete pack")?;
    if res.rows_affected() == 0 {
        return Ok(false);
    }
    sqlx::query(
        "UPDATE pack_items SET deleted = TRUE, updated_at = now() WHERE pack_id = $1 AND deleted = FALSE",
    )
    .bind(pack_id)
    .execute(&mut *tx)
    .await
    .context("soft delete pack items")?;
    tx.commit().await.context("commit tx")?;
    Ok(true)
}
