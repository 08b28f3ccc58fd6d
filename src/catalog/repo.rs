use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use super::CatalogItem;

const CATALOG_COLUMNS: &str = "id, name, description, brand, model, category, weight, weight_unit, \
     price, product_url, image, specs, created_at, updated_at";

const FILTER: &str = r#"
    ($1::text IS NULL OR name ILIKE $1 ESCAPE '\' OR brand ILIKE $1 ESCAPE '\')
    AND ($2::text IS NULL OR category = $2)
"#;

/// Substring `ILIKE` pattern for `q`, with the user's own wildcards escaped.
pub fn contains_pattern(q: &str) -> String {
    let mut out = String::with_capacity(q.len() + 2);
    out.push('%');
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

pub async fn search(
    db: &PgPool,
    q: Option<&str>,
    category: Option<&str>,
    limit: i64,
    offset: i64,
) -> anyhow::Result<(Vec<CatalogItem>, i64)> {
    let pattern = q.map(contains_pattern);
    let items = sqlx::query_as::<_, CatalogItem>(&format!(
        "SELECT {CATALOG_COLUMNS} FROM catalog_items WHERE {FILTER} ORDER BY name ASC LIMIT $3 OFFSET $4"
    ))
    .bind(pattern.as_deref())
    .bind(category)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("search catalog")?;

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM catalog_items WHERE {FILTER}"
    ))
    .bind(pattern.as_deref())
    .bind(category)
    .fetch_one(db)
    .await
    .context("count catalog")?;

    Ok((items, total))
}

pub async fn get(db: &PgPool, id: Uuid) -> anyhow::Result<Option<CatalogItem>> {
    let row = sqlx::query_as::<_, CatalogItem>(&format!(
        "SELECT {CATALOG_COLUMNS} FROM catalog_items WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
    .context("get catalog item")?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_in_query_are_literal() {
        assert_eq!(contains_pattern("tent"), "%tent%");
        assert_eq!(contains_pattern("100%"), "%100\\%%");
        assert_eq!(contains_pattern("a_b"), "%a\\_b%");
        assert_eq!(contains_pattern(r"c:\x"), r"%c:\\x%");
    }
}
