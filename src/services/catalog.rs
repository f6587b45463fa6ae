//! Catalog service: paging for the cross-site catalog endpoint and the
//! upsert-by-SKU used by the Secondary's sync job.

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::product::{CatalogItem, Product};

/// Outcome of one catalog upsert, for the sync job's tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Skipped,
}

/// One catalog page, plus the total page count.
pub async fn page(
    pool: &DbPool,
    page: i64,
    page_size: i64,
) -> Result<(Vec<CatalogItem>, i64), AppError> {
    let page = page.max(1);

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products")
        .fetch_one(pool)
        .await?;
    let max_pages = if total == 0 { 1 } else { total.div_ceil(page_size) };

    let products = sqlx::query_as::<_, Product>(
        "SELECT * FROM products ORDER BY sku ASC LIMIT $1 OFFSET $2",
    )
    .bind(page_size)
    .bind((page - 1) * page_size)
    .fetch_all(pool)
    .await?;

    Ok((products.into_iter().map(CatalogItem::from).collect(), max_pages))
}

/// Upsert one synced catalog entry by SKU.
///
/// Blank SKUs are skipped; products cannot be matched across sites
/// without one.
pub async fn upsert_item(pool: &DbPool, item: &CatalogItem) -> Result<UpsertOutcome, AppError> {
    if item.sku.trim().is_empty() {
        return Ok(UpsertOutcome::Skipped);
    }

    let inserted = sqlx::query_scalar::<_, bool>(
        r#"
        INSERT INTO products (sku, title, kind, price_cents, business_price_cents, custom_email, image_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (sku) DO UPDATE SET
            title = EXCLUDED.title,
            kind = EXCLUDED.kind,
            price_cents = EXCLUDED.price_cents,
            business_price_cents = EXCLUDED.business_price_cents,
            custom_email = EXCLUDED.custom_email,
            image_url = EXCLUDED.image_url,
            updated_at = NOW()
        RETURNING (xmax = 0)
        "#,
    )
    .bind(item.sku.trim())
    .bind(&item.title)
    .bind(&item.kind)
    .bind(item.price_cents)
    .bind(item.business_price_cents)
    .bind(&item.custom_email)
    .bind(&item.image_url)
    .fetch_one(pool)
    .await?;

    Ok(if inserted {
        UpsertOutcome::Created
    } else {
        UpsertOutcome::Updated
    })
}

/// Look up a product by SKU (mirror-order resolution).
pub async fn find_by_sku(pool: &DbPool, sku: &str) -> Result<Option<Product>, AppError> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE sku = $1")
        .bind(sku)
        .fetch_optional(pool)
        .await?;

    Ok(product)
}

/// Look up a product by id.
pub async fn find_by_id(pool: &DbPool, id: i64) -> Result<Option<Product>, AppError> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(product)
}
