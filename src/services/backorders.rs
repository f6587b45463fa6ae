//! Backorder ledger - durable record of unmet demand.
//!
//! Policy: one open row per (site, order, product, variation). A repeated
//! shortfall for the same order line increments the existing open row
//! rather than inserting a sibling, so `qty_pending` always means "total
//! still owed for that line". The partial unique index `uniq_open_backorder`
//! enforces this; fulfilled rows fall out of the index and stay behind as
//! history.

use sqlx::PgExecutor;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::backorder::Backorder;

/// Record `qty` units of unmet demand for an order line.
///
/// Upserts into the open row for (site, order, product, variation),
/// creating it if none exists.
pub async fn create_or_increment(
    pool: &DbPool,
    site_id: &str,
    order_ref: &str,
    product_id: i64,
    variation_id: Option<i64>,
    qty: i32,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO backorders (site_id, remote_order_id, product_id, variation_id, qty_pending)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (site_id, remote_order_id, product_id, COALESCE(variation_id, 0))
            WHERE fulfilled_at IS NULL
        DO UPDATE SET qty_pending = backorders.qty_pending + EXCLUDED.qty_pending
        "#,
    )
    .bind(site_id)
    .bind(order_ref)
    .bind(product_id)
    .bind(variation_id)
    .bind(qty)
    .execute(pool)
    .await?;

    Ok(())
}

/// Open backorders for a product, oldest first, bounded batch.
///
/// The bound keeps a single reconciliation run from looping forever when
/// many customers are waiting on one product; the rest are picked up by
/// the next trigger.
pub async fn open_for_product(
    pool: &DbPool,
    product_id: i64,
    limit: i64,
) -> Result<Vec<Backorder>, AppError> {
    let rows = sqlx::query_as::<_, Backorder>(
        r#"
        SELECT * FROM backorders
        WHERE product_id = $1 AND fulfilled_at IS NULL
        ORDER BY created_at ASC, id ASC
        LIMIT $2
        "#,
    )
    .bind(product_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Lock one open backorder row for settlement.
///
/// `FOR UPDATE SKIP LOCKED` lets overlapping reconciliation runs pass over
/// rows another run is already working on. Returns None if the row is
/// gone, already fulfilled, or currently locked elsewhere.
pub async fn lock_open_row<'e, E>(executor: E, id: i64) -> Result<Option<Backorder>, AppError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, Backorder>(
        "SELECT * FROM backorders WHERE id = $1 AND fulfilled_at IS NULL FOR UPDATE SKIP LOCKED",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// Apply `delivered` keys against a locked row.
///
/// `qty_pending` only moves toward zero; reaching zero sets `fulfilled_at`
/// and makes the row terminal. The caller must hold the row lock (see
/// [`lock_open_row`]); the `qty_pending = $3` guard is belt and braces
/// against a stale read.
pub async fn settle<'e, E>(
    executor: E,
    id: i64,
    observed_pending: i32,
    delivered: i32,
) -> Result<bool, AppError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE backorders
        SET qty_pending = GREATEST(0, qty_pending - $2),
            fulfilled_at = CASE WHEN qty_pending - $2 <= 0 THEN NOW() ELSE NULL END
        WHERE id = $1 AND qty_pending = $3 AND fulfilled_at IS NULL
        "#,
    )
    .bind(id)
    .bind(delivered)
    .bind(observed_pending)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Products that currently have open backorders, for the scheduled sweep.
pub async fn products_with_open(pool: &DbPool, limit: i64) -> Result<Vec<i64>, AppError> {
    let ids = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT DISTINCT product_id FROM backorders
        WHERE fulfilled_at IS NULL
        ORDER BY product_id
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}
