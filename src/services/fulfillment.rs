//! Fulfillment reconciler - closes the loop when new stock arrives for a
//! product with outstanding backorders.
//!
//! Runs synchronously after every successful key import and hourly as a
//! safety net. Work is bounded per run; whatever a batch leaves behind is
//! picked up by the next trigger.
//!
//! Each row settles inside its own transaction holding a `FOR UPDATE SKIP
//! LOCKED` lock, so overlapping runs never double-decrement a row. The
//! target order and line item are located before any key is claimed:
//! assignment is permanent, and a key claimed for an order nobody can
//! find would be stranded.

use crate::config::Config;
use crate::crypto::KeyCipher;
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::backorder::Backorder;
use crate::models::order::{Order, OrderItem};
use crate::services::{allocation, backorders, emails, event_log};

/// Upper bound on rows processed per product per run.
const BATCH_SIZE: i64 = 50;

/// Upper bound on products visited by one scheduled sweep.
const SWEEP_PRODUCTS: i64 = 20;

/// What happened to one backorder row.
#[derive(Debug)]
enum RowOutcome {
    /// Row was locked by another run, already fulfilled, or gone.
    Skipped,
    /// Still nothing available; row left untouched.
    NoStock,
    /// Target order or its line item is missing; row left for a future
    /// attempt (recoverable, the order may be mirrored later).
    OrderMissing,
    /// Keys were delivered and the row advanced.
    Delivered { order_id: i64, delivered: usize },
}

/// Re-attempt allocation for every open backorder of one product.
///
/// Failures are caught per row, logged with context, and never abort the
/// rest of the batch.
pub async fn fulfill_backorders_for_product(
    pool: &DbPool,
    config: &Config,
    cipher: &KeyCipher,
    product_id: i64,
) -> Result<(), AppError> {
    let rows = backorders::open_for_product(pool, product_id, BATCH_SIZE).await?;
    if rows.is_empty() {
        return Ok(());
    }

    for row in rows {
        match fulfill_row(pool, cipher, &row).await {
            Ok(RowOutcome::Delivered { order_id, delivered }) => {
                event_log::record(
                    pool,
                    "info",
                    "backorder keys delivered",
                    serde_json::json!({
                        "site_id": row.site_id,
                        "order_ref": row.remote_order_id,
                        "product_id": row.product_id,
                        "delivered": delivered,
                    }),
                )
                .await;

                if let Err(e) = emails::send_order_keys_email(pool, config, order_id).await {
                    tracing::error!(order_id, error = %e, "failed to queue keys email");
                }
            }
            Ok(RowOutcome::OrderMissing) => {
                tracing::warn!(
                    backorder_id = row.id,
                    site_id = %row.site_id,
                    order_ref = %row.remote_order_id,
                    "backorder target order not found, leaving row open"
                );
                event_log::record(
                    pool,
                    "warning",
                    "backorder target order not found",
                    serde_json::json!({
                        "site_id": row.site_id,
                        "order_ref": row.remote_order_id,
                        "product_id": row.product_id,
                    }),
                )
                .await;
            }
            Ok(_) => {}
            Err(e) => {
                // Per-row failure; keep going with the rest of the batch
                tracing::error!(
                    backorder_id = row.id,
                    product_id,
                    error = %e,
                    "backorder fulfillment failed"
                );
                event_log::record(
                    pool,
                    "error",
                    "backorder fulfillment failed",
                    serde_json::json!({
                        "site_id": row.site_id,
                        "order_ref": row.remote_order_id,
                        "product_id": row.product_id,
                        "error": e.to_string(),
                    }),
                )
                .await;
            }
        }
    }

    Ok(())
}

/// Scheduled safety net: visit every product with open backorders.
pub async fn sweep(pool: &DbPool, config: &Config, cipher: &KeyCipher) -> Result<(), AppError> {
    for product_id in backorders::products_with_open(pool, SWEEP_PRODUCTS).await? {
        fulfill_backorders_for_product(pool, config, cipher, product_id).await?;
    }
    Ok(())
}

/// Settle one backorder row.
async fn fulfill_row(
    pool: &DbPool,
    cipher: &KeyCipher,
    row: &Backorder,
) -> Result<RowOutcome, AppError> {
    let mut tx = pool.begin().await?;

    let Some(locked) = backorders::lock_open_row(&mut *tx, row.id).await? else {
        return Ok(RowOutcome::Skipped);
    };

    // Locate the order this demand belongs to: placed locally or mirrored
    // here from its origin site. Either way the origin pair finds it.
    let order = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE site_id = $1 AND remote_order_id = $2",
    )
    .bind(&locked.site_id)
    .bind(&locked.remote_order_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(order) = order else {
        tx.rollback().await?;
        return Ok(RowOutcome::OrderMissing);
    };

    let item = sqlx::query_as::<_, OrderItem>(
        r#"
        SELECT * FROM order_items
        WHERE order_id = $1 AND product_id = $2 AND variation_id IS NOT DISTINCT FROM $3
        ORDER BY id ASC
        LIMIT 1
        "#,
    )
    .bind(order.id)
    .bind(locked.product_id)
    .bind(locked.variation_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(item) = item else {
        tx.rollback().await?;
        return Ok(RowOutcome::OrderMissing);
    };

    let (claimed, keys) = allocation::claim_and_decrypt(
        &mut *tx,
        cipher,
        locked.product_id,
        locked.variation_id,
        locked.qty_pending,
        &locked.site_id,
        &locked.remote_order_id,
    )
    .await?;

    if claimed == 0 {
        // Still nothing available
        tx.commit().await?;
        return Ok(RowOutcome::NoStock);
    }

    // Append freshly delivered keys after any prior content
    let mut text = item.delivered_keys.clone().unwrap_or_default();
    if !keys.is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&keys.join("\n"));
    }

    let now_delivered = text.lines().filter(|l| !l.is_empty()).count();
    let satisfied = now_delivered >= item.quantity.max(0) as usize;
    let notice = if satisfied { None } else { item.shortage_notice.clone() };

    sqlx::query(
        "UPDATE order_items SET delivered_keys = NULLIF($1, ''), shortage_notice = $2 WHERE id = $3",
    )
    .bind(&text)
    .bind(&notice)
    .bind(item.id)
    .execute(&mut *tx)
    .await?;

    let delivered = keys.len();
    backorders::settle(&mut *tx, locked.id, locked.qty_pending, delivered as i32).await?;

    tx.commit().await?;

    Ok(RowOutcome::Delivered {
        order_id: order.id,
        delivered,
    })
}
