//! Order intake and key attachment.
//!
//! Handles the "order became paid" event from the host storefront. On the
//! Primary the order is allocated locally; on a Secondary it is mirrored
//! to the Primary (or, with mirroring disabled, allocated remotely over
//! the allocate-keys call). Checkout never fails because of allocation or
//! mirroring problems; degraded outcomes come back as data.

use sqlx::PgExecutor;

use crate::config::SiteMode;
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::order::{Order, OrderItem, PaidOrderRequest, PaidOrderResponse};
use crate::models::protocol::{AllocationRequestItem, ItemAllocation, MirrorOrderResponse};
use crate::services::{allocation, emails, event_log, outbound};
use crate::state::AppState;

/// Find an order by its origin (site, order reference). Covers both
/// locally placed orders and, on the Primary, mirrored ones.
pub async fn find_by_origin<'e, E>(
    executor: E,
    site_id: &str,
    remote_order_id: &str,
) -> Result<Option<Order>, AppError>
where
    E: PgExecutor<'e>,
{
    let order = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE site_id = $1 AND remote_order_id = $2",
    )
    .bind(site_id)
    .bind(remote_order_id)
    .fetch_optional(executor)
    .await?;

    Ok(order)
}

/// Line items of an order, in insertion order.
pub async fn items_for(pool: &DbPool, order_id: i64) -> Result<Vec<OrderItem>, AppError> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY id ASC",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

/// Process one paid-order event.
///
/// Re-delivery of the same event is harmless: the (site, order_ref) pair
/// is unique and an already-processed order returns early without
/// touching the ledger again.
pub async fn process_paid_order(
    state: &AppState,
    req: PaidOrderRequest,
) -> Result<PaidOrderResponse, AppError> {
    if req.order_ref.trim().is_empty() {
        return Err(AppError::InvalidRequest("order_ref must not be empty".into()));
    }
    if req.items.is_empty() {
        return Err(AppError::InvalidRequest("order has no items".into()));
    }

    let config = &state.config;
    let total_cents: i64 = req
        .items
        .iter()
        .map(|i| i.unit_price_cents * i64::from(i.quantity.max(0)))
        .sum();

    // Record the order, or pick up the existing row on re-delivery
    let mut tx = state.pool.begin().await?;
    let inserted = sqlx::query(
        r#"
        INSERT INTO orders (
            site_id, remote_order_id, remote_order_number, customer_segment,
            customer_email, billing_address, shipping_address, status,
            total_cents, currency
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'processing', $8, $9)
        ON CONFLICT (site_id, remote_order_id) DO NOTHING
        "#,
    )
    .bind(&config.site_id)
    .bind(req.order_ref.trim())
    .bind(&req.order_number)
    .bind(req.customer_segment.as_str())
    .bind(&req.customer_email)
    .bind(&req.billing)
    .bind(&req.shipping)
    .bind(total_cents)
    .bind(&config.currency)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        > 0;

    let order = find_by_origin(&mut *tx, &config.site_id, req.order_ref.trim())
        .await?
        .ok_or(AppError::OrderNotFound)?;

    if inserted {
        for item in &req.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, variation_id, sku, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order.id)
            .bind(item.product_id)
            .bind(item.variation_id)
            .bind(&item.sku)
            .bind(item.quantity.max(0))
            .bind(item.unit_price_cents)
            .execute(&mut *tx)
            .await?;
        }
    }
    tx.commit().await?;

    if order.keys_allocated {
        return Ok(PaidOrderResponse {
            order_id: order.id,
            status: "already_processed".into(),
            allocations: None,
        });
    }

    let items = items_for(&state.pool, order.id).await?;

    match config.mode {
        SiteMode::Primary => allocate_locally(state, &order, &items).await,
        SiteMode::Secondary if config.mirror_orders => mirror_to_primary(state, &order, &items).await,
        SiteMode::Secondary => allocate_remotely(state, &order, &items).await,
    }
}

/// Primary path: claim from the local ledger and attach.
async fn allocate_locally(
    state: &AppState,
    order: &Order,
    items: &[OrderItem],
) -> Result<PaidOrderResponse, AppError> {
    let demands: Vec<AllocationRequestItem> = items
        .iter()
        .map(|i| AllocationRequestItem {
            product_id: i.product_id,
            variation_id: i.variation_id,
            quantity: i.quantity,
        })
        .collect();

    let allocations = allocation::allocate(
        &state.pool,
        &state.cipher,
        &state.config.site_id,
        &order.remote_order_id,
        &demands,
    )
    .await?;

    attach_allocations(&state.pool, &state.config.shortage_message, order.id, &allocations).await?;
    mark_allocated(&state.pool, order.id, None).await?;

    // The customer hears from us right away; short lines carry the
    // shortage notice and get topped up by the reconciler later.
    if let Err(e) = emails::send_order_keys_email(&state.pool, &state.config, order.id).await {
        tracing::error!(order_id = order.id, error = %e, "failed to queue keys email");
    }

    Ok(PaidOrderResponse {
        order_id: order.id,
        status: "allocated".into(),
        allocations: Some(allocations),
    })
}

/// Secondary path, default: mirror the order to the Primary in one signed
/// round trip. Failure enqueues the payload for the hourly retry drain.
async fn mirror_to_primary(
    state: &AppState,
    order: &Order,
    items: &[OrderItem],
) -> Result<PaidOrderResponse, AppError> {
    let payload = outbound::build_mirror_payload(state, order, items).await?;

    match outbound::mirror_order(state, &payload).await {
        Ok(response) => {
            let allocations = response.allocations.clone();
            apply_mirror_result(state, order.id, response).await?;
            Ok(PaidOrderResponse {
                order_id: order.id,
                status: "mirrored".into(),
                allocations: Some(allocations),
            })
        }
        Err(e) => {
            tracing::error!(order_id = order.id, error = %e, "mirror to primary failed, queueing");
            event_log::record(
                &state.pool,
                "error",
                "mirror order failed",
                serde_json::json!({
                    "site_id": state.config.site_id,
                    "order_ref": order.remote_order_id,
                    "error": e.to_string(),
                }),
            )
            .await;
            outbound::enqueue_mirror(&state.pool, &payload).await?;
            Ok(PaidOrderResponse {
                order_id: order.id,
                status: "mirror_queued".into(),
                allocations: None,
            })
        }
    }
}

/// Secondary path with mirroring disabled: request allocation over the
/// wire and attach keys to the local order only.
async fn allocate_remotely(
    state: &AppState,
    order: &Order,
    items: &[OrderItem],
) -> Result<PaidOrderResponse, AppError> {
    let demands: Vec<AllocationRequestItem> = items
        .iter()
        .map(|i| AllocationRequestItem {
            product_id: i.product_id,
            variation_id: i.variation_id,
            quantity: i.quantity,
        })
        .collect();

    match outbound::request_allocation(state, &order.remote_order_id, order.segment(), demands).await
    {
        Ok(allocations) => {
            attach_allocations(&state.pool, &state.config.shortage_message, order.id, &allocations)
                .await?;
            mark_allocated(&state.pool, order.id, None).await?;
            Ok(PaidOrderResponse {
                order_id: order.id,
                status: "allocated".into(),
                allocations: Some(allocations),
            })
        }
        Err(e) => {
            tracing::error!(order_id = order.id, error = %e, "remote allocation unavailable");
            event_log::record(
                &state.pool,
                "error",
                "remote allocation failed",
                serde_json::json!({
                    "site_id": state.config.site_id,
                    "order_ref": order.remote_order_id,
                    "error": e.to_string(),
                }),
            )
            .await;
            Ok(PaidOrderResponse {
                order_id: order.id,
                status: "allocation_unavailable".into(),
                allocations: None,
            })
        }
    }
}

/// Store a successful mirror response against the local order: the
/// Primary's display number and our own copy of the delivered keys. Both
/// sites intentionally hold the keys so either can re-send the email.
pub async fn apply_mirror_result(
    state: &AppState,
    order_id: i64,
    response: MirrorOrderResponse,
) -> Result<(), AppError> {
    attach_allocations(
        &state.pool,
        &state.config.shortage_message,
        order_id,
        &response.allocations,
    )
    .await?;
    mark_allocated(&state.pool, order_id, Some(&response.order_number)).await?;

    event_log::record(
        &state.pool,
        "info",
        "order mirrored to primary",
        serde_json::json!({
            "site_id": state.config.site_id,
            "order_id": order_id,
            "primary_order_number": response.order_number,
        }),
    )
    .await;

    Ok(())
}

/// Attach allocation results to order line items.
///
/// Keys append to any existing delivered text (newline-joined, preserving
/// prior content). A pending shortfall sets the shortage notice; a line
/// that now holds at least its quantity gets the notice cleared.
pub async fn attach_allocations(
    pool: &DbPool,
    shortage_message: &str,
    order_id: i64,
    allocations: &[ItemAllocation],
) -> Result<(), AppError> {
    for alloc in allocations {
        let item = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT * FROM order_items
            WHERE order_id = $1 AND product_id = $2 AND variation_id IS NOT DISTINCT FROM $3
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(order_id)
        .bind(alloc.product_id)
        .bind(alloc.variation_id)
        .fetch_optional(pool)
        .await?;

        let Some(item) = item else {
            tracing::warn!(
                order_id,
                product_id = alloc.product_id,
                "allocation result has no matching order line"
            );
            continue;
        };

        let mut text = item.delivered_keys.clone().unwrap_or_default();
        if !alloc.keys.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&alloc.keys.join("\n"));
        }

        let delivered = text.lines().filter(|l| !l.is_empty()).count();
        let notice: Option<String> = if alloc.pending > 0 {
            Some(shortage_message.to_string())
        } else if delivered >= item.quantity.max(0) as usize {
            None
        } else {
            item.shortage_notice.clone()
        };

        sqlx::query(
            "UPDATE order_items SET delivered_keys = NULLIF($1, ''), shortage_notice = $2 WHERE id = $3",
        )
        .bind(&text)
        .bind(&notice)
        .bind(item.id)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Flip the processed-once flag, optionally storing the Primary's display
/// order number.
pub async fn mark_allocated(
    pool: &DbPool,
    order_id: i64,
    primary_order_number: Option<&str>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE orders
        SET keys_allocated = TRUE,
            primary_order_number = COALESCE($2, primary_order_number),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(order_id)
    .bind(primary_order_number)
    .execute(pool)
    .await?;

    Ok(())
}

impl Order {
    /// The resolved segment this order was placed under.
    pub fn segment(&self) -> crate::models::segment::Segment {
        crate::models::segment::Segment::from_db(&self.customer_segment)
    }
}
