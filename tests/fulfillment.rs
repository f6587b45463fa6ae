//! Fulfillment reconciler behavior: restocks top up short orders, rows
//! settle monotonically, and unlocatable orders never strand keys.

mod common;

use sqlx::PgPool;

use multishop::config::SiteMode;
use multishop::services::{backorders, fulfillment, ledger, orders};

use common::{paid_order, stock_keys, test_state};

#[sqlx::test]
async fn restock_tops_up_a_short_order(pool: PgPool) {
    let state = test_state(pool.clone(), SiteMode::Primary);
    stock_keys(&pool, &state.cipher, 42, &["K-1"]).await;

    // Three wanted, one in stock
    let response = orders::process_paid_order(&state, paid_order("1057", 42, 3))
        .await
        .unwrap();
    assert_eq!(response.status, "allocated");
    let allocations = response.allocations.unwrap();
    assert_eq!(allocations[0].keys, vec!["K-1"]);
    assert_eq!(allocations[0].pending, 2);

    let items = orders::items_for(&pool, response.order_id).await.unwrap();
    assert_eq!(items[0].delivered_keys.as_deref(), Some("K-1"));
    assert!(items[0].shortage_notice.is_some());

    // New stock lands and the reconciler runs, as the import handler does
    stock_keys(&pool, &state.cipher, 42, &["K-2", "K-3"]).await;
    fulfillment::fulfill_backorders_for_product(&pool, &state.config, &state.cipher, 42)
        .await
        .unwrap();

    // Fresh keys append after the original, the notice clears
    let items = orders::items_for(&pool, response.order_id).await.unwrap();
    assert_eq!(items[0].delivered_keys.as_deref(), Some("K-1\nK-2\nK-3"));
    assert!(items[0].shortage_notice.is_none());

    let terminal: bool = sqlx::query_scalar(
        "SELECT qty_pending = 0 AND fulfilled_at IS NOT NULL FROM backorders WHERE product_id = 42",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(terminal);

    // Terminal rows are never reprocessed: more stock changes nothing
    stock_keys(&pool, &state.cipher, 42, &["K-4"]).await;
    fulfillment::fulfill_backorders_for_product(&pool, &state.config, &state.cipher, 42)
        .await
        .unwrap();
    let items = orders::items_for(&pool, response.order_id).await.unwrap();
    assert_eq!(items[0].delivered_keys.as_deref(), Some("K-1\nK-2\nK-3"));
    assert_eq!(ledger::available_count(&pool, 42, None).await.unwrap(), 1);
}

#[sqlx::test]
async fn partial_restock_decrements_and_leaves_row_open(pool: PgPool) {
    let state = test_state(pool.clone(), SiteMode::Primary);

    // Four wanted, none in stock
    orders::process_paid_order(&state, paid_order("2001", 7, 4))
        .await
        .unwrap();
    let open = backorders::open_for_product(&pool, 7, 10).await.unwrap();
    assert_eq!(open[0].qty_pending, 4);

    // One key arrives
    stock_keys(&pool, &state.cipher, 7, &["N-1"]).await;
    fulfillment::fulfill_backorders_for_product(&pool, &state.config, &state.cipher, 7)
        .await
        .unwrap();

    let open = backorders::open_for_product(&pool, 7, 10).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].qty_pending, 3);
    assert!(open[0].fulfilled_at.is_none());

    // A run with nothing available leaves the row untouched
    fulfillment::fulfill_backorders_for_product(&pool, &state.config, &state.cipher, 7)
        .await
        .unwrap();
    let open = backorders::open_for_product(&pool, 7, 10).await.unwrap();
    assert_eq!(open[0].qty_pending, 3);
    assert!(open[0].fulfilled_at.is_none());
}

#[sqlx::test]
async fn missing_target_order_claims_no_keys(pool: PgPool) {
    let state = test_state(pool.clone(), SiteMode::Primary);

    // Demand recorded for an order this installation has never seen
    // (a mirror that has not arrived yet)
    backorders::create_or_increment(&pool, "shop-b", "9999", 42, None, 2)
        .await
        .unwrap();
    stock_keys(&pool, &state.cipher, 42, &["K-1", "K-2"]).await;

    fulfillment::fulfill_backorders_for_product(&pool, &state.config, &state.cipher, 42)
        .await
        .unwrap();

    // Row stays open for a future attempt, and no key was stranded on an
    // order nobody can find
    let open = backorders::open_for_product(&pool, 42, 10).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].qty_pending, 2);
    assert_eq!(ledger::available_count(&pool, 42, None).await.unwrap(), 2);
}

#[sqlx::test]
async fn sweep_covers_every_product_with_open_rows(pool: PgPool) {
    let state = test_state(pool.clone(), SiteMode::Primary);

    orders::process_paid_order(&state, paid_order("3001", 11, 1))
        .await
        .unwrap();
    orders::process_paid_order(&state, paid_order("3002", 12, 1))
        .await
        .unwrap();

    stock_keys(&pool, &state.cipher, 11, &["P-11"]).await;
    stock_keys(&pool, &state.cipher, 12, &["P-12"]).await;

    fulfillment::sweep(&pool, &state.config, &state.cipher)
        .await
        .unwrap();

    assert!(backorders::open_for_product(&pool, 11, 10).await.unwrap().is_empty());
    assert!(backorders::open_for_product(&pool, 12, 10).await.unwrap().is_empty());
}
