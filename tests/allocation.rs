//! Key ledger and allocation service behavior: atomic claims, shortage
//! accounting, and backorder recording.

mod common;

use std::collections::HashSet;

use sqlx::PgPool;

use multishop::models::protocol::AllocationRequestItem;
use multishop::services::{allocation, backorders, ledger};

use common::stock_keys;

fn demand(product_id: i64, quantity: i32) -> AllocationRequestItem {
    AllocationRequestItem {
        product_id,
        variation_id: None,
        quantity,
    }
}

#[sqlx::test]
async fn exact_stock_allocates_everything(pool: PgPool) {
    let cipher = common::cipher();
    stock_keys(&pool, &cipher, 42, &["K-1", "K-2", "K-3"]).await;

    let result = allocation::allocate(&pool, &cipher, "shop-a", "order-1", &[demand(42, 3)])
        .await
        .unwrap();

    assert_eq!(result.len(), 1);
    // FIFO: oldest stock first
    assert_eq!(result[0].keys, vec!["K-1", "K-2", "K-3"]);
    assert_eq!(result[0].pending, 0);
    assert_eq!(ledger::available_count(&pool, 42, None).await.unwrap(), 0);

    // Nothing short, so nothing backordered
    let open = backorders::open_for_product(&pool, 42, 10).await.unwrap();
    assert!(open.is_empty());
}

#[sqlx::test]
async fn keys_plus_pending_equals_quantity_per_line(pool: PgPool) {
    let cipher = common::cipher();
    stock_keys(&pool, &cipher, 1, &["A-1", "A-2"]).await;
    // product 2 has no stock at all

    let result = allocation::allocate(
        &pool,
        &cipher,
        "shop-a",
        "order-1",
        &[demand(1, 5), demand(2, 3), demand(3, 0)],
    )
    .await
    .unwrap();

    // quantity-zero lines are skipped, not errors
    assert_eq!(result.len(), 2);
    for alloc in &result {
        let quantity = if alloc.product_id == 1 { 5 } else { 3 };
        assert_eq!(alloc.keys.len() as i32 + alloc.pending, quantity);
    }

    // The empty line kept nothing from the stocked one: per-line
    // allocation, no cross-item rollback
    assert_eq!(result[0].keys.len(), 2);
    assert_eq!(result[1].keys.len(), 0);
}

#[sqlx::test]
async fn shortage_merges_into_one_open_backorder_per_line(pool: PgPool) {
    let cipher = common::cipher();
    stock_keys(&pool, &cipher, 42, &["K-1"]).await;

    let result = allocation::allocate(&pool, &cipher, "shop-a", "order-1", &[demand(42, 3)])
        .await
        .unwrap();
    assert_eq!(result[0].pending, 2);

    let open = backorders::open_for_product(&pool, 42, 10).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].qty_pending, 2);
    assert_eq!(open[0].site_id, "shop-a");
    assert_eq!(open[0].remote_order_id, "order-1");

    // A second shortfall for the same order line increments the open row
    // instead of inserting a sibling
    allocation::allocate(&pool, &cipher, "shop-a", "order-1", &[demand(42, 1)])
        .await
        .unwrap();
    let open = backorders::open_for_product(&pool, 42, 10).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].qty_pending, 3);
}

#[sqlx::test]
async fn concurrent_claims_never_share_a_key(pool: PgPool) {
    let cipher = common::cipher();
    stock_keys(&pool, &cipher, 42, &["C-1", "C-2", "C-3", "C-4", "C-5"]).await;

    // Four buyers race for five keys, two each
    let mut handles = Vec::new();
    for i in 0..4 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            ledger::claim(&pool, 42, None, 2, "shop-a", &format!("order-{i}"))
                .await
                .unwrap()
        }));
    }

    let mut claimed = Vec::new();
    for handle in handles {
        claimed.extend(handle.await.unwrap());
    }

    // Every key was handed out exactly once
    assert_eq!(claimed.len(), 5);
    let unique: HashSet<&String> = claimed.iter().collect();
    assert_eq!(unique.len(), 5);
    assert_eq!(ledger::available_count(&pool, 42, None).await.unwrap(), 0);

    let double_assigned: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM cd_keys WHERE status = 'assigned' AND assigned_order_ref IS NULL",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(double_assigned, 0);
}

#[sqlx::test]
async fn assigned_keys_are_frozen_for_admins(pool: PgPool) {
    let cipher = common::cipher();
    stock_keys(&pool, &cipher, 42, &["E-1", "E-2"]).await;

    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM cd_keys ORDER BY id ASC")
        .fetch_all(&pool)
        .await
        .unwrap();

    // Assign the first key to an order
    let claimed = ledger::claim(&pool, 42, None, 1, "shop-a", "order-1")
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);

    // The available key can still be edited and deleted
    assert!(ledger::update_available(&pool, &cipher, ids[1], "E-2-FIXED")
        .await
        .unwrap());
    assert!(ledger::delete_available(&pool, ids[1]).await.unwrap());

    // The assigned one is untouchable either way
    assert!(!ledger::update_available(&pool, &cipher, ids[0], "E-1-FIXED")
        .await
        .unwrap());
    assert!(!ledger::delete_available(&pool, ids[0]).await.unwrap());
}

#[sqlx::test]
async fn variations_draw_from_separate_pools(pool: PgPool) {
    let cipher = common::cipher();
    let base: Vec<String> = vec!["BASE-1".into()];
    let deluxe: Vec<String> = vec!["DLX-1".into()];
    ledger::insert_many(&pool, &cipher, 42, None, &base).await.unwrap();
    ledger::insert_many(&pool, &cipher, 42, Some(7), &deluxe).await.unwrap();

    let claimed = ledger::claim(&pool, 42, Some(7), 2, "shop-a", "order-1")
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(cipher.decrypt(&claimed[0]).unwrap(), "DLX-1");

    // The variationless pool was not drained by the variation claim
    assert_eq!(ledger::available_count(&pool, 42, None).await.unwrap(), 1);
}
