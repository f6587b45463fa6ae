//! Paid-order intake: the processed-once flag and the never-fail-checkout
//! degradation paths.

mod common;

use sqlx::PgPool;

use multishop::config::SiteMode;
use multishop::services::{ledger, orders};

use common::{paid_order, stock_keys, test_state};

#[sqlx::test]
async fn repeated_paid_event_claims_nothing_more(pool: PgPool) {
    let state = test_state(pool.clone(), SiteMode::Primary);
    stock_keys(&pool, &state.cipher, 42, &["K-1", "K-2"]).await;

    let first = orders::process_paid_order(&state, paid_order("1057", 42, 1))
        .await
        .unwrap();
    assert_eq!(first.status, "allocated");
    assert_eq!(first.allocations.unwrap()[0].keys, vec!["K-1"]);

    // The storefront delivers the same event again
    let second = orders::process_paid_order(&state, paid_order("1057", 42, 1))
        .await
        .unwrap();
    assert_eq!(second.status, "already_processed");
    assert_eq!(second.order_id, first.order_id);
    assert!(second.allocations.is_none());

    // One key claimed, one email queued, despite two deliveries
    assert_eq!(ledger::available_count(&pool, 42, None).await.unwrap(), 1);
    let emails: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM email_outbox")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(emails, 1);
}

#[sqlx::test]
async fn unreachable_primary_queues_the_mirror(pool: PgPool) {
    // The test Primary URL points at a closed port; the mirror send fails
    let state = test_state(pool.clone(), SiteMode::Secondary);

    let response = orders::process_paid_order(&state, paid_order("2044", 42, 1))
        .await
        .unwrap();

    // Checkout still completed; the payload waits for the hourly drain
    assert_eq!(response.status, "mirror_queued");
    assert!(response.allocations.is_none());

    let queued: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mirror_queue")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(queued, 1);

    let order = orders::find_by_origin(&pool, "shop-a", "2044")
        .await
        .unwrap()
        .expect("order row recorded");
    assert!(!order.keys_allocated);
}

#[sqlx::test]
async fn empty_orders_are_rejected_up_front(pool: PgPool) {
    let state = test_state(pool.clone(), SiteMode::Primary);

    let mut request = paid_order("3001", 42, 1);
    request.items.clear();
    assert!(orders::process_paid_order(&state, request).await.is_err());

    let mut request = paid_order("", 42, 1);
    request.order_ref = "   ".into();
    assert!(orders::process_paid_order(&state, request).await.is_err());

    let order_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(order_count, 0);
}
