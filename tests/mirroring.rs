//! Primary-side order mirroring: SKU resolution, segment pricing, inline
//! allocation, and duplicate-request idempotency.

mod common;

use sqlx::PgPool;

use multishop::config::SiteMode;
use multishop::models::protocol::{MirrorOrderItem, MirrorOrderRequest};
use multishop::models::segment::Segment;
use multishop::services::{backorders, ledger, mirror, orders};

use common::{seed_product, stock_keys, test_config};

fn mirror_request(
    order_id: &str,
    segment: Segment,
    items: Vec<MirrorOrderItem>,
) -> MirrorOrderRequest {
    MirrorOrderRequest {
        site_id: "shop-b".into(),
        order_id: order_id.into(),
        remote_order_number: Some(format!("B-{order_id}")),
        customer_segment: segment,
        customer_email: Some("buyer@example.com".into()),
        billing: None,
        shipping: None,
        items,
    }
}

fn line(sku: &str, quantity: i32) -> MirrorOrderItem {
    MirrorOrderItem {
        sku: sku.into(),
        quantity,
    }
}

#[sqlx::test]
async fn unknown_skus_are_skipped_not_fatal(pool: PgPool) {
    let config = test_config(SiteMode::Primary);
    let cipher = common::cipher();
    let product = seed_product(&pool, "GAME-STD", "Game Standard", 1999, None).await;
    stock_keys(&pool, &cipher, product, &["G-1", "G-2"]).await;

    let response = mirror::create_mirrored_order(
        &pool,
        &config,
        &cipher,
        mirror_request(
            "501",
            Segment::Consumer,
            vec![line("GAME-STD", 2), line("NO-SUCH-SKU", 1)],
        ),
    )
    .await
    .unwrap();

    // Only the resolved line made it onto the order, allocated normally
    assert_eq!(response.allocations.len(), 1);
    assert_eq!(response.allocations[0].keys, vec!["G-1", "G-2"]);
    assert_eq!(response.allocations[0].pending, 0);

    let items = orders::items_for(&pool, response.order_id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].sku.as_deref(), Some("GAME-STD"));
    assert_eq!(items[0].delivered_keys.as_deref(), Some("G-1\nG-2"));
}

#[sqlx::test]
async fn duplicate_mirror_request_returns_the_existing_order(pool: PgPool) {
    let config = test_config(SiteMode::Primary);
    let cipher = common::cipher();
    let product = seed_product(&pool, "GAME-STD", "Game Standard", 1999, None).await;
    stock_keys(&pool, &cipher, product, &["G-1", "G-2"]).await;

    let request = || mirror_request("777", Segment::Consumer, vec![line("GAME-STD", 1)]);

    let first = mirror::create_mirrored_order(&pool, &config, &cipher, request())
        .await
        .unwrap();
    // A retry after a lost response must not create a second order or
    // claim a second key
    let second = mirror::create_mirrored_order(&pool, &config, &cipher, request())
        .await
        .unwrap();

    assert_eq!(second.order_id, first.order_id);
    assert_eq!(second.order_number, first.order_number);
    assert_eq!(second.allocations[0].keys, first.allocations[0].keys);

    let order_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(order_count, 1);
    assert_eq!(ledger::available_count(&pool, product, None).await.unwrap(), 1);
}

#[sqlx::test]
async fn business_segment_gets_the_business_price(pool: PgPool) {
    let config = test_config(SiteMode::Primary);
    let cipher = common::cipher();
    let pro = seed_product(&pool, "GAME-PRO", "Game Pro", 4999, Some(3999)).await;
    // No business price on this one; business buyers pay the list price
    seed_product(&pool, "GAME-STD", "Game Standard", 1999, None).await;

    let response = mirror::create_mirrored_order(
        &pool,
        &config,
        &cipher,
        mirror_request(
            "801",
            Segment::Business,
            vec![line("GAME-PRO", 2), line("GAME-STD", 1)],
        ),
    )
    .await
    .unwrap();

    let items = orders::items_for(&pool, response.order_id).await.unwrap();
    let pro_line = items.iter().find(|i| i.product_id == pro).unwrap();
    let std_line = items.iter().find(|i| i.product_id != pro).unwrap();
    assert_eq!(pro_line.unit_price_cents, 3999);
    assert_eq!(std_line.unit_price_cents, 1999);

    let total: i64 = sqlx::query_scalar("SELECT total_cents FROM orders WHERE id = $1")
        .bind(response.order_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(total, 2 * 3999 + 1999);
}

#[sqlx::test]
async fn mirrored_shortage_backorders_under_the_origin_site(pool: PgPool) {
    let config = test_config(SiteMode::Primary);
    let cipher = common::cipher();
    let product = seed_product(&pool, "GAME-STD", "Game Standard", 1999, None).await;

    let response = mirror::create_mirrored_order(
        &pool,
        &config,
        &cipher,
        mirror_request("901", Segment::Consumer, vec![line("GAME-STD", 3)]),
    )
    .await
    .unwrap();

    assert!(response.allocations[0].keys.is_empty());
    assert_eq!(response.allocations[0].pending, 3);

    // The demand is recorded against the origin (site, order), so the
    // reconciler can find the mirrored order again later
    let open = backorders::open_for_product(&pool, product, 10).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].site_id, "shop-b");
    assert_eq!(open[0].remote_order_id, "901");
    assert_eq!(open[0].qty_pending, 3);

    let items = orders::items_for(&pool, response.order_id).await.unwrap();
    assert!(items[0].shortage_notice.is_some());
}
