//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use sqlx::PgPool;

use multishop::config::{Config, SiteMode};
use multishop::crypto::KeyCipher;
use multishop::models::order::{PaidOrderItem, PaidOrderRequest};
use multishop::models::segment::Segment;
use multishop::services::ledger;
use multishop::state::AppState;

/// Cipher matching `test_config`'s secret and salts.
pub fn cipher() -> KeyCipher {
    KeyCipher::new("test-shared-secret", "salt-one", "salt-two")
}

/// Configuration for a test installation. The Primary URL points at a
/// closed local port so outbound calls fail fast instead of timing out.
pub fn test_config(mode: SiteMode) -> Config {
    Config {
        database_url: "postgres://unused".into(),
        server_port: 0,
        mode,
        site_id: "shop-a".into(),
        site_name: Some("Shop A".into()),
        shared_secret: "test-shared-secret".into(),
        crypto_salt_1: "salt-one".into(),
        crypto_salt_2: "salt-two".into(),
        primary_url: Some("http://127.0.0.1:9".into()),
        mirror_orders: true,
        shortage_message: "Some keys are on backorder.".into(),
        email_subject_template: "Your {site_name} order keys (#{order_number})".into(),
        currency: "EUR".into(),
        http_timeout_secs: 2,
        catalog_page_size: 200,
    }
}

/// Full application state over the test database.
pub fn test_state(pool: PgPool, mode: SiteMode) -> AppState {
    AppState::new(pool, test_config(mode)).expect("building test state")
}

/// Insert a catalog row, returning its id.
pub async fn seed_product(
    pool: &PgPool,
    sku: &str,
    title: &str,
    price_cents: i64,
    business_price_cents: Option<i64>,
) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO products (sku, title, price_cents, business_price_cents)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(sku)
    .bind(title)
    .bind(price_cents)
    .bind(business_price_cents)
    .fetch_one(pool)
    .await
    .expect("seeding product")
}

/// Import plaintext keys as available stock for a product.
pub async fn stock_keys(pool: &PgPool, cipher: &KeyCipher, product_id: i64, keys: &[&str]) {
    let plaintexts: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    ledger::insert_many(pool, cipher, product_id, None, &plaintexts)
        .await
        .expect("importing keys");
}

/// A single-line paid-order event.
pub fn paid_order(order_ref: &str, product_id: i64, quantity: i32) -> PaidOrderRequest {
    PaidOrderRequest {
        order_ref: order_ref.into(),
        order_number: Some(order_ref.into()),
        customer_segment: Segment::Consumer,
        customer_email: Some("buyer@example.com".into()),
        billing: None,
        shipping: None,
        items: vec![PaidOrderItem {
            product_id,
            variation_id: None,
            sku: Some(format!("SKU-{product_id}")),
            quantity,
            unit_price_cents: 1999,
        }],
    }
}
