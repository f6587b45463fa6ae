//! Order and order line item models, plus the paid-order intake types.
//!
//! This service owns the order rows: locally placed orders on either site
//! and, on the Primary, orders mirrored in from Secondaries. The host
//! storefront delivers an "order became paid" event; everything after that
//! (allocation, key attachment, mirroring, emails) happens against these
//! tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::protocol::ItemAllocation;
use crate::models::segment::Segment;

/// An order row.
///
/// `site_id` + `remote_order_id` identify the order on its origin
/// storefront and are unique together, which makes both local intake and
/// mirroring idempotent. `keys_allocated` is the processed-once flag that
/// keeps a repeated paid event from claiming keys twice.
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: i64,
    pub site_id: String,
    pub remote_order_id: String,
    pub remote_order_number: Option<String>,
    pub primary_order_number: Option<String>,
    pub customer_segment: String,
    pub customer_email: Option<String>,
    pub billing_address: Option<serde_json::Value>,
    pub shipping_address: Option<serde_json::Value>,
    pub status: String,
    pub mirrored: bool,
    pub keys_allocated: bool,
    pub total_cents: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line item of an order.
///
/// Delivered keys are stored as newline-joined plaintext; the reconciler
/// appends to this text as backorders are worked off. `shortage_notice`
/// holds the customer-facing note while the line is short and is cleared
/// once the line holds at least `quantity` keys.
#[derive(Debug, Clone, FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub variation_id: Option<i64>,
    pub sku: Option<String>,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub delivered_keys: Option<String>,
    pub shortage_notice: Option<String>,
}

impl OrderItem {
    /// Number of keys currently attached to this line.
    pub fn delivered_count(&self) -> usize {
        self.delivered_keys
            .as_deref()
            .map(|text| text.lines().filter(|l| !l.is_empty()).count())
            .unwrap_or(0)
    }
}

/// One line item of a paid-order event.
#[derive(Debug, Deserialize)]
pub struct PaidOrderItem {
    pub product_id: i64,
    pub variation_id: Option<i64>,
    pub sku: Option<String>,
    pub quantity: i32,
    #[serde(default)]
    pub unit_price_cents: i64,
}

/// The "order became paid" event delivered by the host storefront.
///
/// # JSON Example
///
/// ```json
/// {
///   "order_ref": "1057",
///   "order_number": "1057",
///   "customer_segment": "consumer",
///   "customer_email": "buyer@example.com",
///   "items": [{"product_id": 42, "sku": "GAME-STD", "quantity": 2}]
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct PaidOrderRequest {
    /// The storefront's own identifier for the order.
    pub order_ref: String,
    pub order_number: Option<String>,
    #[serde(default)]
    pub customer_segment: Segment,
    pub customer_email: Option<String>,
    pub billing: Option<serde_json::Value>,
    pub shipping: Option<serde_json::Value>,
    pub items: Vec<PaidOrderItem>,
}

/// Outcome of processing a paid-order event.
///
/// `status` is one of `allocated`, `mirrored`, `mirror_queued`,
/// `allocation_unavailable`, or `already_processed`. Checkout never fails
/// on the storefront side; degraded outcomes are reported as data.
#[derive(Debug, Serialize)]
pub struct PaidOrderResponse {
    pub order_id: i64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocations: Option<Vec<ItemAllocation>>,
}
