//! Backorder data model.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Outstanding unmet demand for one order line.
///
/// One open row exists per (site, order, product, variation); repeated
/// shortfalls for the same line increment `qty_pending` on the open row.
/// `qty_pending` only ever decreases after creation, and once it reaches
/// zero the row is terminal (`fulfilled_at` set, never reprocessed).
#[derive(Debug, Clone, FromRow)]
pub struct Backorder {
    pub id: i64,
    pub site_id: String,
    pub remote_order_id: String,
    pub product_id: i64,
    pub variation_id: Option<i64>,
    pub qty_pending: i32,
    pub created_at: DateTime<Utc>,
    pub fulfilled_at: Option<DateTime<Utc>>,
}
