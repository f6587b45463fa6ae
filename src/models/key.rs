//! CD key data models and admin API types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single license key row from the `cd_keys` table.
///
/// The key text lives in `key_enc` as an authenticated-encryption blob.
/// `status` transitions `available -> assigned` exactly once; an assigned
/// row keeps its provenance fields forever and never returns to the pool.
#[derive(Debug, Clone, FromRow)]
pub struct CdKey {
    pub id: i64,
    pub product_id: i64,
    pub variation_id: Option<i64>,
    pub key_enc: String,
    pub status: String,
    pub assigned_order_ref: Option<String>,
    pub assigned_site_id: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Request to bulk-import plaintext keys for a product.
///
/// # JSON Example
///
/// ```json
/// {
///   "product_id": 42,
///   "variation_id": null,
///   "keys": ["AAAA-1111", "BBBB-2222"]
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct ImportKeysRequest {
    pub product_id: i64,
    pub variation_id: Option<i64>,
    pub keys: Vec<String>,
}

/// Response for a bulk import.
///
/// `skipped` counts exact-string duplicates and blank lines removed before
/// insertion; `inserted` is what actually landed in the pool.
#[derive(Debug, Serialize)]
pub struct ImportKeysResponse {
    pub inserted: i64,
    pub skipped: usize,
}

/// Request to replace the text of a still-available key.
#[derive(Debug, Deserialize)]
pub struct UpdateKeyRequest {
    pub key: String,
}

/// One decrypted entry in the admin key listing.
///
/// Rows whose blobs fail to decrypt are skipped by the listing, so `key`
/// is always present here.
#[derive(Debug, Serialize)]
pub struct KeyListEntry {
    pub id: i64,
    pub product_id: i64,
    pub variation_id: Option<i64>,
    pub status: String,
    pub key: String,
    pub assigned_order_ref: Option<String>,
    pub assigned_site_id: Option<String>,
}

/// Query parameters for the admin key listing.
#[derive(Debug, Deserialize)]
pub struct ListKeysQuery {
    pub product_id: Option<i64>,
    pub page: Option<i64>,
}
