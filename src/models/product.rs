//! Product catalog models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Container product type; bundle containers are never shipped keys and
/// are excluded from mirror payloads.
pub const KIND_BUNDLE: &str = "bundle";

/// A catalog row. The Primary owns the catalog; Secondaries hold a copy
/// synced by SKU, since database ids are not shared across installations.
#[derive(Debug, Clone, FromRow)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub title: String,
    pub kind: String,
    pub price_cents: i64,
    pub business_price_cents: Option<i64>,
    pub custom_email: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_bundle(&self) -> bool {
        self.kind == KIND_BUNDLE
    }
}

/// One catalog entry on the wire. Prices are integer cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub sku: String,
    pub title: String,
    pub kind: String,
    pub price_cents: i64,
    pub business_price_cents: Option<i64>,
    pub custom_email: Option<String>,
    pub image_url: Option<String>,
}

impl From<Product> for CatalogItem {
    fn from(p: Product) -> Self {
        Self {
            sku: p.sku,
            title: p.title,
            kind: p.kind,
            price_cents: p.price_cents,
            business_price_cents: p.business_price_cents,
            custom_email: p.custom_email,
            image_url: p.image_url,
        }
    }
}
