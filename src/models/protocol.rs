//! Wire types for the signed cross-site protocol.
//!
//! These are shared by the Primary's handlers and the Secondary's outbound
//! client, so both ends of every call (de)serialize through the same
//! definitions.

use serde::{Deserialize, Serialize};

use crate::models::product::CatalogItem;
use crate::models::segment::Segment;

/// One line of demand in an allocation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequestItem {
    pub product_id: i64,
    pub variation_id: Option<i64>,
    pub quantity: i32,
}

/// `POST /api/v1/allocate-keys` request body.
#[derive(Debug, Serialize, Deserialize)]
pub struct AllocateKeysRequest {
    pub site_id: String,
    pub order_id: String,
    #[serde(default)]
    pub customer_segment: Segment,
    pub items: Vec<AllocationRequestItem>,
}

/// Allocation outcome for one line item.
///
/// `keys.len() + pending == quantity` for every well-formed request line
/// (barring per-record decrypt failures, which shrink `keys` and are
/// logged). Shortage is data, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemAllocation {
    pub product_id: i64,
    pub variation_id: Option<i64>,
    pub keys: Vec<String>,
    pub pending: i32,
}

/// `POST /api/v1/allocate-keys` response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct AllocateKeysResponse {
    pub allocations: Vec<ItemAllocation>,
}

/// One line item of a mirror request. SKU rather than product id, because
/// database ids are not shared across independently provisioned sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorOrderItem {
    pub sku: String,
    pub quantity: i32,
}

/// `POST /api/v1/mirror-order` request body.
#[derive(Debug, Serialize, Deserialize)]
pub struct MirrorOrderRequest {
    pub site_id: String,
    pub order_id: String,
    pub remote_order_number: Option<String>,
    #[serde(default)]
    pub customer_segment: Segment,
    pub customer_email: Option<String>,
    pub billing: Option<serde_json::Value>,
    pub shipping: Option<serde_json::Value>,
    pub items: Vec<MirrorOrderItem>,
}

/// `POST /api/v1/mirror-order` response body.
///
/// `order_number` is the Primary's display number, stored by the Secondary
/// so both sites show the customer the same reference.
#[derive(Debug, Serialize, Deserialize)]
pub struct MirrorOrderResponse {
    pub allocations: Vec<ItemAllocation>,
    pub order_id: i64,
    pub order_number: String,
}

/// `GET /api/v1/catalog` query parameters.
#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    pub page: Option<i64>,
}

/// `GET /api/v1/catalog` response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogResponse {
    pub items: Vec<CatalogItem>,
    pub page: i64,
    pub max_pages: i64,
}

/// `GET /api/v1/payments-config` query parameters.
#[derive(Debug, Deserialize)]
pub struct PaymentsConfigQuery {
    pub site_id: String,
    pub segment: Segment,
}

/// `GET /api/v1/payments-config` response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentsConfigResponse {
    pub allowed: Vec<String>,
}

/// `PUT /api/v1/payments-config` request body: replaces the allow-list
/// for one (site, segment) pair.
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdatePaymentsConfigRequest {
    pub site_id: String,
    pub segment: Segment,
    pub allowed: Vec<String>,
}

/// `GET /api/v1/allowed-gateways` query parameters (Secondary side).
#[derive(Debug, Deserialize)]
pub struct AllowedGatewaysQuery {
    pub segment: Segment,
}

/// `GET /api/v1/allowed-gateways` response body.
///
/// `allowed: null` means the Primary could not be reached and enforcement
/// should be skipped (fail open; checkout must not break).
#[derive(Debug, Serialize)]
pub struct AllowedGatewaysResponse {
    pub allowed: Option<Vec<String>>,
}
