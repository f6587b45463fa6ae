//! Secondary-site registry models (Primary side).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered Secondary storefront.
#[derive(Debug, Clone, FromRow)]
pub struct Site {
    pub id: i64,
    pub site_id: String,
    pub site_url: String,
    pub api_key: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Request to register a Secondary with the Primary.
#[derive(Debug, Deserialize)]
pub struct RegisterSiteRequest {
    pub site_id: String,
    pub site_url: String,
}

/// Response when registering or listing a site.
///
/// # Security Note
///
/// The generated `api_key` is ONLY included in the registration response.
/// Listings never return it.
#[derive(Debug, Serialize)]
pub struct SiteResponse {
    pub site_id: String,
    pub site_url: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Site> for SiteResponse {
    fn from(site: Site) -> Self {
        Self {
            site_id: site.site_id,
            site_url: site.site_url,
            status: site.status,
            api_key: None,
            created_at: site.created_at,
        }
    }
}

impl SiteResponse {
    /// Include the api_key (registration response only).
    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }
}
