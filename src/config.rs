//! Application configuration management.
//!
//! Configuration is loaded once at startup from environment variables via
//! the `envy` crate and passed around explicitly (through `AppState`);
//! nothing in the codebase reads ambient settings after boot.

use serde::Deserialize;

/// Which role this installation plays in the multi-site topology.
///
/// The Primary owns the shared key inventory, the catalog, and the
/// cross-site order registry. Secondaries sell the synced catalog and
/// request allocation from (or mirror orders to) the Primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteMode {
    Primary,
    Secondary,
}

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `MODE` (optional): `primary` or `secondary`, defaults to `primary`
/// - `SITE_ID` (required): stable identifier for this installation
/// - `SITE_NAME` (optional): display name used in customer emails
/// - `SHARED_SECRET` (required): shared secret for request signing and
///   at-rest key encryption, configured identically on both sites
/// - `CRYPTO_SALT_1` / `CRYPTO_SALT_2` (required): independent site-wide
///   salts mixed into the encryption key derivation
/// - `PRIMARY_URL` (required on secondaries): base URL of the Primary
/// - `MIRROR_ORDERS` (optional): mirror paid orders to the Primary
///   (default true); when false the secondary only requests allocation
/// - `SHORTAGE_MESSAGE` (optional): notice attached to short line items
/// - `EMAIL_SUBJECT_TEMPLATE` (optional): subject for delivered-keys mail
/// - `CURRENCY` (optional): ISO 4217 code for order totals, default EUR
/// - `HTTP_TIMEOUT_SECS` (optional): cross-site request timeout, default 20
/// - `CATALOG_PAGE_SIZE` (optional): catalog page size, default 200
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_mode")]
    pub mode: SiteMode,

    pub site_id: String,

    pub site_name: Option<String>,

    pub shared_secret: String,

    pub crypto_salt_1: String,

    pub crypto_salt_2: String,

    pub primary_url: Option<String>,

    #[serde(default = "default_true")]
    pub mirror_orders: bool,

    #[serde(default = "default_shortage_message")]
    pub shortage_message: String,

    #[serde(default = "default_email_subject")]
    pub email_subject_template: String,

    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_catalog_page_size")]
    pub catalog_page_size: i64,
}

fn default_port() -> u16 {
    3000
}

fn default_mode() -> SiteMode {
    SiteMode::Primary
}

fn default_true() -> bool {
    true
}

fn default_shortage_message() -> String {
    "Some of your keys are on backorder and will be delivered as soon as new stock arrives."
        .to_string()
}

fn default_email_subject() -> String {
    "Your {site_name} order keys (#{order_number})".to_string()
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn default_http_timeout() -> u64 {
    20
}

fn default_catalog_page_size() -> i64 {
    200
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Attempts to load a `.env` file first (optional), then deserializes
    /// the environment into a Config struct.
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Validate cross-field constraints that envy cannot express.
    ///
    /// A secondary installation needs a reachable Primary to talk to; an
    /// unparseable or missing URL is a deployment mistake we want to catch
    /// at boot rather than on the first paid order.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mode == SiteMode::Secondary {
            let raw = self
                .primary_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("PRIMARY_URL is required in secondary mode"))?;
            url::Url::parse(raw)
                .map_err(|e| anyhow::anyhow!("PRIMARY_URL is not a valid URL: {e}"))?;
        }
        Ok(())
    }

    /// Display name for customer-facing emails, falling back to the site id.
    pub fn site_name(&self) -> &str {
        self.site_name.as_deref().unwrap_or(&self.site_id)
    }

    /// Primary base URL without a trailing slash. Only call after
    /// `validate()` has passed in secondary mode.
    pub fn primary_base(&self) -> Option<&str> {
        self.primary_url.as_deref().map(|u| u.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secondary_without_primary_url_fails_validation() {
        let config = Config {
            database_url: "postgres://localhost/multishop".into(),
            server_port: default_port(),
            mode: SiteMode::Secondary,
            site_id: "shop-b".into(),
            site_name: None,
            shared_secret: "secret".into(),
            crypto_salt_1: "salt-a".into(),
            crypto_salt_2: "salt-b".into(),
            primary_url: None,
            mirror_orders: true,
            shortage_message: default_shortage_message(),
            email_subject_template: default_email_subject(),
            currency: default_currency(),
            http_timeout_secs: default_http_timeout(),
            catalog_page_size: default_catalog_page_size(),
        };
        assert!(config.validate().is_err());

        let config = Config {
            primary_url: Some("https://primary.example".into()),
            ..config
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.primary_base(), Some("https://primary.example"));
        assert_eq!(config.site_name(), "shop-b");
    }
}
