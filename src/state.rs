//! Shared application state.
//!
//! Everything a handler or scheduler needs is built once at startup and
//! cloned into place: the pool, the parsed configuration, the derived
//! at-rest cipher, and one reqwest client for cross-site calls. There are
//! no process-wide singletons.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::config::Config;
use crate::crypto::KeyCipher;
use crate::db::DbPool;

/// Cached payments-config answers on a Secondary, keyed by segment.
pub type PaymentsCache = Arc<RwLock<HashMap<String, (Instant, Vec<String>)>>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub cipher: Arc<KeyCipher>,
    pub http: reqwest::Client,
    pub payments_cache: PaymentsCache,
}

impl AppState {
    pub fn new(pool: DbPool, config: Config) -> anyhow::Result<Self> {
        let cipher = KeyCipher::new(
            &config.shared_secret,
            &config.crypto_salt_1,
            &config.crypto_salt_2,
        );

        // One client, one timeout, for every cross-site call
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            pool,
            config: Arc::new(config),
            cipher: Arc::new(cipher),
            http,
            payments_cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }
}
