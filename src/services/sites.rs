//! Secondary-site registry (Primary side).

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::site::{Site, SiteResponse};

/// Register a Secondary storefront.
///
/// Generates a random api_key reference for the site; the key is returned
/// once in the response and only its presence is used afterwards (the
/// cross-site protocol itself authenticates with the shared secret).
/// Re-registering an existing site_id refreshes the URL and key.
pub async fn register(
    pool: &DbPool,
    site_id: &str,
    site_url: &str,
) -> Result<SiteResponse, AppError> {
    if site_id.trim().is_empty() {
        return Err(AppError::InvalidRequest("site_id must not be empty".into()));
    }

    // 32 random bytes, hex encoded
    let api_key = hex::encode(rand::random::<[u8; 32]>());

    let site = sqlx::query_as::<_, Site>(
        r#"
        INSERT INTO sites (site_id, site_url, api_key, status)
        VALUES ($1, $2, $3, 'active')
        ON CONFLICT (site_id) DO UPDATE SET
            site_url = EXCLUDED.site_url,
            api_key = EXCLUDED.api_key,
            status = 'active'
        RETURNING *
        "#,
    )
    .bind(site_id.trim())
    .bind(site_url)
    .bind(&api_key)
    .fetch_one(pool)
    .await?;

    Ok(SiteResponse::from(site).with_api_key(api_key))
}

/// All registered sites, newest first. Never includes api keys.
pub async fn list(pool: &DbPool) -> Result<Vec<SiteResponse>, AppError> {
    let sites = sqlx::query_as::<_, Site>("SELECT * FROM sites ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;

    Ok(sites.into_iter().map(SiteResponse::from).collect())
}

/// Reject cross-site requests from site ids the Primary does not know.
pub async fn ensure_active(pool: &DbPool, site_id: &str) -> Result<(), AppError> {
    let known: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sites WHERE site_id = $1 AND status = 'active')",
    )
    .bind(site_id)
    .fetch_one(pool)
    .await?;

    if known { Ok(()) } else { Err(AppError::UnknownSite) }
}
