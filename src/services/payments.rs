//! Payment gateway allow-lists per (site, segment).

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::segment::Segment;

/// Allowed gateway ids for a (site, segment) pair. An empty list is a
/// valid mapping meaning "no gateways"; absence of rows is the same thing.
pub async fn allowed_for(
    pool: &DbPool,
    site_id: &str,
    segment: Segment,
) -> Result<Vec<String>, AppError> {
    let allowed = sqlx::query_scalar::<_, String>(
        r#"
        SELECT gateway_id FROM payment_gateways
        WHERE site_id = $1 AND segment = $2
        ORDER BY gateway_id
        "#,
    )
    .bind(site_id)
    .bind(segment.as_str())
    .fetch_all(pool)
    .await?;

    Ok(allowed)
}

/// Replace the allow-list for a (site, segment) pair atomically.
pub async fn replace_mapping(
    pool: &DbPool,
    site_id: &str,
    segment: Segment,
    allowed: &[String],
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM payment_gateways WHERE site_id = $1 AND segment = $2")
        .bind(site_id)
        .bind(segment.as_str())
        .execute(&mut *tx)
        .await?;

    for gateway_id in allowed {
        sqlx::query(
            r#"
            INSERT INTO payment_gateways (site_id, segment, gateway_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(site_id)
        .bind(segment.as_str())
        .bind(gateway_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
