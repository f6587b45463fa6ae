//! Durable operational event log.
//!
//! Mirrors the tracing output into the `event_log` table so admin tooling
//! can query operational history reverse-chronologically. `site_id` and
//! `order_ref` are lifted out of the context into their own columns for
//! filtering.
//!
//! The log sink must never break business flow: a failed insert is
//! reported through tracing and swallowed.

use serde_json::Value;

use crate::db::DbPool;

/// Record one operational event. Infallible by design.
pub async fn record(pool: &DbPool, level: &str, message: &str, context: Value) {
    let site_id = context
        .get("site_id")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let order_ref = context
        .get("order_ref")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let result = sqlx::query(
        r#"
        INSERT INTO event_log (level, message, context, site_id, order_ref)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(level)
    .bind(message)
    .bind(&context)
    .bind(site_id)
    .bind(order_ref)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::error!(error = %e, message, "failed to write event log entry");
    }
}
