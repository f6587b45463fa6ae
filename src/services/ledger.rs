//! Key ledger - the authoritative CD key inventory.
//!
//! The one invariant that matters here: no two concurrent allocation
//! requests may claim the same key. The claim is therefore a single
//! atomic statement; everything else in this module is a low-frequency
//! admin write using ordinary transactions.

use sqlx::PgExecutor;

use crate::crypto::KeyCipher;
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::key::CdKey;

/// Page size for the admin key listing.
const LIST_PAGE_SIZE: i64 = 100;

/// Atomically claim up to `quantity` available keys for an order.
///
/// Selects the oldest available rows for (product, variation) and marks
/// them assigned in the same statement, so two concurrent callers can
/// never observe the same row as available:
///
/// ```text
/// UPDATE ... WHERE id IN (SELECT ... FOR UPDATE SKIP LOCKED) RETURNING key_enc
/// ```
///
/// `FOR UPDATE SKIP LOCKED` makes concurrent claimants skip each other's
/// locked rows instead of serializing on them.
///
/// Returns the ciphertexts of exactly the rows claimed. Fewer rows than
/// requested is not an error; it is the normal shortage signal.
///
/// Generic over the executor so the fulfillment reconciler can claim
/// inside its own row-locking transaction.
pub async fn claim<'e, E>(
    executor: E,
    product_id: i64,
    variation_id: Option<i64>,
    quantity: i32,
    site_id: &str,
    order_ref: &str,
) -> Result<Vec<String>, AppError>
where
    E: PgExecutor<'e>,
{
    if quantity <= 0 {
        return Ok(Vec::new());
    }

    let ciphertexts = sqlx::query_scalar::<_, String>(
        r#"
        UPDATE cd_keys
        SET status = 'assigned',
            assigned_order_ref = $1,
            assigned_site_id = $2,
            assigned_at = NOW()
        WHERE id IN (
            SELECT id FROM cd_keys
            WHERE product_id = $3
              AND variation_id IS NOT DISTINCT FROM $4
              AND status = 'available'
            ORDER BY id ASC
            LIMIT $5
            FOR UPDATE SKIP LOCKED
        )
        RETURNING key_enc
        "#,
    )
    .bind(order_ref)
    .bind(site_id)
    .bind(product_id)
    .bind(variation_id)
    .bind(quantity as i64)
    .fetch_all(executor)
    .await?;

    Ok(ciphertexts)
}

/// Encrypt and insert a batch of plaintext keys as available stock.
///
/// The caller is responsible for de-duplicating the plaintexts first (the
/// import handler does exact-string dedup); the ledger does not enforce
/// cross-row uniqueness.
///
/// Returns the number of rows inserted.
pub async fn insert_many(
    pool: &DbPool,
    cipher: &KeyCipher,
    product_id: i64,
    variation_id: Option<i64>,
    plaintexts: &[String],
) -> Result<i64, AppError> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for plaintext in plaintexts {
        let key_enc = cipher.encrypt(plaintext)?;
        sqlx::query(
            r#"
            INSERT INTO cd_keys (product_id, variation_id, key_enc, status)
            VALUES ($1, $2, $3, 'available')
            "#,
        )
        .bind(product_id)
        .bind(variation_id)
        .bind(&key_enc)
        .execute(&mut *tx)
        .await?;
        inserted += 1;
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Replace the text of a key that is still available.
///
/// Returns false if the row does not exist or has already been assigned;
/// a key a customer has received is never edited.
pub async fn update_available(
    pool: &DbPool,
    cipher: &KeyCipher,
    id: i64,
    new_plaintext: &str,
) -> Result<bool, AppError> {
    let key_enc = cipher.encrypt(new_plaintext)?;
    let result = sqlx::query(
        "UPDATE cd_keys SET key_enc = $1 WHERE id = $2 AND status = 'available'",
    )
    .bind(&key_enc)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a key that is still available.
///
/// Returns false if the row does not exist or has already been assigned.
pub async fn delete_available(pool: &DbPool, id: i64) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM cd_keys WHERE id = $1 AND status = 'available'")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Admin listing page, newest first, optionally filtered by product.
pub async fn list_page(
    pool: &DbPool,
    product_id: Option<i64>,
    page: i64,
) -> Result<Vec<CdKey>, AppError> {
    let page = page.max(1);
    let rows = sqlx::query_as::<_, CdKey>(
        r#"
        SELECT * FROM cd_keys
        WHERE ($1::BIGINT IS NULL OR product_id = $1)
        ORDER BY id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(product_id)
    .bind(LIST_PAGE_SIZE)
    .bind((page - 1) * LIST_PAGE_SIZE)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Count of available keys for a product line. Used by tests and the
/// admin listing header.
pub async fn available_count(
    pool: &DbPool,
    product_id: i64,
    variation_id: Option<i64>,
) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM cd_keys
        WHERE product_id = $1
          AND variation_id IS NOT DISTINCT FROM $2
          AND status = 'available'
        "#,
    )
    .bind(product_id)
    .bind(variation_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
