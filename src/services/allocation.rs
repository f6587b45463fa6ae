//! Allocation service - turns an order's line items into delivered keys
//! plus recorded shortfall, in one pass.
//!
//! Allocation is per-line, not transactional across the order: if one line
//! claims nothing, the other lines keep whatever they claimed. The order
//! ships what is available immediately and the rest backorders.

use sqlx::PgExecutor;

use crate::crypto::KeyCipher;
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::protocol::{AllocationRequestItem, ItemAllocation};
use crate::services::{backorders, event_log, ledger};

/// Allocate keys for every line item of one order.
///
/// Per item with quantity > 0: claim from the ledger, decrypt, and record
/// any shortfall as a backorder. Items with quantity 0 are skipped.
///
/// Calling this twice for the same order_ref claims additional keys; the
/// caller enforces once-per-paid-order via the order's `keys_allocated`
/// flag.
pub async fn allocate(
    pool: &DbPool,
    cipher: &KeyCipher,
    site_id: &str,
    order_ref: &str,
    items: &[AllocationRequestItem],
) -> Result<Vec<ItemAllocation>, AppError> {
    let mut results = Vec::with_capacity(items.len());

    for item in items {
        let quantity = item.quantity.max(0);
        if quantity == 0 {
            continue;
        }

        let (claimed, keys) = claim_and_decrypt(
            pool,
            cipher,
            item.product_id,
            item.variation_id,
            quantity,
            site_id,
            order_ref,
        )
        .await?;

        // Pending is measured against what was claimed, not what survived
        // decryption; a corrupt row is an inventory loss, not new demand.
        let pending = (quantity - claimed as i32).max(0);
        if pending > 0 {
            backorders::create_or_increment(
                pool,
                site_id,
                order_ref,
                item.product_id,
                item.variation_id,
                pending,
            )
            .await?;
        }

        results.push(ItemAllocation {
            product_id: item.product_id,
            variation_id: item.variation_id,
            keys,
            pending,
        });
    }

    event_log::record(
        pool,
        "info",
        "keys allocated",
        serde_json::json!({
            "site_id": site_id,
            "order_ref": order_ref,
            "lines": results.len(),
        }),
    )
    .await;

    Ok(results)
}

/// Claim up to `quantity` keys and decrypt them.
///
/// Returns `(claimed, plaintexts)`. A ciphertext that fails to decrypt is
/// logged and skipped rather than aborting the batch, so `plaintexts` can
/// be shorter than `claimed`.
///
/// Generic over the executor: the fulfillment reconciler claims inside its
/// own transaction, and deliberately bypasses [`allocate`] so that working
/// off a backorder never re-records the same shortfall.
pub async fn claim_and_decrypt<'e, E>(
    executor: E,
    cipher: &KeyCipher,
    product_id: i64,
    variation_id: Option<i64>,
    quantity: i32,
    site_id: &str,
    order_ref: &str,
) -> Result<(usize, Vec<String>), AppError>
where
    E: PgExecutor<'e>,
{
    let ciphertexts =
        ledger::claim(executor, product_id, variation_id, quantity, site_id, order_ref).await?;
    let claimed = ciphertexts.len();

    let mut keys = Vec::with_capacity(claimed);
    for ciphertext in &ciphertexts {
        match cipher.decrypt(ciphertext) {
            Ok(plaintext) => keys.push(plaintext),
            Err(e) => {
                // Skip the record, keep the batch going
                tracing::warn!(
                    product_id,
                    order_ref,
                    error = %e,
                    "skipping key that failed to decrypt"
                );
            }
        }
    }

    Ok((claimed, keys))
}
