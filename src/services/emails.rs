//! Delivered-keys email composition.
//!
//! Composes the customer notification as plain text and writes it to the
//! `email_outbox` table; an external mailer collaborator drains the outbox.
//! Writing the row is the "send" this service emits.
//!
//! Each line item renders as a default block (title, quantity, keys,
//! shortage notice) unless the product carries a `custom_email` template,
//! in which case the template is rendered with placeholders:
//! `{product_name}`, `{quantity}`, `{keys}`, `{shortage_note}`.

use crate::config::Config;
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::order::{Order, OrderItem};
use crate::services::catalog;

/// Compose and enqueue the delivered-keys email for an order.
///
/// Orders without a billing email are skipped silently; guests who gave
/// no address simply get no mail.
pub async fn send_order_keys_email(
    pool: &DbPool,
    config: &Config,
    order_id: i64,
) -> Result<(), AppError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::OrderNotFound)?;

    let Some(recipient) = order.customer_email.clone().filter(|e| !e.is_empty()) else {
        tracing::debug!(order_id, "no billing email on order, skipping keys email");
        return Ok(());
    };

    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY id ASC",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    let mut blocks = Vec::with_capacity(items.len());
    for item in &items {
        let product = catalog::find_by_id(pool, item.product_id).await?;
        let title = product
            .as_ref()
            .map(|p| p.title.clone())
            .unwrap_or_else(|| item.product_id.to_string());
        let template = product.as_ref().and_then(|p| p.custom_email.clone());
        blocks.push(render_item_block(item, &title, template.as_deref()));
    }

    let display_number = order
        .primary_order_number
        .clone()
        .or(order.remote_order_number.clone())
        .unwrap_or_else(|| order.id.to_string());
    let subject = render_subject(&config.email_subject_template, config.site_name(), &display_number);
    let body = blocks.join("\n\n");

    sqlx::query(
        r#"
        INSERT INTO email_outbox (recipient, subject, body, order_id)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&recipient)
    .bind(&subject)
    .bind(&body)
    .bind(order_id)
    .execute(pool)
    .await?;

    tracing::info!(order_id, %recipient, "queued delivered-keys email");
    Ok(())
}

fn render_subject(template: &str, site_name: &str, order_number: &str) -> String {
    template
        .replace("{site_name}", site_name)
        .replace("{order_number}", order_number)
}

fn render_item_block(item: &OrderItem, title: &str, template: Option<&str>) -> String {
    let keys = item.delivered_keys.as_deref().unwrap_or("");
    let shortage = item.shortage_notice.as_deref().unwrap_or("");

    if let Some(template) = template {
        return apply_placeholders(template, title, item.quantity, keys, shortage);
    }

    let mut block = format!("{} (x{})", title, item.quantity);
    if !keys.is_empty() {
        block.push_str("\nYour keys:\n");
        block.push_str(keys);
    }
    if !shortage.is_empty() {
        block.push('\n');
        block.push_str(shortage);
    }
    block
}

fn apply_placeholders(
    template: &str,
    product_name: &str,
    quantity: i32,
    keys: &str,
    shortage_note: &str,
) -> String {
    template
        .replace("{product_name}", product_name)
        .replace("{quantity}", &quantity.to_string())
        .replace("{keys}", keys)
        .replace("{shortage_note}", shortage_note)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i32, keys: Option<&str>, shortage: Option<&str>) -> OrderItem {
        OrderItem {
            id: 1,
            order_id: 1,
            product_id: 42,
            variation_id: None,
            sku: Some("GAME-STD".into()),
            quantity,
            unit_price_cents: 1999,
            delivered_keys: keys.map(str::to_owned),
            shortage_notice: shortage.map(str::to_owned),
        }
    }

    #[test]
    fn subject_placeholders() {
        let subject = render_subject("Your {site_name} order keys (#{order_number})", "Shop", "1057");
        assert_eq!(subject, "Your Shop order keys (#1057)");
    }

    #[test]
    fn default_block_lists_keys_and_shortage() {
        let block = render_item_block(
            &item(3, Some("AAAA-1\nBBBB-2"), Some("1 key will follow shortly.")),
            "Game Standard",
            None,
        );
        assert!(block.starts_with("Game Standard (x3)"));
        assert!(block.contains("AAAA-1\nBBBB-2"));
        assert!(block.ends_with("1 key will follow shortly."));
    }

    #[test]
    fn custom_template_overrides_default_block() {
        let block = render_item_block(
            &item(2, Some("AAAA-1"), None),
            "Game Standard",
            Some("Redeem {keys} for {product_name} (x{quantity}). {shortage_note}"),
        );
        assert_eq!(block, "Redeem AAAA-1 for Game Standard (x2). ");
    }
}
