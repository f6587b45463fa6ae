//! Replay protection for the signed protocol: an identical request is
//! accepted exactly once.

use sqlx::PgPool;

use multishop::middleware::signature;
use multishop::signing;

#[sqlx::test]
async fn identical_request_is_accepted_exactly_once(pool: PgPool) {
    let secret = "shared-secret";
    let body = br#"{"site_id":"shop-b"}"#;
    let path = "/api/v1/allocate-keys";
    let sig = signing::sign("POST", path, "1700000000", "nonce-1", body, secret);

    // First arrival: signature valid, nonce fresh
    assert!(signing::verify(
        &sig,
        "POST",
        path,
        "1700000000",
        "nonce-1",
        body,
        secret,
        1_700_000_005,
    ));
    assert!(signature::record_nonce(&pool, "nonce-1").await.unwrap());

    // Replay of the very same request: the signature still verifies, but
    // the nonce is spent and the middleware turns it away
    assert!(signing::verify(
        &sig,
        "POST",
        path,
        "1700000000",
        "nonce-1",
        body,
        secret,
        1_700_000_005,
    ));
    assert!(!signature::record_nonce(&pool, "nonce-1").await.unwrap());

    // A fresh nonce from the same caller goes through
    assert!(signature::record_nonce(&pool, "nonce-2").await.unwrap());
}

#[sqlx::test]
async fn only_the_nonce_digest_is_stored(pool: PgPool) {
    signature::record_nonce(&pool, "nonce-secret-value")
        .await
        .unwrap();

    let stored: String = sqlx::query_scalar("SELECT nonce_hash FROM protocol_nonces")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_ne!(stored, "nonce-secret-value");
    assert_eq!(stored, signing::nonce_hash("nonce-secret-value"));
}
