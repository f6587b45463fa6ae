//! At-rest encryption for CD key material.
//!
//! Keys sit in the database as AES-256-GCM ciphertext so that a raw table
//! dump does not disclose redeemable codes. Authenticated encryption also
//! means a corrupted row fails loudly at decrypt time instead of silently
//! producing garbage that could get emailed to a customer.
//!
//! # Blob layout
//!
//! ```text
//! base64url-no-pad( nonce (12 bytes) | tag (16 bytes) | ciphertext )
//! ```
//!
//! The 256-bit cipher key is derived once per process as
//! `SHA-256(salt1 | salt2 | "|" | secret)` from the installation secret and
//! two independent site-wide salts.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

/// Size of the GCM nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Smallest decodable blob: nonce plus tag, with an empty ciphertext.
pub const MIN_BLOB_LEN: usize = NONCE_LEN + TAG_LEN;

/// Failure modes of the at-rest cipher.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The underlying cipher call failed. Should not happen absent
    /// misconfiguration (e.g., a malformed derived key).
    #[error("encryption failed")]
    EncryptionError,

    /// The blob is not valid base64 or decodes to fewer than 28 bytes.
    #[error("invalid ciphertext")]
    InvalidCiphertext,

    /// The authentication tag did not verify: the row was tampered with
    /// or the installation secret/salts changed since it was written.
    #[error("decryption failed")]
    DecryptionError,
}

/// Symmetric cipher handle, built once from configuration at startup and
/// shared via `AppState`.
pub struct KeyCipher {
    key_bytes: [u8; 32],
}

impl KeyCipher {
    /// Derive the cipher key from the installation secret and both salts.
    pub fn new(secret: &str, salt_1: &str, salt_2: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(salt_1.as_bytes());
        hasher.update(salt_2.as_bytes());
        hasher.update(b"|");
        hasher.update(secret.as_bytes());
        Self {
            key_bytes: hasher.finalize().into(),
        }
    }

    /// Encrypt a plaintext key.
    ///
    /// A fresh random nonce is generated per call, so encrypting the same
    /// plaintext twice yields different blobs.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.key_bytes)
            .map_err(|_| CryptoError::EncryptionError)?;
        let key = LessSafeKey::new(unbound);

        let rng = SystemRandom::new();
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::EncryptionError)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        // seal_in_place_append_tag leaves `ciphertext | tag` in the buffer
        let mut in_out = plaintext.as_bytes().to_vec();
        key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::EncryptionError)?;

        // Reorder into the stored layout: nonce | tag | ciphertext
        let ct_len = in_out.len() - TAG_LEN;
        let mut blob = Vec::with_capacity(NONCE_LEN + in_out.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&in_out[ct_len..]);
        blob.extend_from_slice(&in_out[..ct_len]);

        Ok(URL_SAFE_NO_PAD.encode(blob))
    }

    /// Decrypt a blob produced by [`KeyCipher::encrypt`].
    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let blob = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| CryptoError::InvalidCiphertext)?;
        if blob.len() < MIN_BLOB_LEN {
            return Err(CryptoError::InvalidCiphertext);
        }

        let nonce_bytes: [u8; NONCE_LEN] = blob[..NONCE_LEN]
            .try_into()
            .map_err(|_| CryptoError::InvalidCiphertext)?;
        let tag = &blob[NONCE_LEN..MIN_BLOB_LEN];
        let ciphertext = &blob[MIN_BLOB_LEN..];

        // ring expects `ciphertext | tag` contiguously
        let mut in_out = Vec::with_capacity(ciphertext.len() + TAG_LEN);
        in_out.extend_from_slice(ciphertext);
        in_out.extend_from_slice(tag);

        let unbound = UnboundKey::new(&AES_256_GCM, &self.key_bytes)
            .map_err(|_| CryptoError::DecryptionError)?;
        let key = LessSafeKey::new(unbound);

        let plaintext = key
            .open_in_place(Nonce::assume_unique_for_key(nonce_bytes), Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::DecryptionError)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::DecryptionError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> KeyCipher {
        KeyCipher::new("install-secret", "salt-one", "salt-two")
    }

    #[test]
    fn round_trip() {
        let c = cipher();
        for plaintext in ["AAAA-BBBB-CCCC", "", "key with spaces and üñí©ode"] {
            let blob = c.encrypt(plaintext).unwrap();
            assert_eq!(c.decrypt(&blob).unwrap(), plaintext);
        }
    }

    #[test]
    fn fresh_nonce_per_call() {
        let c = cipher();
        let a = c.encrypt("SAME-PLAINTEXT").unwrap();
        let b = c.encrypt("SAME-PLAINTEXT").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_blob_is_rejected() {
        let c = cipher();
        let blob = c.encrypt("AAAA-BBBB-CCCC").unwrap();

        // Flip one bit somewhere past the nonce and re-encode
        let mut raw = URL_SAFE_NO_PAD.decode(&blob).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(raw);

        assert!(matches!(
            c.decrypt(&tampered),
            Err(CryptoError::DecryptionError)
        ));
    }

    #[test]
    fn short_blob_is_invalid() {
        let c = cipher();
        let short = URL_SAFE_NO_PAD.encode([0u8; MIN_BLOB_LEN - 1]);
        assert!(matches!(
            c.decrypt(&short),
            Err(CryptoError::InvalidCiphertext)
        ));
        assert!(matches!(
            c.decrypt("not base64!!!"),
            Err(CryptoError::InvalidCiphertext)
        ));
    }

    #[test]
    fn wrong_secret_fails_to_decrypt() {
        let blob = cipher().encrypt("AAAA-BBBB-CCCC").unwrap();
        let rotated = KeyCipher::new("rotated-secret", "salt-one", "salt-two");
        assert!(matches!(
            rotated.decrypt(&blob),
            Err(CryptoError::DecryptionError)
        ));
    }
}
