//! CID masking
//!
//! Content references (document CIDs) are queryable handles into the
//! storage provider, so they are encrypted before persistence. Values
//! are marked with a fixed prefix; the stored form is
//! `cid1:` || base64url(nonce(12) || ciphertext_with_tag). Masking an
//! already-masked value is a no-op, and unmasking a plain value passes
//! it through, so mixed old/new rows keep working during migration.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{EscrowError, Result};

/// Prefix marking a stored value as encrypted.
pub const CID_MASK_PREFIX: &str = "cid1:";

/// Nonce size for AES-GCM (12 bytes)
const NONCE_SIZE: usize = 12;

/// Authentication tag size (16 bytes)
const TAG_SIZE: usize = 16;

/// AES-256-GCM cipher keyed by hashing a configured secret.
#[derive(Clone)]
pub struct CidCipher {
    key: [u8; 32],
}

impl CidCipher {
    /// Derive the 256-bit key as SHA-256 of the configured secret.
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(EscrowError::Configuration(
                "CID masking secret must not be empty".to_string(),
            ));
        }
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        Ok(Self {
            key: hasher.finalize().into(),
        })
    }

    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(CID_MASK_PREFIX)
    }

    /// Encrypt a reference for storage. Idempotent: an already-prefixed
    /// value is returned unchanged.
    pub fn encrypt(&self, cid: &str) -> Result<String> {
        if Self::is_encrypted(cid) {
            return Ok(cid.to_string());
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| EscrowError::Encryption(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext_with_tag = cipher
            .encrypt(nonce, cid.as_bytes())
            .map_err(|e| EscrowError::Encryption(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext_with_tag.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext_with_tag);

        Ok(format!("{}{}", CID_MASK_PREFIX, base64_url_encode(&blob)))
    }

    /// Decrypt a stored value. A value without the prefix predates
    /// masking and passes through unchanged.
    pub fn decrypt(&self, value: &str) -> Result<String> {
        let encoded = match value.strip_prefix(CID_MASK_PREFIX) {
            Some(encoded) => encoded,
            None => return Ok(value.to_string()),
        };

        let blob = base64_url_decode(encoded)?;
        if blob.len() < NONCE_SIZE + TAG_SIZE {
            return Err(EscrowError::Encryption(
                "masked CID shorter than nonce + tag".to_string(),
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| EscrowError::Encryption(e.to_string()))?;
        let nonce = Nonce::from_slice(&blob[..NONCE_SIZE]);

        let plaintext = cipher
            .decrypt(nonce, &blob[NONCE_SIZE..])
            .map_err(|e| EscrowError::Encryption(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| EscrowError::Encryption("masked CID was not UTF-8".to_string()))
    }
}

/// Encode bytes as base64url without padding
fn base64_url_encode(data: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, data)
}

/// Decode base64url (with or without padding)
fn base64_url_decode(s: &str) -> Result<Vec<u8>> {
    base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, s)
        .or_else(|_| base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE, s))
        .map_err(|_| EscrowError::Encryption("masked CID is not valid base64url".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> CidCipher {
        CidCipher::new("test-secret").unwrap()
    }

    #[test]
    fn round_trip() {
        let c = cipher();
        let cid = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
        let masked = c.encrypt(cid).unwrap();
        assert!(CidCipher::is_encrypted(&masked));
        assert_ne!(masked, cid);
        assert_eq!(c.decrypt(&masked).unwrap(), cid);
    }

    #[test]
    fn encrypt_is_idempotent() {
        let c = cipher();
        let masked = c.encrypt("some-reference").unwrap();
        let again = c.encrypt(&masked).unwrap();
        assert_eq!(masked, again);
    }

    #[test]
    fn decrypt_passes_plain_values_through() {
        let c = cipher();
        assert_eq!(c.decrypt("legacy-plain-cid").unwrap(), "legacy-plain-cid");
        assert_eq!(c.decrypt("").unwrap(), "");
    }

    #[test]
    fn fresh_nonce_per_encryption() {
        let c = cipher();
        let a = c.encrypt("same-input").unwrap();
        let b = c.encrypt("same-input").unwrap();
        assert_ne!(a, b);
        assert_eq!(c.decrypt(&a).unwrap(), c.decrypt(&b).unwrap());
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let masked = cipher().encrypt("secret-cid").unwrap();
        let other = CidCipher::new("different-secret").unwrap();
        assert!(other.decrypt(&masked).is_err());
    }

    #[test]
    fn tampered_blob_is_rejected() {
        let c = cipher();
        let masked = c.encrypt("secret-cid").unwrap();
        let mut bytes = masked.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();
        assert!(c.decrypt(&tampered).is_err());
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(CidCipher::new("").is_err());
    }
}
