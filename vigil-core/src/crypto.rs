//! Cryptographic utilities for token and secret handling
//!
//! Tokens (session, refresh, challenge) are high-entropy random strings; only
//! their SHA-256 hashes are persisted, and verification uses constant-time
//! comparison via the `subtle` crate. SHA-256 is sufficient for 256-bit random
//! tokens; argon2 is reserved for low-entropy secrets (passwords).
//!
//! TOTP secrets are sealed with ChaCha20-Poly1305 before storage. The 12-byte
//! nonce is prefixed to the ciphertext, and the AAD binds the ciphertext to
//! the owning account so a sealed secret cannot be replayed onto another row.

use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::{
    account::AccountId,
    error::{CryptoError, Error},
};

/// A real argon2id hash of a throwaway string. Login verifies unknown
/// identifiers against this so the "no such account" path costs the same as a
/// wrong-password comparison (no timing-based user enumeration).
const DUMMY_PASSWORD_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$VE0e3g7DalWHgDwou3nuRA$uC6TER156UQpk0lNQ5+jHM0l5poVjPA1he/Tyn9J4Zw";

const NONCE_LEN: usize = 12;

/// Generate a cryptographically secure random token.
///
/// 256 bits of entropy, URL-safe base64 encoded (43 characters).
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a random 256-bit key, suitable for sealing TOTP secrets.
///
/// Sealed secrets do not survive a key change; production deployments
/// should load a persistent key instead.
pub fn generate_encryption_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

/// Generate a short backup code for 2FA recovery.
///
/// Ten lowercase hex characters (40 bits). Only the SHA-256 hash is stored;
/// the plaintext is shown to the user exactly once.
pub fn generate_backup_code() -> String {
    let mut bytes = [0u8; 5];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a token for storage and lookup. Hex-encoded SHA-256.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify a plaintext token against a stored hash in constant time.
pub fn verify_token_hash(token: &str, stored_hash: &str) -> bool {
    let computed = hash_token(token);
    constant_time_compare(computed.as_bytes(), stored_hash.as_bytes())
}

/// Constant-time comparison of two byte slices.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Hash a password with argon2id.
pub fn hash_password(password: &str) -> String {
    password_auth::generate_hash(password)
}

/// Verify a password against a stored argon2 hash.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    password_auth::verify_password(password, stored_hash).is_ok()
}

/// Burn an argon2 verification against a constant dummy hash.
///
/// Called on the unknown-identifier login path; the result is always a
/// failure, but the work done matches a genuine comparison.
pub fn verify_password_dummy(password: &str) {
    let _ = password_auth::verify_password(password, DUMMY_PASSWORD_HASH);
}

/// Seal a TOTP secret for storage. Returns `nonce (12 bytes) || ciphertext`.
pub fn encrypt_secret(key: &[u8; 32], secret: &[u8], account_id: &AccountId) -> Result<Vec<u8>, Error> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = secret_aad(account_id);
    let payload = Payload {
        msg: secret,
        aad: &aad,
    };

    let ciphertext = cipher
        .encrypt(nonce, payload)
        .map_err(|e| CryptoError::SecretEncryption(e.to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a sealed TOTP secret. Expects `nonce (12 bytes) || ciphertext`.
pub fn decrypt_secret(key: &[u8; 32], sealed: &[u8], account_id: &AccountId) -> Result<Vec<u8>, Error> {
    if sealed.len() < NONCE_LEN {
        return Err(CryptoError::SecretDecryption("ciphertext too short".to_string()).into());
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let aad = secret_aad(account_id);
    let payload = Payload {
        msg: ciphertext,
        aad: &aad,
    };

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), payload)
        .map_err(|e| CryptoError::SecretDecryption(e.to_string()).into())
}

fn secret_aad(account_id: &AccountId) -> Vec<u8> {
    format!("totp-secret:v1|{account_id}").into_bytes()
}
