//! Password-based authenticated encryption for provider secrets.
//!
//! Wire format, base64 (standard alphabet) encoded:
//!
//! ```text
//! salt (16 bytes) || nonce (12 bytes) || AES-256-GCM ciphertext + tag
//! ```
//!
//! The key is derived per message with PBKDF2-HMAC-SHA256 over the salt.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

use super::VaultError;

pub const PBKDF2_ITERATIONS: u32 = 100_000;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
/// Shortest decodable payload: salt plus nonce.
pub const HEADER_LEN: usize = SALT_LEN + NONCE_LEN;
const KEY_LEN: usize = 32;

fn derive_key(password: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0_u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

fn cipher_for(password: &str, salt: &[u8]) -> Result<Aes256Gcm, VaultError> {
    let key = derive_key(password, salt);
    Aes256Gcm::new_from_slice(&key).map_err(|e| VaultError::Crypto(e.to_string()))
}

/// Encrypts `plaintext` under a key derived from `password`, with a fresh
/// salt and nonce.
pub fn encrypt(plaintext: &str, password: &str) -> Result<String, VaultError> {
    let mut rng = rand::thread_rng();
    let mut salt = [0_u8; SALT_LEN];
    let mut nonce = [0_u8; NONCE_LEN];
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce);

    let sealed = cipher_for(password, &salt)?
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| VaultError::Crypto(String::from("encryption failed")))?;

    let mut payload = Vec::with_capacity(HEADER_LEN + sealed.len());
    payload.extend_from_slice(&salt);
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&sealed);
    Ok(STANDARD.encode(payload))
}

/// Decrypts a value produced by [`encrypt`].
///
/// Malformed input fails with `InvalidFormat` before any key derivation. An
/// authentication failure is reported as `WrongPassword`.
pub fn decrypt(ciphertext: &str, password: &str) -> Result<String, VaultError> {
    let payload = STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| VaultError::InvalidFormat(format!("not base64: {e}")))?;
    if payload.len() < HEADER_LEN {
        return Err(VaultError::InvalidFormat(format!(
            "decoded length {} is below the {HEADER_LEN} byte header",
            payload.len()
        )));
    }

    let (salt, rest) = payload.split_at(SALT_LEN);
    let (nonce, sealed) = rest.split_at(NONCE_LEN);
    let plaintext = cipher_for(password, salt)?
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| VaultError::WrongPassword)?;

    String::from_utf8(plaintext)
        .map_err(|_| VaultError::Crypto(String::from("decrypted secret is not valid UTF-8")))
}

/// [`encrypt`] on the blocking pool.
pub async fn encrypt_blocking(plaintext: String, password: String) -> Result<String, VaultError> {
    tokio::task::spawn_blocking(move || encrypt(&plaintext, &password))
        .await
        .map_err(|e| VaultError::Crypto(format!("key derivation task failed: {e}")))?
}

/// [`decrypt`] on the blocking pool.
pub async fn decrypt_blocking(ciphertext: String, password: String) -> Result<String, VaultError> {
    tokio::task::spawn_blocking(move || decrypt(&ciphertext, &password))
        .await
        .map_err(|e| VaultError::Crypto(format!("key derivation task failed: {e}")))?
}
