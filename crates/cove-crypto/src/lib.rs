//! Symmetric encryption of variable values and hashing of team passwords.
//!
//! One process-wide key encrypts every stored value. Nonce handling is
//! internal: the public surface is plaintext in, opaque blob out, and the
//! same plaintext encrypts to a different blob every time.

use chacha20poly1305::{aead::Aead, KeyInit};
use rand_core::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

/// XChaCha20 nonce length; the blob layout is `nonce || ciphertext`.
const NONCE_LEN: usize = 24;

const SALT_LEN: usize = 16;
const MEMORY_COST_KIB: u32 = 64 * 1024;

/// The process-wide symmetric key. Zeroized on drop.
#[derive(zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
pub struct CipherKey(Zeroizing<[u8; 32]>);

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key must be 64 hex characters (32 bytes)")]
    InvalidLength,
    #[error("key is not valid hex")]
    InvalidHex(#[from] hex::FromHexError),
}

impl CipherKey {
    /// Parse a key from its hex encoding (as stored in configuration).
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim())?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength)?;
        Ok(CipherKey(Zeroizing::new(arr)))
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        CipherKey(Zeroizing::new(*bytes))
    }

    /// Generate a fresh random key (key provisioning, tests).
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        rand_core::OsRng.fill_bytes(key.as_mut());
        CipherKey(key)
    }

    fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum EncryptError {
    #[error("AEAD encryption failed")]
    AeadFailed(chacha20poly1305::aead::Error),
}

#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("ciphertext too short")]
    Malformed,
    #[error("AEAD decryption failed")]
    AeadFailed(chacha20poly1305::aead::Error),
    #[error("decrypted value is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Encrypt a value under the process key.
///
/// A random 24-byte nonce is generated per call and prefixed to the
/// ciphertext, so repeated encryption of the same plaintext never yields
/// the same blob.
pub fn encrypt(plaintext: &str, key: &CipherKey) -> Result<Vec<u8>, EncryptError> {
    let cipher_key = chacha20poly1305::Key::from(*key.as_bytes());
    let cipher = chacha20poly1305::XChaCha20Poly1305::new(&cipher_key);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand_core::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = chacha20poly1305::XNonce::from(nonce_bytes);

    let ct = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(EncryptError::AeadFailed)?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ct.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ct);
    Ok(blob)
}

/// Decrypt a blob produced by [`encrypt`].
///
/// Malformed or foreign blobs fail with a decode error, never silent
/// corruption (AEAD authentication).
pub fn decrypt(blob: &[u8], key: &CipherKey) -> Result<String, DecryptError> {
    if blob.len() < NONCE_LEN {
        return Err(DecryptError::Malformed);
    }
    let (nonce_bytes, ct) = blob.split_at(NONCE_LEN);

    let cipher_key = chacha20poly1305::Key::from(*key.as_bytes());
    let cipher = chacha20poly1305::XChaCha20Poly1305::new(&cipher_key);

    let mut nonce_arr = [0u8; NONCE_LEN];
    nonce_arr.copy_from_slice(nonce_bytes);
    let nonce = chacha20poly1305::XNonce::from(nonce_arr);

    let pt = cipher
        .decrypt(&nonce, ct)
        .map_err(DecryptError::AeadFailed)?;

    Ok(String::from_utf8(pt)?)
}

// ──────────────────────────────────────────────────────────────────────────────
// Password hashing (team join passwords)
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("invalid kdf parameters")]
    InvalidParams(argon2::Error),
    #[error("key derivation failed")]
    DerivationFailed(argon2::Error),
    #[error("malformed stored password hash")]
    MalformedHash,
}

fn argon2_hash_raw(data: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, PasswordError> {
    let params = argon2::Params::new(MEMORY_COST_KIB, 3, 1, Some(32))
        .map_err(PasswordError::InvalidParams)?;
    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut hash = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(data, salt, hash.as_mut())
        .map_err(PasswordError::DerivationFailed)?;
    Ok(hash)
}

/// Hash a password with Argon2id and a random salt.
/// Returns `hex(salt)$hex(hash)` for storage.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let mut salt = [0u8; SALT_LEN];
    rand_core::OsRng.fill_bytes(&mut salt);
    let hash = argon2_hash_raw(password.as_bytes(), &salt)?;
    Ok(format!("{}${}", hex::encode(salt), hex::encode(hash.as_ref())))
}

/// Verify a password against a stored `hex(salt)$hex(hash)` string.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let (salt_hex, hash_hex) = stored.split_once('$').ok_or(PasswordError::MalformedHash)?;
    let salt = hex::decode(salt_hex).map_err(|_| PasswordError::MalformedHash)?;
    if salt.len() != SALT_LEN {
        return Err(PasswordError::MalformedHash);
    }
    let recomputed = argon2_hash_raw(password.as_bytes(), &salt)?;
    Ok(hex::encode(recomputed.as_ref()) == hash_hex)
}
