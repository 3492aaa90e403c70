//! Cipher engine: master-password key derivation and authenticated
//! encryption of individual vault payloads.
//!
//! Key stretching: Argon2id (memory-hard, tunable).
//! AEAD: XChaCha20-Poly1305 — 32-byte key, 24-byte random nonce, 16-byte tag.
//!
//! Every record carries its own random salt and nonce, so two encryptions of
//! the same plaintext under the same password never share a `(key, nonce)`
//! pair. KDF parameters are versioned alongside the record: bumping
//! `CURRENT_VERSION` lets new records adopt stronger costs while the decrypt
//! path keeps reading old ones.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::VaultError;

pub const CURRENT_VERSION: u32 = 1;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

/// Domain salt mixed into the out-of-band password fingerprint.
const FINGERPRINT_DOMAIN: &[u8] = b"localpass-salt";

/// One encrypted payload at rest. All binary fields are base64.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedRecord {
    pub version: u32,
    pub salt: String,
    pub iv: String,
    pub ciphertext: String,
    pub auth_tag: String,
}

/// Argon2id cost parameters, fixed per record version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl KdfParams {
    /// Costs for a given record version. Unknown versions are rejected so a
    /// future format bump cannot be silently read with the wrong parameters.
    pub fn for_version(version: u32) -> Result<Self, VaultError> {
        match version {
            1 => Ok(Self {
                memory_kib: 64 * 1024,
                time_cost: 3,
                parallelism: 4,
            }),
            other => Err(VaultError::UnsupportedVersion(other)),
        }
    }
}

/// Stretch `password` + `salt` into a 32-byte key. Deterministic for fixed
/// inputs; the key is zeroized on drop.
pub fn derive_key(
    password: &str,
    salt: &[u8],
    params: KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, VaultError> {
    let argon_params = Params::new(
        params.memory_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon
        .hash_password_into(password.as_bytes(), salt, key.as_mut())
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` under `password` with a fresh random salt and nonce.
pub fn encrypt(plaintext: &[u8], password: &str) -> Result<EncryptedRecord, VaultError> {
    let salt = generate_salt();
    let nonce = generate_nonce();
    let params = KdfParams::for_version(CURRENT_VERSION)?;
    let key = derive_key(password, &salt, params)?;

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
    let sealed = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| VaultError::EncryptFailed)?;

    // AEAD output is ciphertext || tag; the at-rest format keeps them apart.
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    Ok(EncryptedRecord {
        version: CURRENT_VERSION,
        salt: general_purpose::STANDARD.encode(salt),
        iv: general_purpose::STANDARD.encode(nonce),
        ciphertext: general_purpose::STANDARD.encode(ciphertext),
        auth_tag: general_purpose::STANDARD.encode(tag),
    })
}

/// Decrypt a record, re-deriving the key from its stored salt. Tag mismatch
/// (wrong password or any tampered bit) reports `AuthenticationFailed`; a
/// structurally broken record reports `Decode`. There is no lenient path.
pub fn decrypt(
    record: &EncryptedRecord,
    password: &str,
) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let params = KdfParams::for_version(record.version)?;

    let salt = decode_field(&record.salt, "salt")?;
    let nonce = decode_field(&record.iv, "iv")?;
    let ciphertext = decode_field(&record.ciphertext, "ciphertext")?;
    let tag = decode_field(&record.auth_tag, "authTag")?;
    if nonce.len() != NONCE_LEN {
        return Err(VaultError::Decode(format!(
            "iv length {} != {}",
            nonce.len(),
            NONCE_LEN
        )));
    }
    if tag.len() != TAG_LEN {
        return Err(VaultError::Decode(format!(
            "authTag length {} != {}",
            tag.len(),
            TAG_LEN
        )));
    }

    let key = derive_key(password, &salt, params)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));

    let mut sealed = Vec::with_capacity(ciphertext.len() + tag.len());
    sealed.extend_from_slice(&ciphertext);
    sealed.extend_from_slice(&tag);

    let plaintext = cipher
        .decrypt(XNonce::from_slice(&nonce), sealed.as_slice())
        .map_err(|_| VaultError::AuthenticationFailed)?;
    Ok(Zeroizing::new(plaintext))
}

/// One-way fingerprint of the master password. Stored for out-of-band
/// diagnostics only; never used to gate unlock and never used to derive keys.
pub fn fingerprint(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(FINGERPRINT_DOMAIN);
    general_purpose::STANDARD.encode(hasher.finalize())
}

fn decode_field(value: &str, field: &str) -> Result<Vec<u8>, VaultError> {
    general_purpose::STANDARD
        .decode(value)
        .map_err(|e| VaultError::Decode(format!("{field}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let record = encrypt(b"hunter2 credentials", "master password").unwrap();
        assert_eq!(record.version, CURRENT_VERSION);
        let plaintext = decrypt(&record, "master password").unwrap();
        assert_eq!(plaintext.as_slice(), b"hunter2 credentials");
    }

    #[test]
    fn wrong_password_fails() {
        let record = encrypt(b"secret", "password-one").unwrap();
        let err = decrypt(&record, "password-two").unwrap_err();
        assert!(matches!(err, VaultError::AuthenticationFailed));
    }

    #[test]
    fn fresh_salt_and_nonce_per_encryption() {
        let a = encrypt(b"same plaintext", "same password").unwrap();
        let b = encrypt(b"same plaintext", "same password").unwrap();
        assert_ne!((&a.salt, &a.iv), (&b.salt, &b.iv));
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn tamper_detection_on_every_field() {
        let record = encrypt(b"payload", "pw").unwrap();
        for field in ["ciphertext", "iv", "authTag"] {
            let mut tampered = record.clone();
            let target = match field {
                "ciphertext" => &mut tampered.ciphertext,
                "iv" => &mut tampered.iv,
                _ => &mut tampered.auth_tag,
            };
            let mut bytes = general_purpose::STANDARD.decode(target.as_str()).unwrap();
            bytes[0] ^= 0x01;
            *target = general_purpose::STANDARD.encode(bytes);
            let err = decrypt(&tampered, "pw").unwrap_err();
            assert!(
                matches!(err, VaultError::AuthenticationFailed),
                "flipped bit in {field} must fail tag verification"
            );
        }
    }

    #[test]
    fn unknown_version_rejected() {
        let mut record = encrypt(b"x", "pw").unwrap();
        record.version = 99;
        let err = decrypt(&record, "pw").unwrap_err();
        assert!(matches!(err, VaultError::UnsupportedVersion(99)));
    }

    #[test]
    fn malformed_base64_is_decode_not_auth() {
        let mut record = encrypt(b"x", "pw").unwrap();
        record.iv = "not base64!!!".into();
        let err = decrypt(&record, "pw").unwrap_err();
        assert!(matches!(err, VaultError::Decode(_)));
    }

    #[test]
    fn derive_key_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let params = KdfParams::for_version(1).unwrap();
        let a = derive_key("pw", &salt, params).unwrap();
        let b = derive_key("pw", &salt, params).unwrap();
        assert_eq!(a.as_ref(), b.as_ref());
    }

    #[test]
    fn record_serializes_with_original_field_names() {
        let record = encrypt(b"x", "pw").unwrap();
        let json = serde_json::to_value(&record).unwrap();
        for key in ["version", "salt", "iv", "ciphertext", "authTag"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
