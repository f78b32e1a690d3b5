/// Field-level encryption for sensitive data
///
/// Provides AES-256-GCM encryption/decryption for individual record fields
/// before they reach the document store.
///
/// ## Encryption Format
///
/// Each encrypted value is stored as a colon-delimited hex triplet:
///
/// ```text
/// <ciphertext hex>:<iv hex>:<auth tag hex>
/// ```
///
/// The IV is 12 bytes and freshly random for every call, so encrypting the
/// same plaintext twice never yields the same output. The auth tag is the
/// 16-byte GCM tag; any modification of ciphertext, IV, or tag makes
/// decryption fail.
///
/// Encrypted fields carry a sibling `<field>_encrypted: true` marker so that
/// readers can tell packed ciphertext apart from plaintext that merely looks
/// like it.
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use serde_json::Value;

use crate::error::{CryptoError, Result};

const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Marker suffix appended to field names of encrypted fields.
pub const ENCRYPTED_MARKER_SUFFIX: &str = "_encrypted";

/// Field encryption service holding an AES-256-GCM cipher.
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    /// Create a cipher from a hex-encoded 256-bit key.
    ///
    /// The key must be exactly 64 hex characters (32 bytes). Anything else
    /// is a configuration error and the constructor refuses it, so services
    /// fail at startup rather than run with invalid key material.
    pub fn new(key_hex: &str) -> Result<Self> {
        let key_bytes = hex::decode(key_hex).map_err(|e| {
            CryptoError::InvalidKeyMaterial(format!("key is not valid hex: {}", e))
        })?;

        if key_bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyMaterial(format!(
                "key must be {} bytes ({} hex chars), got {} bytes",
                KEY_LEN,
                KEY_LEN * 2,
                key_bytes.len()
            )));
        }

        let key = aes_gcm::Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Generate a random 256-bit key encoded as hex.
    ///
    /// Intended for provisioning tooling; the output goes into the
    /// `ENCRYPTION_KEY` environment variable or a secret manager.
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        hex::encode(key)
    }

    /// Encrypt a plaintext string into the packed triplet format.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);

        // The aead output is ciphertext with the GCM tag appended.
        let sealed = self
            .cipher
            .encrypt(nonce, Payload::from(plaintext.as_bytes()))
            .map_err(|e| CryptoError::EncryptionFailed(format!("AES-GCM failed: {}", e)))?;

        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        Ok(format!(
            "{}:{}:{}",
            hex::encode(ciphertext),
            hex::encode(iv),
            hex::encode(tag)
        ))
    }

    /// Decrypt a packed `ciphertext:iv:tag` triplet.
    ///
    /// Fails closed with `DecryptionFailed` on wrong part count, bad hex,
    /// wrong IV length, auth tag mismatch, or non-UTF-8 plaintext.
    pub fn decrypt(&self, packed: &str) -> Result<String> {
        let parts: Vec<&str> = packed.split(':').collect();
        if parts.len() != 3 {
            return Err(CryptoError::DecryptionFailed(format!(
                "expected 3 parts, got {}",
                parts.len()
            )));
        }

        let ciphertext = hex::decode(parts[0])
            .map_err(|e| CryptoError::DecryptionFailed(format!("ciphertext is not hex: {}", e)))?;
        let iv = hex::decode(parts[1])
            .map_err(|e| CryptoError::DecryptionFailed(format!("iv is not hex: {}", e)))?;
        let tag = hex::decode(parts[2])
            .map_err(|e| CryptoError::DecryptionFailed(format!("auth tag is not hex: {}", e)))?;

        if iv.len() != IV_LEN {
            return Err(CryptoError::DecryptionFailed(format!(
                "iv must be {} bytes, got {}",
                IV_LEN,
                iv.len()
            )));
        }
        if tag.len() != TAG_LEN {
            return Err(CryptoError::DecryptionFailed(format!(
                "auth tag must be {} bytes, got {}",
                TAG_LEN,
                tag.len()
            )));
        }

        let nonce = Nonce::from_slice(&iv);
        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(nonce, Payload::from(sealed.as_slice()))
            .map_err(|e| CryptoError::DecryptionFailed(format!("AES-GCM failed: {}", e)))?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::DecryptionFailed(format!("invalid UTF-8: {}", e)))
    }

    /// Encrypt the named fields of a JSON object.
    ///
    /// Returns a shallow copy: each present, non-empty field is replaced by
    /// its packed ciphertext and gains a `<field>_encrypted: true` sibling.
    /// Non-object values pass through unchanged.
    pub fn encrypt_fields(&self, value: &Value, fields: &[&str]) -> Result<Value> {
        let Some(obj) = value.as_object() else {
            return Ok(value.clone());
        };

        let mut out = obj.clone();
        for field in fields {
            let Some(plain) = out.get(*field) else {
                continue;
            };
            let plain = match plain {
                Value::Null => continue,
                Value::String(s) if s.is_empty() => continue,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };

            let packed = self.encrypt(&plain)?;
            out.insert(field.to_string(), Value::String(packed));
            out.insert(format!("{}{}", field, ENCRYPTED_MARKER_SUFFIX), Value::Bool(true));
        }

        Ok(Value::Object(out))
    }

    /// Decrypt the named fields of a JSON object.
    ///
    /// Only fields carrying the `<field>_encrypted: true` marker are
    /// touched; the marker is removed after decryption. Decrypting an
    /// already-plaintext object is therefore a no-op per field.
    pub fn decrypt_fields(&self, value: &Value, fields: &[&str]) -> Result<Value> {
        let Some(obj) = value.as_object() else {
            return Ok(value.clone());
        };

        let mut out = obj.clone();
        for field in fields {
            let marker = format!("{}{}", field, ENCRYPTED_MARKER_SUFFIX);
            if out.get(&marker).and_then(Value::as_bool) != Some(true) {
                continue;
            }
            let Some(Value::String(packed)) = out.get(*field) else {
                continue;
            };

            let plain = self.decrypt(packed)?;
            out.insert(field.to_string(), Value::String(plain));
            out.remove(&marker);
        }

        Ok(Value::Object(out))
    }
}
