/// Shared cryptography library for SadhanaBoard services
///
/// Provides the primitives used by the trust subsystem and by any service
/// that persists or displays sensitive user data:
///
/// - `encryption`: AES-256-GCM field-level encryption with packed output
/// - `hash`: one-way digests and constant-time comparison
/// - `password`: Argon2id password hashing and strength validation
/// - `masking`: display-only masking of PII for logs and API responses
///
/// ## Security Design
///
/// - Key material is validated at construction time. A service with a bad
///   `ENCRYPTION_KEY` must fail to start, never run with a weak key.
/// - Decryption fails closed: a tampered or malformed ciphertext is an
///   error, never silently-returned garbage.
/// - Masking is for display only. Nothing in `masking` is reversible or
///   suitable for storage.
pub mod encryption;
pub mod error;
pub mod hash;
pub mod masking;
pub mod password;

pub use encryption::FieldCipher;
pub use error::{CryptoError, Result};
pub use hash::{constant_time_eq, sha256_hex};
pub use password::{hash_password, hash_password_default, verify_password, StrengthReport};
