use thiserror::Error;

pub type Result<T> = std::result::Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Password too weak: {0}")]
    WeakPassword(String),

    #[error("Hashing failed: {0}")]
    Hash(String),
}
