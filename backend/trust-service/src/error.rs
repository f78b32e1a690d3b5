use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrustError>;

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Refresh token revoked")]
    RefreshRevoked,

    #[error("Refresh token expired")]
    RefreshExpired,

    #[error("Invalid expiry format: {0}")]
    InvalidExpiryFormat(String),

    #[error("Invalid code format")]
    InvalidCodeFormat,

    #[error("Invalid two-factor code")]
    InvalidCode,

    #[error("Two-factor authentication not enabled")]
    NotEnabled,

    #[error("No two-factor setup pending")]
    SetupNotPending,

    #[error("All recovery codes have been used")]
    RecoveryCodeExhausted,

    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto_core::CryptoError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}
