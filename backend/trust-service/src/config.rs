//! Configuration for the trust subsystem
//!
//! Loads settings from environment variables, with a `.env` file picked up
//! in development builds. Every section has sane defaults except the
//! secrets: `JWT_SECRET`, `JWT_REFRESH_SECRET`, and `ENCRYPTION_KEY` must be
//! set, and an `ENCRYPTION_KEY` that is not 64 hex characters aborts startup
//! rather than letting the service run with invalid key material.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Application settings for the trust subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub token: TokenSettings,
    pub rate_limit: RateLimitSettings,
    pub two_factor: TwoFactorSettings,
    pub encryption: EncryptionSettings,
}

impl Settings {
    /// Load settings from environment variables.
    ///
    /// Fails fast on missing secrets or invalid encryption key material.
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
        }

        let settings = Settings {
            token: TokenSettings::from_env()?,
            rate_limit: RateLimitSettings::from_env()?,
            two_factor: TwoFactorSettings::from_env()?,
            encryption: EncryptionSettings::from_env()?,
        };

        // Refuse to start with unusable key material
        crypto_core::FieldCipher::new(&settings.encryption.key_hex)
            .context("ENCRYPTION_KEY is not valid 256-bit hex key material")?;

        Ok(settings)
    }
}

/// JWT signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_expiry: String,
    pub refresh_expiry: String,
}

impl TokenSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            access_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            refresh_secret: env::var("JWT_REFRESH_SECRET")
                .context("JWT_REFRESH_SECRET must be set")?,
            access_expiry: env::var("JWT_EXPIRY").unwrap_or_else(|_| "15m".to_string()),
            refresh_expiry: env::var("JWT_REFRESH_EXPIRY").unwrap_or_else(|_| "7d".to_string()),
        })
    }
}

/// Admission-control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub sweep_interval_secs: u64,
    pub ip_max_requests: usize,
    pub ip_window_secs: u64,
    pub ip_suspicious_threshold: usize,
}

impl RateLimitSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            sweep_interval_secs: env::var("RATE_LIMIT_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid RATE_LIMIT_SWEEP_INTERVAL_SECS")?,
            ip_max_requests: env::var("IP_RATE_LIMIT_MAX_REQUESTS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .context("Invalid IP_RATE_LIMIT_MAX_REQUESTS")?,
            ip_window_secs: env::var("IP_RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid IP_RATE_LIMIT_WINDOW_SECS")?,
            ip_suspicious_threshold: env::var("IP_RATE_LIMIT_SUSPICIOUS_THRESHOLD")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .context("Invalid IP_RATE_LIMIT_SUSPICIOUS_THRESHOLD")?,
        })
    }
}

/// Two-factor authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoFactorSettings {
    /// Issuer shown in authenticator apps
    pub issuer: String,
    pub recovery_code_count: usize,
    /// Lifetime of an unconfirmed setup session
    pub setup_ttl_secs: u64,
    /// TOTP verification tolerance in ±steps
    pub window: u8,
}

impl Default for TwoFactorSettings {
    fn default() -> Self {
        Self {
            issuer: "SadhanaBoard".to_string(),
            recovery_code_count: 10,
            setup_ttl_secs: 15 * 60,
            window: 1,
        }
    }
}

impl TwoFactorSettings {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            issuer: env::var("TWO_FA_ISSUER").unwrap_or(defaults.issuer),
            recovery_code_count: env::var("TWO_FA_RECOVERY_CODE_COUNT")
                .unwrap_or_else(|_| defaults.recovery_code_count.to_string())
                .parse()
                .context("Invalid TWO_FA_RECOVERY_CODE_COUNT")?,
            setup_ttl_secs: env::var("TWO_FA_SETUP_TTL_SECS")
                .unwrap_or_else(|_| defaults.setup_ttl_secs.to_string())
                .parse()
                .context("Invalid TWO_FA_SETUP_TTL_SECS")?,
            window: env::var("TWO_FA_WINDOW")
                .unwrap_or_else(|_| defaults.window.to_string())
                .parse()
                .context("Invalid TWO_FA_WINDOW")?,
        })
    }
}

/// Field-encryption configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionSettings {
    /// Hex-encoded 256-bit master key
    pub key_hex: String,
}

impl EncryptionSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            key_hex: env::var("ENCRYPTION_KEY").context("ENCRYPTION_KEY must be set")?,
        })
    }
}
