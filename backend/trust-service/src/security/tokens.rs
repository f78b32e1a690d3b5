/// JWT token issuance, verification, rotation, and revocation
///
/// Access tokens are short-lived (default 15 minutes) and stateless: a valid
/// signature plus an unexpired `exp` is the whole story. Refresh tokens are
/// longer-lived (default 7 days) and tracked server-side: each one carries a
/// random `token_id` that must map to a live `RefreshRecord`, so a refresh
/// token can be revoked before its cryptographic expiry.
///
/// ## Security Design
///
/// - HMAC-SHA256 with separate access and refresh secrets
/// - Rotation-on-use: redeeming a refresh token atomically takes its record
///   out of the store before a replacement pair is issued, so a replayed
///   token can never be redeemed twice
/// - Expiry validation uses zero leeway; "expired" means expired
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::TokenSettings;
use crate::error::{Result, TrustError};
use crate::store::CredentialStore;

const TOKEN_TYPE_ACCESS: &str = "access";
const TOKEN_TYPE_REFRESH: &str = "refresh";
const TOKEN_ID_BYTES: usize = 16;

/// Claims carried by both token types
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Email address
    pub email: String,
    /// Role (drives rate limits and route guards)
    pub role: String,
    /// Issued at (Unix timestamp, seconds)
    pub iat: i64,
    /// Expiration time (Unix timestamp, seconds)
    pub exp: i64,
    /// Token type: "access" or "refresh"
    pub token_type: String,
    /// Refresh-token record key; absent on access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
}

/// The identity a token pair is issued for
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub role: String,
}

/// Token pair response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Server-side record backing one refresh token
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRecord {
    pub token_id: String,
    pub subject_id: String,
    pub issued_at_ms: i64,
    pub expires_at_ms: i64,
}

impl RefreshRecord {
    fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms <= now_ms
    }
}

/// Unverified token metadata for diagnostics and response headers.
///
/// Built from a decode that skips signature and expiry checks; never use
/// these claims for authorization.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TokenInfo {
    pub expires_at_ms: i64,
    pub expires_in_ms: i64,
    pub is_expired: bool,
    pub issued_at_ms: i64,
    pub age_secs: i64,
}

/// Refresh-store statistics for monitoring
#[derive(Debug, Serialize)]
pub struct RefreshStoreStats {
    pub total_tokens: usize,
    pub tokens: Vec<RefreshTokenSummary>,
}

#[derive(Debug, Serialize)]
pub struct RefreshTokenSummary {
    /// Masked token id; full ids never leave the store
    pub id: String,
    pub subject_id: String,
    pub issued_at_ms: i64,
    pub expires_at_ms: i64,
    pub is_expired: bool,
}

pub struct TokenAuthority {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_expiry_ms: i64,
    refresh_expiry_ms: i64,
    refresh_records: CredentialStore<RefreshRecord>,
}

impl TokenAuthority {
    /// Build an authority from settings; fails on an unparseable expiry
    /// string so misconfiguration is caught at startup.
    pub fn new(settings: &TokenSettings) -> Result<Self> {
        let access_expiry_ms = parse_expiry(&settings.access_expiry)?;
        let refresh_expiry_ms = parse_expiry(&settings.refresh_expiry)?;

        Ok(Self {
            access_encoding: EncodingKey::from_secret(settings.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(settings.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(settings.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(settings.refresh_secret.as_bytes()),
            access_expiry_ms,
            refresh_expiry_ms,
            refresh_records: CredentialStore::new(),
        })
    }

    /// Issue an access/refresh pair for a principal.
    ///
    /// Creates exactly one `RefreshRecord`; access-token issuance has no
    /// server-side state.
    pub fn issue_pair(&self, principal: &Principal) -> Result<TokenPair> {
        let access_token = self.sign_access(principal)?;
        let refresh_token = self.sign_refresh(principal)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_expiry_ms / 1000,
        })
    }

    /// Verify an access token and return its claims.
    ///
    /// Fails with `TokenExpired` past expiry and `InvalidToken` for a bad
    /// signature, malformed token, or non-access token type.
    pub fn verify_access(&self, token: &str) -> Result<Claims> {
        let claims = decode::<Claims>(token, &self.access_decoding, &strict_validation())
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TrustError::TokenExpired,
                _ => TrustError::InvalidToken,
            })?
            .claims;

        if claims.token_type != TOKEN_TYPE_ACCESS {
            return Err(TrustError::InvalidToken);
        }

        Ok(claims)
    }

    /// Verify a refresh token and return its claims.
    ///
    /// On top of signature and expiry checks, the token's record must still
    /// be live: a missing record means the token was rotated or revoked
    /// (`RefreshRevoked`), a stale record means its lifetime elapsed
    /// (`RefreshExpired`).
    pub fn verify_refresh(&self, token: &str) -> Result<Claims> {
        let claims = self.decode_refresh(token)?;
        let token_id = claims.token_id.as_deref().ok_or(TrustError::InvalidToken)?;

        match self.refresh_records.get(token_id) {
            None => Err(TrustError::RefreshRevoked),
            Some(record) if record.is_expired(Utc::now().timestamp_millis()) => {
                self.refresh_records.remove(token_id);
                Err(TrustError::RefreshExpired)
            }
            Some(_) => Ok(claims),
        }
    }

    /// Redeem a refresh token for a new pair, invalidating the old token.
    ///
    /// The record is taken out of the store *before* the new pair is
    /// issued; the take is atomic, so of two concurrent rotations of the
    /// same token exactly one wins and the other fails `RefreshRevoked`.
    pub fn rotate(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.decode_refresh(refresh_token)?;
        let token_id = claims.token_id.as_deref().ok_or(TrustError::InvalidToken)?;

        let record = self
            .refresh_records
            .remove(token_id)
            .ok_or(TrustError::RefreshRevoked)?;

        if record.is_expired(Utc::now().timestamp_millis()) {
            return Err(TrustError::RefreshExpired);
        }

        self.issue_pair(&Principal {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }

    /// Best-effort revocation of a single refresh token (logout).
    ///
    /// Claims are decoded without verification: locating the record is all
    /// that matters here, and a forged token simply misses.
    pub fn revoke(&self, refresh_token: &str) {
        if let Some(claims) = self.decode_unverified(refresh_token) {
            if let Some(token_id) = claims.token_id.as_deref() {
                if self.refresh_records.remove(token_id).is_some() {
                    tracing::info!(subject = %claims.sub, "refresh token revoked");
                }
            }
        }
    }

    /// Revoke every refresh token belonging to a subject ("logout
    /// everywhere"). Returns the number of sessions ended.
    pub fn revoke_all(&self, subject_id: &str) -> usize {
        let before = self.refresh_records.len();
        self.refresh_records
            .retain(|_, record| record.subject_id != subject_id);
        let removed = before.saturating_sub(self.refresh_records.len());
        if removed > 0 {
            tracing::warn!(subject = %subject_id, sessions = removed, "all refresh tokens revoked");
        }
        removed
    }

    /// Unverified token metadata; `None` when the token cannot be decoded
    /// at all.
    pub fn token_info(&self, token: &str) -> Option<TokenInfo> {
        let claims = self.decode_unverified(token)?;
        let now_ms = Utc::now().timestamp_millis();
        let expires_at_ms = claims.exp * 1000;
        let expires_in_ms = expires_at_ms - now_ms;

        Some(TokenInfo {
            expires_at_ms,
            expires_in_ms: expires_in_ms.max(0),
            is_expired: expires_in_ms < 0,
            issued_at_ms: claims.iat * 1000,
            age_secs: now_ms / 1000 - claims.iat,
        })
    }

    /// Refresh-store snapshot for monitoring endpoints.
    pub fn store_stats(&self) -> RefreshStoreStats {
        let now_ms = Utc::now().timestamp_millis();
        let tokens = self
            .refresh_records
            .snapshot()
            .into_iter()
            .map(|(id, record)| RefreshTokenSummary {
                id: format!("{}...", &id[..8.min(id.len())]),
                subject_id: record.subject_id,
                issued_at_ms: record.issued_at_ms,
                expires_at_ms: record.expires_at_ms,
                is_expired: record.expires_at_ms <= now_ms,
            })
            .collect();

        RefreshStoreStats {
            total_tokens: self.refresh_records.len(),
            tokens,
        }
    }

    /// Spawn the periodic cleanup of expired refresh records.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        self.refresh_records.spawn_sweeper(interval)
    }

    fn sign_access(&self, principal: &Principal) -> Result<String> {
        let now = Utc::now().timestamp_millis();
        let claims = Claims {
            sub: principal.id.clone(),
            email: principal.email.clone(),
            role: principal.role.clone(),
            iat: now / 1000,
            exp: (now + self.access_expiry_ms) / 1000,
            token_type: TOKEN_TYPE_ACCESS.to_string(),
            token_id: None,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|_| TrustError::InvalidToken)
    }

    fn sign_refresh(&self, principal: &Principal) -> Result<String> {
        let now = Utc::now().timestamp_millis();
        let token_id = generate_token_id();
        let expires_at_ms = now + self.refresh_expiry_ms;

        let claims = Claims {
            sub: principal.id.clone(),
            email: principal.email.clone(),
            role: principal.role.clone(),
            iat: now / 1000,
            exp: expires_at_ms / 1000,
            token_type: TOKEN_TYPE_REFRESH.to_string(),
            token_id: Some(token_id.clone()),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|_| TrustError::InvalidToken)?;

        self.refresh_records.insert(
            token_id.clone(),
            RefreshRecord {
                token_id,
                subject_id: principal.id.clone(),
                issued_at_ms: now,
                expires_at_ms,
            },
            Some(Duration::from_millis(self.refresh_expiry_ms as u64)),
        );

        Ok(token)
    }

    fn decode_refresh(&self, token: &str) -> Result<Claims> {
        let claims = decode::<Claims>(token, &self.refresh_decoding, &strict_validation())
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TrustError::RefreshExpired,
                _ => TrustError::InvalidToken,
            })?
            .claims;

        if claims.token_type != TOKEN_TYPE_REFRESH {
            return Err(TrustError::InvalidToken);
        }

        Ok(claims)
    }

    fn decode_unverified(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        decode::<Claims>(token, &self.refresh_decoding, &validation)
            .ok()
            .map(|data| data.claims)
    }
}

fn strict_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation
}

fn generate_token_id() -> String {
    let mut bytes = [0u8; TOKEN_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Parse an expiry string like `"15m"` or `"7d"` into milliseconds.
///
/// Supported units: `ms`, `s`, `m`, `h`, `d`.
pub fn parse_expiry(expiry: &str) -> Result<i64> {
    let invalid = || TrustError::InvalidExpiryFormat(expiry.to_string());

    let unit_start = expiry
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (amount, unit) = expiry.split_at(unit_start);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;

    let multiplier = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60 * 1_000,
        "h" => 60 * 60 * 1_000,
        "d" => 24 * 60 * 60 * 1_000,
        _ => return Err(invalid()),
    };

    Ok(amount * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> TokenAuthority {
        TokenAuthority::new(&TokenSettings {
            access_secret: "test-access-secret".to_string(),
            refresh_secret: "test-refresh-secret".to_string(),
            access_expiry: "15m".to_string(),
            refresh_expiry: "7d".to_string(),
        })
        .expect("valid settings")
    }

    fn principal() -> Principal {
        Principal {
            id: "u1".to_string(),
            email: "seeker@example.com".to_string(),
            role: "user".to_string(),
        }
    }

    #[test]
    fn test_parse_expiry_units() {
        assert_eq!(parse_expiry("250ms").unwrap(), 250);
        assert_eq!(parse_expiry("30s").unwrap(), 30_000);
        assert_eq!(parse_expiry("15m").unwrap(), 900_000);
        assert_eq!(parse_expiry("2h").unwrap(), 7_200_000);
        assert_eq!(parse_expiry("7d").unwrap(), 604_800_000);
    }

    #[test]
    fn test_parse_expiry_invalid() {
        for bad in ["", "15", "m15", "15w", "15 m", "-5m"] {
            assert!(
                matches!(parse_expiry(bad), Err(TrustError::InvalidExpiryFormat(_))),
                "expected failure for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_issue_pair_shape() {
        let authority = authority();
        let pair = authority.issue_pair(&principal()).unwrap();

        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 900);
        // JWT tokens have 3 parts separated by dots
        assert_eq!(pair.access_token.matches('.').count(), 2);
        assert_eq!(pair.refresh_token.matches('.').count(), 2);
    }

    #[test]
    fn test_verify_access_claims() {
        let authority = authority();
        let pair = authority.issue_pair(&principal()).unwrap();

        let claims = authority.verify_access(&pair.access_token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.email, "seeker@example.com");
        assert_eq!(claims.role, "user");
        assert_eq!(claims.token_type, "access");
        assert!(claims.token_id.is_none());
    }

    #[test]
    fn test_access_rejects_refresh_token() {
        let authority = authority();
        let pair = authority.issue_pair(&principal()).unwrap();

        // Wrong secret and wrong type both make this invalid
        assert!(matches!(
            authority.verify_access(&pair.refresh_token),
            Err(TrustError::InvalidToken)
        ));
    }

    #[test]
    fn test_verify_access_garbage() {
        let authority = authority();
        assert!(matches!(
            authority.verify_access("not.a.token"),
            Err(TrustError::InvalidToken)
        ));
    }

    #[test]
    fn test_verify_access_tampered() {
        let authority = authority();
        let pair = authority.issue_pair(&principal()).unwrap();
        let tampered = format!("{}x", pair.access_token);
        assert!(authority.verify_access(&tampered).is_err());
    }

    #[test]
    fn test_verify_refresh_happy_path() {
        let authority = authority();
        let pair = authority.issue_pair(&principal()).unwrap();

        let claims = authority.verify_refresh(&pair.refresh_token).unwrap();
        assert_eq!(claims.token_type, "refresh");
        assert!(claims.token_id.is_some());
    }

    #[test]
    fn test_rotation_invalidates_prior() {
        let authority = authority();
        let first = authority.issue_pair(&principal()).unwrap();

        let second = authority.rotate(&first.refresh_token).unwrap();
        assert!(authority.verify_access(&second.access_token).is_ok());
        assert!(authority.verify_refresh(&second.refresh_token).is_ok());

        // Replay of the rotated token must fail
        assert!(matches!(
            authority.verify_refresh(&first.refresh_token),
            Err(TrustError::RefreshRevoked)
        ));
        assert!(matches!(
            authority.rotate(&first.refresh_token),
            Err(TrustError::RefreshRevoked)
        ));
    }

    #[test]
    fn test_revoke_single_token() {
        let authority = authority();
        let pair = authority.issue_pair(&principal()).unwrap();

        authority.revoke(&pair.refresh_token);
        assert!(matches!(
            authority.verify_refresh(&pair.refresh_token),
            Err(TrustError::RefreshRevoked)
        ));
    }

    #[test]
    fn test_revoke_all_spares_other_subjects() {
        let authority = authority();
        let u1_a = authority.issue_pair(&principal()).unwrap();
        let u1_b = authority.issue_pair(&principal()).unwrap();
        let u2 = authority
            .issue_pair(&Principal {
                id: "u2".to_string(),
                email: "other@example.com".to_string(),
                role: "user".to_string(),
            })
            .unwrap();

        assert_eq!(authority.revoke_all("u1"), 2);
        assert!(matches!(
            authority.verify_refresh(&u1_a.refresh_token),
            Err(TrustError::RefreshRevoked)
        ));
        assert!(matches!(
            authority.verify_refresh(&u1_b.refresh_token),
            Err(TrustError::RefreshRevoked)
        ));
        assert!(authority.verify_refresh(&u2.refresh_token).is_ok());
    }

    #[test]
    fn test_token_info_reports_lifetime() {
        let authority = authority();
        let pair = authority.issue_pair(&principal()).unwrap();

        let info = authority.token_info(&pair.access_token).unwrap();
        assert!(!info.is_expired);
        assert!(info.expires_in_ms > 0);
        assert!(info.expires_in_ms <= 900_000);
        assert!(authority.token_info("garbage").is_none());
    }

    #[test]
    fn test_store_stats_masks_ids() {
        let authority = authority();
        authority.issue_pair(&principal()).unwrap();

        let stats = authority.store_stats();
        assert_eq!(stats.total_tokens, 1);
        assert!(stats.tokens[0].id.ends_with("..."));
        assert_eq!(stats.tokens[0].subject_id, "u1");
    }
}
