/// Ordered authentication strategies and wire-format types
///
/// The routing layer hands each inbound request's credentials to
/// `authenticate`, which tries a configured list of strategies in order.
/// Every strategy returns a tagged outcome instead of throwing:
///
/// - `Matched` — the strategy recognized and accepted the credential
/// - `NotApplicable` — the request carries nothing this strategy handles
/// - `Invalid` — the strategy recognized the credential and rejected it
///
/// The first `Matched` wins. A rejection from an earlier strategy is kept
/// only if no later strategy matches, so "invalid bearer token but valid
/// API key" authenticates via the API key.
///
/// The rejection/forbidden body types here are what the routing layer
/// serializes into 401/403 responses; this module does not know about HTTP
/// framing itself.
use serde::Serialize;
use std::sync::Arc;

use crate::security::tokens::{Claims, TokenAuthority, TokenInfo};
use crate::error::TrustError;

/// Threshold below which responses should warn the client to refresh.
const EXPIRY_WARNING_MS: i64 = 5 * 60 * 1000;

/// Response header names for the expiring-soon warning.
pub const HEADER_EXPIRING_SOON: &str = "X-Token-Expiring-Soon";
pub const HEADER_EXPIRES_IN: &str = "X-Token-Expires-In";

/// Credentials extracted from an inbound request, transport-neutral.
#[derive(Debug, Clone, Default)]
pub struct RequestAuth {
    /// Raw `Authorization` header value, if present
    pub authorization: Option<String>,
    /// Raw `X-Api-Key` header value, if present
    pub api_key: Option<String>,
}

/// How a request ended up authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    BearerToken,
    ApiKey,
}

/// An authenticated caller
#[derive(Debug, Clone)]
pub struct AuthPrincipal {
    pub method: AuthMethod,
    /// Present for bearer authentication; API keys carry no claims
    pub claims: Option<Claims>,
}

/// Machine-readable 401 codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthErrorCode {
    NoToken,
    InvalidToken,
    TokenExpired,
}

/// 401 response body
#[derive(Debug, Clone, Serialize)]
pub struct AuthRejection {
    pub error: String,
    pub message: String,
    pub code: AuthErrorCode,
}

impl AuthRejection {
    fn new(message: &str, code: AuthErrorCode) -> Self {
        Self {
            error: "Unauthorized".to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn no_token() -> Self {
        Self::new("Missing or invalid authorization header", AuthErrorCode::NoToken)
    }
}

/// 403 response body. Never reveals whether the resource exists, only that
/// the caller's role is insufficient.
#[derive(Debug, Clone, Serialize)]
pub struct ForbiddenRejection {
    pub error: String,
    pub message: String,
    #[serde(rename = "requiredRole")]
    pub required_role: Vec<String>,
    #[serde(rename = "userRole")]
    pub user_role: String,
}

/// Expiring-soon warning values for the response headers.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExpiryWarning {
    pub expires_in_ms: i64,
}

/// Outcome of one strategy against one request.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Matched(AuthPrincipal),
    NotApplicable,
    Invalid(AuthRejection),
}

pub trait AuthStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn authenticate(&self, request: &RequestAuth) -> AuthOutcome;
}

/// Bearer-token authentication against the token authority.
pub struct BearerTokenStrategy {
    authority: Arc<TokenAuthority>,
}

impl BearerTokenStrategy {
    pub fn new(authority: Arc<TokenAuthority>) -> Self {
        Self { authority }
    }
}

impl AuthStrategy for BearerTokenStrategy {
    fn name(&self) -> &'static str {
        "bearer_token"
    }

    fn authenticate(&self, request: &RequestAuth) -> AuthOutcome {
        let Some(header) = request.authorization.as_deref() else {
            return AuthOutcome::NotApplicable;
        };

        let Some(token) = extract_bearer(header) else {
            return AuthOutcome::Invalid(AuthRejection::new(
                "Invalid authorization header format",
                AuthErrorCode::InvalidToken,
            ));
        };

        match self.authority.verify_access(token) {
            Ok(claims) => AuthOutcome::Matched(AuthPrincipal {
                method: AuthMethod::BearerToken,
                claims: Some(claims),
            }),
            Err(TrustError::TokenExpired) => AuthOutcome::Invalid(AuthRejection::new(
                "Token expired",
                AuthErrorCode::TokenExpired,
            )),
            Err(_) => AuthOutcome::Invalid(AuthRejection::new(
                "Invalid token",
                AuthErrorCode::InvalidToken,
            )),
        }
    }
}

/// API-key authentication against a configured key set.
pub struct ApiKeyStrategy {
    keys: Vec<String>,
}

impl ApiKeyStrategy {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }
}

impl AuthStrategy for ApiKeyStrategy {
    fn name(&self) -> &'static str {
        "api_key"
    }

    fn authenticate(&self, request: &RequestAuth) -> AuthOutcome {
        let Some(candidate) = request.api_key.as_deref() else {
            return AuthOutcome::NotApplicable;
        };

        let valid = self
            .keys
            .iter()
            .any(|key| crypto_core::constant_time_eq(key.as_bytes(), candidate.as_bytes()));

        if valid {
            AuthOutcome::Matched(AuthPrincipal {
                method: AuthMethod::ApiKey,
                claims: None,
            })
        } else {
            AuthOutcome::Invalid(AuthRejection::new(
                "Invalid API key",
                AuthErrorCode::InvalidToken,
            ))
        }
    }
}

/// Evaluate strategies in order; first match wins.
pub fn authenticate(
    strategies: &[Box<dyn AuthStrategy>],
    request: &RequestAuth,
) -> std::result::Result<AuthPrincipal, AuthRejection> {
    let mut first_rejection: Option<AuthRejection> = None;

    for strategy in strategies {
        match strategy.authenticate(request) {
            AuthOutcome::Matched(principal) => {
                tracing::debug!(strategy = strategy.name(), "request authenticated");
                return Ok(principal);
            }
            AuthOutcome::NotApplicable => continue,
            AuthOutcome::Invalid(rejection) => {
                if first_rejection.is_none() {
                    first_rejection = Some(rejection);
                }
            }
        }
    }

    Err(first_rejection.unwrap_or_else(AuthRejection::no_token))
}

/// Enforce a role requirement on verified claims.
pub fn require_role(
    claims: &Claims,
    allowed: &[&str],
) -> std::result::Result<(), ForbiddenRejection> {
    if allowed.iter().any(|role| *role == claims.role) {
        return Ok(());
    }

    Err(ForbiddenRejection {
        error: "Forbidden".to_string(),
        message: "Insufficient permissions".to_string(),
        required_role: allowed.iter().map(|r| r.to_string()).collect(),
        user_role: claims.role.clone(),
    })
}

/// Warning values when a token is inside the refresh window.
pub fn expiry_warning(info: &TokenInfo) -> Option<ExpiryWarning> {
    if info.expires_in_ms > 0 && info.expires_in_ms < EXPIRY_WARNING_MS {
        Some(ExpiryWarning {
            expires_in_ms: info.expires_in_ms,
        })
    } else {
        None
    }
}

/// Strict `Bearer <token>` extraction: exactly two space-separated parts.
pub fn extract_bearer(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}
