/// Password hashing and verification using Argon2id
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::Rng;
use serde::Serialize;

use crate::error::{CryptoError, Result};

const MIN_PASSWORD_LEN: usize = 8;

/// Password strength report
///
/// `issues` lists every failed rule in user-facing language; `score` is a
/// coarse 0-100 indicator for UI meters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrengthReport {
    pub is_strong: bool,
    pub issues: Vec<String>,
    pub score: u8,
}

/// Hash a password using Argon2id with an explicit time cost.
///
/// ## Security
///
/// - Algorithm: Argon2id, random 16-byte salt per password
/// - `time_cost` is the adaptive work factor; raise it as hardware improves
/// - Output is a PHC string safe for database storage
///
/// Passwords under 8 bytes are rejected before any hashing work is done.
pub fn hash_password(password: &str, time_cost: u32) -> Result<String> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(CryptoError::WeakPassword(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let params = Params::new(Params::DEFAULT_M_COST, time_cost, Params::DEFAULT_P_COST, None)
        .map_err(|e| CryptoError::Hash(format!("Invalid Argon2 params: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CryptoError::Hash(format!("Password hashing failed: {}", e)))?;

    Ok(hash.to_string())
}

/// Hash a password with the default cost, tuned for interactive login.
pub fn hash_password_default(password: &str) -> Result<String> {
    hash_password(password, Params::DEFAULT_T_COST)
}

/// Verify a password against its PHC-formatted hash.
///
/// Returns `Ok(false)` on mismatch; errors only on a malformed stored hash.
/// The underlying comparison is constant-time.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| CryptoError::Hash(format!("Invalid password hash format: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(CryptoError::Hash(format!(
            "Password verification failed: {}",
            e
        ))),
    }
}

/// Validate password strength against composition rules.
///
/// Checks length and the presence of uppercase, lowercase, digit, and
/// special characters. Every failed rule contributes an issue string.
pub fn validate_strength(password: &str) -> StrengthReport {
    let mut issues = Vec::new();

    if password.len() < MIN_PASSWORD_LEN {
        issues.push(format!("At least {} characters", MIN_PASSWORD_LEN));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        issues.push("At least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        issues.push("At least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        issues.push("At least one digit".to_string());
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        issues.push("At least one special character".to_string());
    }

    let score = 100u8.saturating_sub(issues.len() as u8 * 20);
    StrengthReport {
        is_strong: issues.is_empty(),
        issues,
        score,
    }
}

/// Generate a random password from a mixed alphabet.
///
/// Used by admin tooling when provisioning accounts; the result always
/// passes `validate_strength` checks statistically but is not guaranteed to,
/// so callers that need a guarantee should loop.
pub fn generate_password(length: usize) -> String {
    const CHARS: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}
