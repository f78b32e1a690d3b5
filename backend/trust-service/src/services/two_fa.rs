/// Two-factor authentication lifecycle
///
/// Drives a subject's 2FA state through enrollment, use, and teardown:
///
/// ```text
/// Unprovisioned → SetupPending → Enabled → (disable) → Unprovisioned
/// ```
///
/// `provision` hands out a secret but persists nothing durable; only a
/// successful `confirm_setup` — the user proving their authenticator works —
/// enables 2FA and mints recovery codes. A pending setup expires after a
/// TTL (default 15 minutes) so abandoned enrollments do not linger.
///
/// Recovery codes are stored as SHA-256 hashes and are strictly single-use:
/// the check-and-mark happens under the config entry's lock, so two
/// concurrent redemptions of the same code cannot both succeed.
use chrono::Utc;
use rand::RngCore;
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::TwoFactorSettings;
use crate::error::{Result, TrustError};
use crate::security::totp;
use crate::store::CredentialStore;

/// Primary challenge channel. Delivery of SMS/email codes belongs to the
/// notification layer; this subsystem only issues and verifies TOTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TwoFactorMethod {
    Totp,
    Sms,
    Email,
}

/// One stored recovery code
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryCode {
    pub hash: String,
    pub used: bool,
    pub used_at_ms: Option<i64>,
}

/// Per-subject 2FA configuration
#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorConfig {
    pub secret: String,
    pub primary_method: TwoFactorMethod,
    pub recovery_codes: Vec<RecoveryCode>,
    pub enabled_at_ms: i64,
}

#[derive(Debug, Clone)]
struct PendingSetup {
    secret: String,
    expires_at_ms: i64,
}

/// Returned by `provision`; the QR payload goes to the user exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct Provisioning {
    pub secret: String,
    pub manual_entry_key: String,
    pub qr_payload: String,
}

/// Returned by `confirm_setup` and `regenerate_recovery_codes`.
///
/// `codes` is the only time plaintext recovery codes exist outside the
/// user's hands; `hashed` is what the caller persists.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryCodeSet {
    pub codes: Vec<String>,
    pub hashed: Vec<RecoveryCode>,
}

/// Outcome of a recovery-code redemption
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RedeemOutcome {
    pub success: bool,
    pub remaining: usize,
}

/// Where a subject stands in the enrollment lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TwoFactorState {
    Unprovisioned,
    SetupPending,
    Enabled,
}

/// 2FA status summary for profile/security pages
#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub method: Option<TwoFactorMethod>,
    pub remaining_recovery_codes: usize,
    pub enabled_at_ms: Option<i64>,
}

pub struct TwoFactorService {
    issuer: String,
    recovery_code_count: usize,
    setup_ttl: Duration,
    window: u8,
    pending: CredentialStore<PendingSetup>,
    configs: CredentialStore<TwoFactorConfig>,
}

impl TwoFactorService {
    pub fn new(settings: &TwoFactorSettings) -> Self {
        Self {
            issuer: settings.issuer.clone(),
            recovery_code_count: settings.recovery_code_count,
            setup_ttl: Duration::from_secs(settings.setup_ttl_secs),
            window: settings.window,
            pending: CredentialStore::new(),
            configs: CredentialStore::new(),
        }
    }

    /// Begin enrollment: generate a secret and hand back the QR payload.
    ///
    /// Nothing is enabled until the first code verifies via
    /// `confirm_setup`. Re-provisioning replaces any earlier pending setup.
    pub fn provision(&self, subject_id: &str, label: &str) -> Provisioning {
        let secret = totp::generate_secret();
        let qr_payload = totp::provisioning_uri(label, &secret, &self.issuer);

        self.pending.insert(
            subject_id,
            PendingSetup {
                secret: secret.clone(),
                expires_at_ms: Utc::now().timestamp_millis()
                    + self.setup_ttl.as_millis() as i64,
            },
            Some(self.setup_ttl),
        );

        Provisioning {
            manual_entry_key: secret.clone(),
            secret,
            qr_payload,
        }
    }

    /// Complete enrollment by verifying the first code from the user's
    /// authenticator. On success the subject is Enabled and receives their
    /// recovery codes — plaintext exactly once.
    pub fn confirm_setup(&self, subject_id: &str, code: &str) -> Result<RecoveryCodeSet> {
        if !totp::is_valid_code_format(code) {
            return Err(TrustError::InvalidCodeFormat);
        }

        let pending = self
            .pending
            .get(subject_id)
            .ok_or(TrustError::SetupNotPending)?;
        let now = Utc::now().timestamp_millis();
        if pending.expires_at_ms <= now {
            self.pending.remove(subject_id);
            return Err(TrustError::SetupNotPending);
        }

        if !totp::verify_code(&pending.secret, code, self.window)? {
            return Err(TrustError::InvalidCode);
        }

        let set = self.mint_recovery_codes();
        self.configs.insert(
            subject_id,
            TwoFactorConfig {
                secret: pending.secret,
                primary_method: TwoFactorMethod::Totp,
                recovery_codes: set.hashed.clone(),
                enabled_at_ms: now,
            },
            None,
        );
        self.pending.remove(subject_id);

        tracing::info!(subject = %subject_id, "two-factor authentication enabled");
        Ok(set)
    }

    /// Verify a TOTP code for an enrolled subject.
    pub fn verify_code(&self, subject_id: &str, code: &str) -> Result<bool> {
        if !totp::is_valid_code_format(code) {
            return Err(TrustError::InvalidCodeFormat);
        }

        let config = self.configs.get(subject_id).ok_or(TrustError::NotEnabled)?;
        totp::verify_code(&config.secret, code, self.window)
    }

    /// Redeem a recovery code. Each code works exactly once: the scan,
    /// comparison, and used-mark all run under the config entry's lock.
    pub fn redeem_recovery_code(&self, subject_id: &str, candidate: &str) -> Result<RedeemOutcome> {
        if !is_valid_recovery_format(candidate) {
            return Err(TrustError::InvalidCodeFormat);
        }

        let candidate_hash = crypto_core::sha256_hex(candidate);
        let now = Utc::now().timestamp_millis();

        self.configs
            .with_entry(subject_id, |config| {
                if config.recovery_codes.iter().all(|c| c.used) {
                    return Err(TrustError::RecoveryCodeExhausted);
                }

                let mut success = false;
                for code in config.recovery_codes.iter_mut().filter(|c| !c.used) {
                    if crypto_core::constant_time_eq(
                        code.hash.as_bytes(),
                        candidate_hash.as_bytes(),
                    ) {
                        code.used = true;
                        code.used_at_ms = Some(now);
                        success = true;
                        break;
                    }
                }

                let remaining = config.recovery_codes.iter().filter(|c| !c.used).count();
                Ok(RedeemOutcome { success, remaining })
            })
            .ok_or(TrustError::NotEnabled)?
    }

    /// Replace all recovery codes, invalidating every prior one.
    pub fn regenerate_recovery_codes(&self, subject_id: &str) -> Result<RecoveryCodeSet> {
        let set = self.mint_recovery_codes();
        let hashed = set.hashed.clone();

        self.configs
            .with_entry(subject_id, |config| {
                config.recovery_codes = hashed;
            })
            .ok_or(TrustError::NotEnabled)?;

        tracing::info!(subject = %subject_id, "recovery codes regenerated");
        Ok(set)
    }

    /// Tear down 2FA for a subject. Returns whether anything was removed.
    pub fn disable(&self, subject_id: &str) -> bool {
        self.pending.remove(subject_id);
        let removed = self.configs.remove(subject_id).is_some();
        if removed {
            tracing::info!(subject = %subject_id, "two-factor authentication disabled");
        }
        removed
    }

    pub fn state(&self, subject_id: &str) -> TwoFactorState {
        if self.configs.get(subject_id).is_some() {
            return TwoFactorState::Enabled;
        }
        match self.pending.get(subject_id) {
            Some(p) if p.expires_at_ms > Utc::now().timestamp_millis() => {
                TwoFactorState::SetupPending
            }
            _ => TwoFactorState::Unprovisioned,
        }
    }

    pub fn status(&self, subject_id: &str) -> TwoFactorStatus {
        match self.configs.get(subject_id) {
            Some(config) => TwoFactorStatus {
                enabled: true,
                method: Some(config.primary_method),
                remaining_recovery_codes: config
                    .recovery_codes
                    .iter()
                    .filter(|c| !c.used)
                    .count(),
                enabled_at_ms: Some(config.enabled_at_ms),
            },
            None => TwoFactorStatus {
                enabled: false,
                method: None,
                remaining_recovery_codes: 0,
                enabled_at_ms: None,
            },
        }
    }

    /// Spawn the periodic cleanup of expired pending setups.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        self.pending.spawn_sweeper(interval)
    }

    fn mint_recovery_codes(&self) -> RecoveryCodeSet {
        let codes: Vec<String> = (0..self.recovery_code_count)
            .map(|_| generate_recovery_code())
            .collect();
        let hashed = codes
            .iter()
            .map(|code| RecoveryCode {
                hash: crypto_core::sha256_hex(code),
                used: false,
                used_at_ms: None,
            })
            .collect();

        RecoveryCodeSet { codes, hashed }
    }
}

/// `XXXX-XXXX`: eight uppercase hex characters with one dash.
fn generate_recovery_code() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    let raw = hex::encode_upper(bytes);
    format!("{}-{}", &raw[..4], &raw[4..])
}

/// Strict `XXXX-XXXX` over the uppercase hex-like alphabet.
fn is_valid_recovery_format(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == 9
        && bytes[4] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || b.is_ascii_uppercase() || b.is_ascii_digit())
}
