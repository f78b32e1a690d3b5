/// Request admission control
///
/// Two independent layers:
///
/// - A token-bucket limiter keyed by authenticated principal (or IP for
///   anonymous traffic), with capacity and refill rate determined by role.
///   Refill is continuous and computed lazily on each call, so correctness
///   never depends on timer granularity, and the decision is bucket-based
///   rather than fixed-window to avoid boundary bursts.
/// - A sliding-window IP reputation check for network-level abuse,
///   independent of identity, with static allow/deny lists that bypass the
///   window entirely and a "suspicious" tier that flags without blocking.
///
/// Admission never returns an error: the decision struct is the whole
/// contract. The in-process store cannot fail, and whether a hypothetical
/// storage failure should fail open or closed is the calling layer's
/// policy decision, not this module's.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::store::CredentialStore;

const IDLE_MAX: Duration = Duration::from_secs(24 * 60 * 60);

/// Per-role bucket parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoleLimit {
    pub window_secs: u64,
    pub max_requests: u32,
}

/// Role → limit table. Unknown roles fall back to `public`.
#[derive(Debug, Clone)]
pub struct RoleLimits {
    limits: HashMap<String, RoleLimit>,
}

impl Default for RoleLimits {
    fn default() -> Self {
        let mut limits = HashMap::new();
        for (role, max_requests) in [
            ("public", 100),
            ("guest", 300),
            ("user", 1_000),
            ("mentor", 2_000),
            ("admin", 5_000),
            ("superadmin", 10_000),
        ] {
            limits.insert(
                role.to_string(),
                RoleLimit {
                    window_secs: 60,
                    max_requests,
                },
            );
        }
        Self { limits }
    }
}

impl RoleLimits {
    pub fn set(&mut self, role: impl Into<String>, limit: RoleLimit) {
        self.limits.insert(role.into(), limit);
    }

    fn resolve(&self, role: &str) -> RoleLimit {
        self.limits
            .get(role)
            .or_else(|| self.limits.get("public"))
            .copied()
            .unwrap_or(RoleLimit {
                window_secs: 60,
                max_requests: 100,
            })
    }
}

/// Sliding-window thresholds for the IP reputation check
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IpThresholds {
    pub max_requests: usize,
    pub window_secs: u64,
    pub suspicious_threshold: usize,
}

impl Default for IpThresholds {
    fn default() -> Self {
        Self {
            max_requests: 1_000,
            window_secs: 60,
            suspicious_threshold: 500,
        }
    }
}

#[derive(Debug, Clone)]
struct RateBucket {
    tokens: f64,
    last_refill_ms: i64,
    requests: u64,
    first_request_ms: i64,
    request_log: Vec<i64>,
}

#[derive(Debug, Clone)]
struct IpRecord {
    requests: Vec<i64>,
    suspicious: bool,
}

/// Outcome of a bucket admission check
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<i64>,
}

/// Why an IP was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IpLimitReason {
    Blacklisted,
    RateLimitExceeded,
}

/// Outcome of an IP reputation check
#[derive(Debug, Clone, Serialize)]
pub struct IpDecision {
    pub limited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<IpLimitReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_count: Option<usize>,
}

impl IpDecision {
    fn allowed() -> Self {
        Self {
            limited: false,
            reason: None,
            request_count: None,
        }
    }
}

/// Tracking data for an IP that crossed the suspicious threshold
#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousIp {
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
    pub count: u64,
}

/// Snapshot of one bucket for monitoring
#[derive(Debug, Clone, Serialize)]
pub struct BucketStatus {
    pub tokens: u32,
    pub requests: u64,
    pub first_request_ms: i64,
    pub last_refill_ms: i64,
    pub requests_in_window: usize,
}

/// Limiter-wide statistics
#[derive(Debug, Serialize)]
pub struct AdmissionStats {
    pub active_keys: usize,
    pub tracked_ips: usize,
    pub denylisted_ips: usize,
    pub allowlisted_ips: usize,
    pub suspicious_ips: usize,
}

pub struct AdmissionController {
    limits: RoleLimits,
    thresholds: IpThresholds,
    buckets: CredentialStore<RateBucket>,
    ip_records: CredentialStore<IpRecord>,
    allowlist: Arc<DashSet<String>>,
    denylist: Arc<DashSet<String>>,
    suspicious: Arc<DashMap<String, SuspiciousIp>>,
}

impl AdmissionController {
    pub fn new(limits: RoleLimits, thresholds: IpThresholds) -> Self {
        Self {
            limits,
            thresholds,
            buckets: CredentialStore::with_idle_timeout(IDLE_MAX),
            ip_records: CredentialStore::with_idle_timeout(IDLE_MAX),
            allowlist: Arc::new(DashSet::new()),
            denylist: Arc::new(DashSet::new()),
            suspicious: Arc::new(DashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RoleLimits::default(), IpThresholds::default())
    }

    /// Admit or refuse one request of weight 1.
    pub fn admit(&self, key: &str, role: &str) -> AdmissionDecision {
        self.admit_weighted(key, role, 1)
    }

    /// Admit or refuse a request with an explicit weight (batch endpoints
    /// debit more than one token).
    ///
    /// The refill-check-debit sequence runs under the bucket's lock, so
    /// concurrent requests for the same key serialize; different keys do
    /// not contend.
    pub fn admit_weighted(&self, key: &str, role: &str, weight: u32) -> AdmissionDecision {
        let limit = self.limits.resolve(role);
        let now = Utc::now().timestamp_millis();
        let window_ms = (limit.window_secs * 1000) as i64;
        let capacity = f64::from(limit.max_requests);
        let weight = f64::from(weight);

        self.buckets.with_entry_or_insert(
            key,
            || RateBucket {
                tokens: capacity,
                last_refill_ms: now,
                requests: 0,
                first_request_ms: now,
                request_log: Vec::new(),
            },
            |bucket| {
                // Continuous refill proportional to elapsed time, clamped
                let elapsed = (now - bucket.last_refill_ms).max(0);
                if elapsed > 0 {
                    let refill = (elapsed as f64 / window_ms as f64) * capacity;
                    bucket.tokens = (bucket.tokens + refill).min(capacity);
                    bucket.last_refill_ms = now;
                }

                let allowed = bucket.tokens >= weight;
                if allowed {
                    bucket.tokens -= weight;
                    bucket.requests += 1;
                    bucket.request_log.push(now);
                    bucket.request_log.retain(|&t| t > now - window_ms);
                }

                let retry_after_ms = if allowed {
                    None
                } else {
                    // Time until enough tokens have refilled for this weight
                    let refill_rate = capacity / window_ms as f64;
                    Some(((weight - bucket.tokens) / refill_rate).ceil() as i64)
                };

                AdmissionDecision {
                    allowed,
                    limit: limit.max_requests,
                    remaining: bucket.tokens.floor().max(0.0) as u32,
                    reset_at_ms: bucket.first_request_ms + window_ms,
                    retry_after_ms,
                }
            },
        )
    }

    /// Current bucket state without consuming tokens.
    ///
    /// The request log is pruned to the role window on each admit, so its
    /// length is the in-window request count.
    pub fn status(&self, key: &str) -> Option<BucketStatus> {
        self.buckets.get(key).map(|bucket| BucketStatus {
            tokens: bucket.tokens.floor().max(0.0) as u32,
            requests: bucket.requests,
            first_request_ms: bucket.first_request_ms,
            last_refill_ms: bucket.last_refill_ms,
            requests_in_window: bucket.request_log.len(),
        })
    }

    pub fn reset(&self, key: &str) {
        self.buckets.remove(key);
    }

    pub fn reset_all(&self) {
        self.buckets.clear();
    }

    /// Network-level sliding-window check, independent of identity.
    ///
    /// Allowlisted IPs bypass the window; denylisted IPs are refused
    /// outright. Crossing the suspicious threshold flags the IP for
    /// upstream alerting without blocking it.
    pub fn ip_check(&self, ip: &str) -> IpDecision {
        if self.allowlist.contains(ip) {
            return IpDecision::allowed();
        }
        if self.denylist.contains(ip) {
            return IpDecision {
                limited: true,
                reason: Some(IpLimitReason::Blacklisted),
                request_count: None,
            };
        }

        let now = Utc::now().timestamp_millis();
        let window_ms = (self.thresholds.window_secs * 1000) as i64;
        let max_requests = self.thresholds.max_requests;
        let suspicious_threshold = self.thresholds.suspicious_threshold;

        let (decision, newly_suspicious) = self.ip_records.with_entry_or_insert(
            ip,
            || IpRecord {
                requests: Vec::new(),
                suspicious: false,
            },
            |record| {
                record.requests.retain(|&t| t > now - window_ms);

                if record.requests.len() >= max_requests {
                    record.suspicious = true;
                    return (
                        IpDecision {
                            limited: true,
                            reason: Some(IpLimitReason::RateLimitExceeded),
                            request_count: Some(record.requests.len()),
                        },
                        false,
                    );
                }

                let newly_suspicious = record.requests.len() >= suspicious_threshold;
                if newly_suspicious {
                    record.suspicious = true;
                }

                record.requests.push(now);
                (IpDecision::allowed(), newly_suspicious)
            },
        );

        if newly_suspicious {
            self.mark_suspicious(ip, now);
        }

        decision
    }

    pub fn allowlist_ip(&self, ip: impl Into<String>) {
        self.allowlist.insert(ip.into());
    }

    pub fn denylist_ip(&self, ip: impl Into<String>) {
        let ip = ip.into();
        tracing::warn!(ip = %ip, "IP added to denylist");
        self.denylist.insert(ip);
    }

    pub fn pardon_ip(&self, ip: &str) {
        self.denylist.remove(ip);
    }

    /// IPs currently flagged as suspicious, with first/last sighting.
    pub fn suspicious_ips(&self) -> Vec<(String, SuspiciousIp)> {
        self.suspicious
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            active_keys: self.buckets.len(),
            tracked_ips: self.ip_records.len(),
            denylisted_ips: self.denylist.len(),
            allowlisted_ips: self.allowlist.len(),
            suspicious_ips: self.suspicious.len(),
        }
    }

    /// Spawn the periodic cleanup of idle buckets, idle IP records, and
    /// stale suspicious-IP flags. Liveness only; decisions never depend on
    /// the sweeper having run.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let buckets = self.buckets.clone();
        let ip_records = self.ip_records.clone();
        let suspicious = Arc::clone(&self.suspicious);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = buckets.sweep() + ip_records.sweep();
                let cutoff = Utc::now().timestamp_millis() - IDLE_MAX.as_millis() as i64;
                suspicious.retain(|_, s| s.last_seen_ms > cutoff);
                if removed > 0 {
                    tracing::debug!("admission sweep removed {} idle records", removed);
                }
            }
        })
    }

    fn mark_suspicious(&self, ip: &str, now: i64) {
        let mut entry = self.suspicious.entry(ip.to_string()).or_insert(SuspiciousIp {
            first_seen_ms: now,
            last_seen_ms: now,
            count: 0,
        });
        entry.last_seen_ms = now;
        entry.count += 1;
        tracing::warn!(ip = %ip, hits = entry.count, "suspicious request volume from IP");
    }
}
