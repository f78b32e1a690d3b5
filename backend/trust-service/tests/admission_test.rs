//! Admission-control scenarios: bucket behavior over time, roles, and IP
//! reputation.

use std::time::Duration;

use trust_service::security::rate_limit::{
    AdmissionController, IpLimitReason, IpThresholds, RoleLimit, RoleLimits,
};

fn controller(window_secs: u64, max_requests: u32) -> AdmissionController {
    let mut limits = RoleLimits::default();
    limits.set(
        "user",
        RoleLimit {
            window_secs,
            max_requests,
        },
    );
    AdmissionController::new(limits, IpThresholds::default())
}

#[test]
fn capacity_exhaustion_then_full_window_recovery() {
    let controller = controller(1, 5);

    // Burst to capacity with effectively zero elapsed time
    for i in 0..5 {
        assert!(
            controller.admit("seeker", "user").allowed,
            "burst request {} should be admitted",
            i
        );
    }

    let denied = controller.admit("seeker", "user");
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    let retry_after = denied.retry_after_ms.expect("denial carries retry hint");
    assert!(retry_after > 0 && retry_after <= 1_000);

    // Let more than two windows elapse: refill is clamped at capacity
    std::thread::sleep(Duration::from_millis(2_200));
    let recovered = controller.admit("seeker", "user");
    assert!(recovered.allowed);
    assert_eq!(recovered.remaining, 4);
}

#[test]
fn partial_refill_admits_partially() {
    let controller = controller(1, 10);

    for _ in 0..10 {
        assert!(controller.admit("seeker", "user").allowed);
    }
    assert!(!controller.admit("seeker", "user").allowed);

    // Half a window restores about half the capacity
    std::thread::sleep(Duration::from_millis(500));
    let decision = controller.admit("seeker", "user");
    assert!(decision.allowed);
    assert!(decision.remaining >= 2 && decision.remaining <= 6);
}

#[test]
fn roles_get_distinct_budgets() {
    let controller = AdmissionController::with_defaults();

    let public = controller.admit("anon", "public");
    assert_eq!(public.limit, 100);

    let admin = controller.admit("boss", "admin");
    assert_eq!(admin.limit, 5_000);

    // Unknown roles are treated as public
    let unknown = controller.admit("who", "wanderer");
    assert_eq!(unknown.limit, 100);
}

#[test]
fn denial_does_not_consume_tokens() {
    let controller = controller(3600, 2);

    assert!(controller.admit("seeker", "user").allowed);
    assert!(controller.admit("seeker", "user").allowed);

    // Repeated denials leave the bucket where it is
    for _ in 0..5 {
        assert!(!controller.admit("seeker", "user").allowed);
    }
    let status = controller.status("seeker").unwrap();
    assert_eq!(status.requests, 2);
}

#[test]
fn ip_reputation_full_flow() {
    let controller = AdmissionController::new(
        RoleLimits::default(),
        IpThresholds {
            max_requests: 8,
            window_secs: 60,
            suspicious_threshold: 4,
        },
    );

    // Below the suspicious threshold: clean
    for _ in 0..4 {
        assert!(!controller.ip_check("203.0.113.7").limited);
    }
    assert_eq!(controller.suspicious_ips().len(), 0);

    // Crossing the suspicious threshold flags without blocking
    for _ in 0..4 {
        assert!(!controller.ip_check("203.0.113.7").limited);
    }
    let flagged = controller.suspicious_ips();
    assert_eq!(flagged.len(), 1);
    assert!(flagged[0].1.count >= 1);

    // Crossing the hard limit blocks
    let blocked = controller.ip_check("203.0.113.7");
    assert!(blocked.limited);
    assert_eq!(blocked.reason, Some(IpLimitReason::RateLimitExceeded));

    // A different IP is unaffected
    assert!(!controller.ip_check("203.0.113.8").limited);
}

#[test]
fn allowlist_wins_over_everything() {
    let controller = AdmissionController::new(
        RoleLimits::default(),
        IpThresholds {
            max_requests: 1,
            window_secs: 60,
            suspicious_threshold: 1,
        },
    );

    controller.allowlist_ip("198.51.100.1");
    for _ in 0..50 {
        assert!(!controller.ip_check("198.51.100.1").limited);
    }
    // Allowlisted traffic never even enters the window
    assert_eq!(controller.suspicious_ips().len(), 0);
}

#[tokio::test]
async fn sweeper_is_liveness_only() {
    let controller = controller(1, 2);
    controller.admit("seeker", "user");

    let sweeper = controller.spawn_sweeper(Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Recent state survives sweeping; only 24h-idle entries are collected
    assert!(controller.status("seeker").is_some());
    sweeper.abort();
}
