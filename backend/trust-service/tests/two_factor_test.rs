//! Two-factor enrollment and challenge scenarios.

use trust_service::config::TwoFactorSettings;
use trust_service::security::totp;
use trust_service::services::two_fa::{TwoFactorService, TwoFactorState};
use trust_service::TrustError;

fn service() -> TwoFactorService {
    TwoFactorService::new(&TwoFactorSettings::default())
}

/// Enroll a subject end to end, returning the plaintext recovery codes and
/// the shared secret the "authenticator app" would hold.
fn enroll(service: &TwoFactorService, subject: &str) -> (Vec<String>, String) {
    let provisioning = service.provision(subject, &format!("{}@example.com", subject));
    let code = totp::code_at_step(&provisioning.secret, totp::current_step()).unwrap();
    let set = service.confirm_setup(subject, &code).unwrap();
    (set.codes, provisioning.secret)
}

#[test]
fn enrollment_walks_the_state_machine() {
    let service = service();

    assert_eq!(service.state("u1"), TwoFactorState::Unprovisioned);

    let provisioning = service.provision("u1", "u1@example.com");
    assert_eq!(service.state("u1"), TwoFactorState::SetupPending);
    assert!(provisioning.qr_payload.contains("SadhanaBoard"));

    let code = totp::code_at_step(&provisioning.secret, totp::current_step()).unwrap();
    let set = service.confirm_setup("u1", &code).unwrap();
    assert_eq!(set.codes.len(), 10);
    assert_eq!(service.state("u1"), TwoFactorState::Enabled);

    assert!(service.disable("u1"));
    assert_eq!(service.state("u1"), TwoFactorState::Unprovisioned);
}

#[test]
fn login_challenge_accepts_skewed_clock() {
    let service = service();
    let (_, secret) = enroll(&service, "u1");

    let step = totp::current_step();

    // A device one step behind still verifies
    let behind = totp::code_at_step(&secret, step - 1).unwrap();
    assert!(service.verify_code("u1", &behind).unwrap());

    // Two steps away does not
    let stale = totp::code_at_step(&secret, step - 2).unwrap();
    assert!(!service.verify_code("u1", &stale).unwrap());
}

#[test]
fn recovery_code_is_single_use_across_the_set() {
    let service = service();
    let (codes, _) = enroll(&service, "u1");

    let outcome = service.redeem_recovery_code("u1", &codes[0]).unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.remaining, 9);

    // The same code again fails without consuming anything further
    let replay = service.redeem_recovery_code("u1", &codes[0]).unwrap();
    assert!(!replay.success);
    assert_eq!(replay.remaining, 9);

    // Other codes still work
    let next = service.redeem_recovery_code("u1", &codes[1]).unwrap();
    assert!(next.success);
    assert_eq!(next.remaining, 8);

    assert_eq!(service.status("u1").remaining_recovery_codes, 8);
}

#[test]
fn malformed_challenge_input_never_reaches_crypto() {
    let service = service();
    enroll(&service, "u1");

    assert!(matches!(
        service.verify_code("u1", "12345"),
        Err(TrustError::InvalidCodeFormat)
    ));
    assert!(matches!(
        service.verify_code("u1", "12345a"),
        Err(TrustError::InvalidCodeFormat)
    ));
    assert!(matches!(
        service.redeem_recovery_code("u1", "lowercase-1"),
        Err(TrustError::InvalidCodeFormat)
    ));
}

#[test]
fn subjects_are_isolated() {
    let service = service();
    let (codes_a, _) = enroll(&service, "alice");
    enroll(&service, "bob");

    // Alice's recovery code does nothing for Bob
    let cross = service.redeem_recovery_code("bob", &codes_a[0]).unwrap();
    assert!(!cross.success);
    assert_eq!(cross.remaining, 10);

    // Disabling Bob leaves Alice enrolled
    service.disable("bob");
    assert_eq!(service.state("alice"), TwoFactorState::Enabled);
    assert_eq!(service.state("bob"), TwoFactorState::Unprovisioned);
}

#[test]
fn pending_setup_expires() {
    let service = TwoFactorService::new(&TwoFactorSettings {
        setup_ttl_secs: 0,
        ..TwoFactorSettings::default()
    });

    let provisioning = service.provision("u1", "u1@example.com");
    std::thread::sleep(std::time::Duration::from_millis(10));

    // The abandoned setup is as good as never started
    assert_eq!(service.state("u1"), TwoFactorState::Unprovisioned);
    let code = totp::code_at_step(&provisioning.secret, totp::current_step()).unwrap();
    assert!(matches!(
        service.confirm_setup("u1", &code),
        Err(TrustError::SetupNotPending)
    ));
}
