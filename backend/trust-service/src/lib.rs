/// Trust & Access Lifecycle subsystem for the SadhanaBoard backend
///
/// Everything between "a request arrived" and "business logic may run":
/// credential issuance and rotation, admission control, two-factor
/// challenges, and the wire formats the routing layer serializes. The HTTP
/// transport, document store, and notification delivery are external
/// collaborators.
///
/// ## Modules
///
/// - `config`: environment-driven settings, fail-fast on bad key material
/// - `store`: in-process credential store with expiry sweeping
/// - `security::tokens`: access/refresh token authority
/// - `security::rate_limit`: token-bucket and IP-reputation admission
/// - `security::totp`: RFC 6238 one-time passwords
/// - `services::two_fa`: two-factor enrollment lifecycle
/// - `auth_flow`: ordered authentication strategies and 401/403 bodies
/// - `error`: error taxonomy
pub mod auth_flow;
pub mod config;
pub mod error;
pub mod security;
pub mod services;
pub mod store;

// Re-export commonly used types
pub use auth_flow::{authenticate, AuthOutcome, AuthPrincipal, AuthStrategy, RequestAuth};
pub use config::Settings;
pub use error::{Result, TrustError};
pub use security::rate_limit::{AdmissionController, AdmissionDecision, IpDecision};
pub use security::tokens::{Claims, Principal, TokenAuthority, TokenPair};
pub use services::two_fa::{TwoFactorService, TwoFactorState};
pub use store::CredentialStore;
