/// Security primitives for the trust subsystem
///
/// - `tokens`: JWT issuance, verification, rotation, revocation
/// - `rate_limit`: token-bucket admission and IP reputation
/// - `totp`: RFC 6238 one-time passwords
pub mod rate_limit;
pub mod tokens;
pub mod totp;

pub use rate_limit::{AdmissionController, AdmissionDecision, IpDecision, RoleLimits};
pub use tokens::{Claims, Principal, TokenAuthority, TokenPair};
