/// Business-logic services built on the security primitives
pub mod two_fa;

pub use two_fa::{TwoFactorService, TwoFactorState};
