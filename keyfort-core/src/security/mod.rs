//! Cryptographic primitives and TOTP verification.

pub mod crypto;
pub mod totp;

pub use crypto::MasterKey;
pub use totp::{TotpConfig, TotpSecret};
