//! Error types for vault operations.
//!
//! The variants are designed to be:
//! - Specific enough for programmatic handling
//! - Safe to display: authentication and decryption failures carry no
//!   payload, so a caller cannot learn which factor failed or any
//!   cryptographic detail

use thiserror::Error;

use crate::storage::StoreError;
use crate::vault::VaultState;

/// Errors that can occur during vault operations.
///
/// Every error is terminal to the single offending command only; the
/// vault retains its state and the caller may re-prompt or retry.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Empty or malformed user input. Recoverable, re-prompt.
    #[error("{0}")]
    Validation(String),

    /// Bad TOTP token or bad security answer. Deliberately does not
    /// say which factor failed.
    #[error("invalid code or answer")]
    Authentication,

    /// Ciphertext/key mismatch or other cipher failure. Fatal to the
    /// operation, not to the process.
    #[error("cryptographic operation failed")]
    Decryption,

    /// Command issued in a state that does not permit it.
    #[error("operation not permitted while vault is {state}")]
    State { state: VaultState },

    /// The vault has not been set up yet.
    #[error("vault not set up")]
    NotSetup,

    /// No stored entry with the requested id.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// The secret-store collaborator failed; in-memory state has been
    /// rolled back to the last durable point.
    #[error("storage error: {0}")]
    Persistence(String),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The QR-rendering collaborator failed.
    #[error("QR rendering failed: {0}")]
    Qr(String),
}

impl VaultError {
    /// Stable machine-readable code for frontend handling.
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::Validation(_) => "VALIDATION",
            VaultError::Authentication => "AUTHENTICATION",
            VaultError::Decryption => "DECRYPTION",
            VaultError::State { .. } => "STATE",
            VaultError::NotSetup => "NOT_SETUP",
            VaultError::EntryNotFound(_) => "NOT_FOUND",
            VaultError::Persistence(_) => "PERSISTENCE",
            VaultError::Serialization(_) => "SERIALIZATION",
            VaultError::Qr(_) => "QR",
        }
    }
}

impl From<StoreError> for VaultError {
    fn from(err: StoreError) -> Self {
        VaultError::Persistence(err.to_string())
    }
}

impl From<crate::qr::QrError> for VaultError {
    fn from(err: crate::qr::QrError) -> Self {
        VaultError::Qr(err.0)
    }
}

impl serde::Serialize for VaultError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        // Serialize as a structured object for better frontend handling
        let mut state = serializer.serialize_struct("VaultError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = VaultError::Authentication;
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("AUTHENTICATION"));
        assert!(json.contains("invalid code or answer"));
    }

    #[test]
    fn test_authentication_error_names_no_factor() {
        let message = VaultError::Authentication.to_string();
        assert!(!message.to_lowercase().contains("totp"));
        assert!(!message.to_lowercase().contains("token"));
        assert!(!message.to_lowercase().contains("question"));
    }

    #[test]
    fn test_store_error_maps_to_persistence() {
        let err: VaultError = StoreError::Backend("keyring unavailable".into()).into();
        assert!(matches!(err, VaultError::Persistence(_)));
        assert_eq!(err.code(), "PERSISTENCE");
    }
}
