//! Keyfort: a local secrets vault protected by a device-generated master
//! key and unlocked with time-based one-time passcodes, with a security
//! question as the fallback recovery path.
//!
//! The crate is the vault core only. The host supplies thin shims for
//! everything that touches a platform surface: a [`SecretStore`] for
//! durable bytes, a [`QrRenderer`] for provisioning images, and a channel
//! receiver for the [`VaultEvent`] stream its UI renders from. The state
//! machine, the cryptographic protocol, and entry CRUD live in here and
//! are testable without a host runtime.

pub mod error;
pub mod events;
pub mod qr;
pub mod security;
pub mod storage;
pub mod vault;

pub use error::{Result, VaultError};
pub use events::{VaultCommand, VaultEvent};
pub use qr::{QrError, QrRenderer, UriEchoRenderer};
pub use security::crypto::MasterKey;
pub use security::totp::{TotpConfig, TotpSecret};
pub use storage::{MemorySecretStore, SecretStore, StoreError};
pub use vault::{EntryKind, EntrySummary, StoredEntry, VaultMachine, VaultRecord, VaultState};
