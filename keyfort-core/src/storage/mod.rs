//! Persistence seam: the host-provided secret store.

pub mod secrets;

pub use secrets::{MemorySecretStore, SecretStore, StoreError, MASTER_KEY_KEY, VAULT_RECORD_KEY};
