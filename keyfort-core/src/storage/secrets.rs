//! The secret-store collaborator: a get/set key-value store over opaque
//! strings, implemented by the host (platform keyring, extension secret
//! storage, ...). The vault only ever hands it already-encrypted or
//! non-confidential material.
//!
//! Two fixed keys are used. No transactional guarantee across them is
//! assumed; the vault tolerates every present/absent combination.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

/// Key holding the installation master key.
pub const MASTER_KEY_KEY: &str = "keyfort:master-key";

/// Key holding the serialized vault record.
pub const VAULT_RECORD_KEY: &str = "keyfort:vault-record";

/// Errors surfaced by a secret-store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("secret store backend: {0}")]
    Backend(String),
}

/// Host-implemented persistence for the two vault values.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-memory store for tests and headless runs.
///
/// Supports one-shot failure injection and counts `set` calls so tests can
/// assert that guarded operations never reach persistence.
#[derive(Default)]
pub struct MemorySecretStore {
    values: Mutex<HashMap<String, String>>,
    fail_next_set: AtomicBool,
    set_calls: AtomicUsize,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value, bypassing the failure hook.
    pub async fn insert(&self, key: &str, value: &str) {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
    }

    /// Peek at a stored value.
    pub async fn value(&self, key: &str) -> Option<String> {
        self.values.lock().await.get(key).cloned()
    }

    /// Make the next `set` call fail.
    pub fn fail_next_set(&self) {
        self.fail_next_set.store(true, Ordering::SeqCst);
    }

    /// How many times `set` has been called.
    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_set.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected failure".into()));
        }
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
