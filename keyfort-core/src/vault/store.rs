//! In-memory authoritative representation of the vault record, with the
//! persistence handoff to the secret-store collaborator.
//!
//! This layer has no knowledge of lock state; that discipline belongs to
//! the state machine. What it does enforce is durability: every mutation
//! is serialized and handed to the store before the operation reports
//! success, and a failed handoff rolls the in-memory change back, so
//! memory and disk never silently diverge.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, VaultError};
use crate::storage::{SecretStore, VAULT_RECORD_KEY};
use crate::vault::record::{EntrySummary, StoredEntry, VaultRecord};

pub struct VaultStore {
    backend: Arc<dyn SecretStore>,
    record: Option<VaultRecord>,
}

impl VaultStore {
    pub fn new(backend: Arc<dyn SecretStore>) -> Self {
        Self {
            backend,
            record: None,
        }
    }

    /// Load the persisted record, if any.
    ///
    /// An unparsable record is treated identically to an absent one:
    /// availability over strictness, so corruption falls back to setup
    /// instead of a crash.
    pub async fn load(&mut self) -> Result<()> {
        self.record = match self.backend.get(VAULT_RECORD_KEY).await? {
            None => None,
            Some(raw) => match serde_json::from_str::<VaultRecord>(&raw) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!("stored vault record is unreadable, treating as absent: {}", err);
                    None
                }
            },
        };
        Ok(())
    }

    pub fn is_present(&self) -> bool {
        self.record.is_some()
    }

    pub fn record(&self) -> Option<&VaultRecord> {
        self.record.as_ref()
    }

    /// Persist a freshly-built record (setup). The in-memory record is only
    /// adopted once the handoff succeeds.
    pub async fn install(&mut self, record: VaultRecord) -> Result<()> {
        let serialized = serde_json::to_string(&record)?;
        self.backend.set(VAULT_RECORD_KEY, &serialized).await?;
        self.record = Some(record);
        debug!("vault record installed");
        Ok(())
    }

    /// Append an entry. Id uniqueness is enforced here.
    pub async fn add_entry(&mut self, entry: StoredEntry) -> Result<()> {
        {
            let record = self.record.as_mut().ok_or(VaultError::NotSetup)?;
            if record.entries.iter().any(|e| e.id == entry.id) {
                return Err(VaultError::Validation(format!(
                    "duplicate entry id: {}",
                    entry.id
                )));
            }
            record.entries.push(entry);
        }
        if let Err(err) = self.persist().await {
            if let Some(record) = self.record.as_mut() {
                record.entries.pop();
            }
            return Err(err);
        }
        Ok(())
    }

    /// Remove an entry, returning it. Reinserted at its old position if the
    /// handoff fails.
    pub async fn remove_entry(&mut self, id: &str) -> Result<StoredEntry> {
        let (index, removed) = {
            let record = self.record.as_mut().ok_or(VaultError::NotSetup)?;
            let index = record
                .entries
                .iter()
                .position(|e| e.id == id)
                .ok_or_else(|| VaultError::EntryNotFound(id.to_string()))?;
            (index, record.entries.remove(index))
        };
        if let Err(err) = self.persist().await {
            if let Some(record) = self.record.as_mut() {
                record.entries.insert(index, removed);
            }
            return Err(err);
        }
        Ok(removed)
    }

    /// Flip an entry's pinned flag, returning the new value.
    pub async fn toggle_pinned(&mut self, id: &str) -> Result<bool> {
        let pinned = {
            let record = self.record.as_mut().ok_or(VaultError::NotSetup)?;
            let entry = record
                .entries
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| VaultError::EntryNotFound(id.to_string()))?;
            entry.pinned = !entry.pinned;
            entry.pinned
        };
        if let Err(err) = self.persist().await {
            if let Some(record) = self.record.as_mut() {
                if let Some(entry) = record.entries.iter_mut().find(|e| e.id == id) {
                    entry.pinned = !entry.pinned;
                }
            }
            return Err(err);
        }
        Ok(pinned)
    }

    /// Swap in a re-provisioned TOTP secret ciphertext.
    pub async fn replace_totp_ciphertext(&mut self, ciphertext: String) -> Result<()> {
        let previous = {
            let record = self.record.as_mut().ok_or(VaultError::NotSetup)?;
            std::mem::replace(&mut record.totp_secret_ciphertext, ciphertext)
        };
        if let Err(err) = self.persist().await {
            if let Some(record) = self.record.as_mut() {
                record.totp_secret_ciphertext = previous;
            }
            return Err(err);
        }
        Ok(())
    }

    pub fn find_by_id(&self, id: &str) -> Option<&StoredEntry> {
        self.record.as_ref()?.entries.iter().find(|e| e.id == id)
    }

    /// id/kind/name/username/pinned only; never ciphertext or plaintext.
    pub fn summaries(&self) -> Vec<EntrySummary> {
        self.record
            .as_ref()
            .map(|record| record.entries.iter().map(EntrySummary::from).collect())
            .unwrap_or_default()
    }

    async fn persist(&self) -> Result<()> {
        let record = self.record.as_ref().ok_or(VaultError::NotSetup)?;
        let serialized = serde_json::to_string(record)?;
        self.backend.set(VAULT_RECORD_KEY, &serialized).await?;
        debug!("vault record persisted ({} entries)", record.entries.len());
        Ok(())
    }
}
