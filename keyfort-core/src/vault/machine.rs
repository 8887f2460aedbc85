//! The vault state machine.
//!
//! Sole entry point for every unlocking or mutating operation. It verifies
//! (TOTP token, security answer) and decrypts before any store mutation is
//! allowed, emits the event stream the host UI renders from, and never
//! exposes plaintext except through the explicit view/copy operations.
//!
//! Transitions are atomic: either {verify, mutate in-memory, persist} all
//! succeed and the new state is entered, or none take effect and the prior
//! state is retained.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, VaultError};
use crate::events::{VaultCommand, VaultEvent};
use crate::qr::QrRenderer;
use crate::security::crypto::{self, MasterKey};
use crate::security::totp::{self, TotpConfig, TotpSecret};
use crate::storage::{SecretStore, MASTER_KEY_KEY};
use crate::vault::record::{EntryKind, StoredEntry, VaultRecord};
use crate::vault::session::Session;
use crate::vault::store::VaultStore;

/// Where the vault is in its lifecycle.
///
/// `Setup → Unlocked ⇄ Locked`, with
/// `Locked → RecoveryPending → ResetupPending → Unlocked` as the alternate
/// unlock path and `Unlocked ⇄ AddingEntry` as a sub-flow. A vault that has
/// not been loaded yet has no state at all; [`VaultMachine::load`] performs
/// that first transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum VaultState {
    /// No (readable) vault record; first-time provisioning in progress.
    Setup,
    /// Vault exists but requires a TOTP token or the recovery path.
    Locked,
    /// Security question shown, awaiting the answer.
    RecoveryPending,
    /// Answer verified; a fresh TOTP secret awaits confirmation.
    ResetupPending,
    /// Entries readable and mutable.
    Unlocked,
    /// Entry form open; still authenticated.
    AddingEntry,
}

impl std::fmt::Display for VaultState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => write!(f, "Setup"),
            Self::Locked => write!(f, "Locked"),
            Self::RecoveryPending => write!(f, "RecoveryPending"),
            Self::ResetupPending => write!(f, "ResetupPending"),
            Self::Unlocked => write!(f, "Unlocked"),
            Self::AddingEntry => write!(f, "AddingEntry"),
        }
    }
}

pub struct VaultMachine {
    state: VaultState,
    master_key: MasterKey,
    store: VaultStore,
    session: Session,
    qr: Arc<dyn QrRenderer>,
    events: mpsc::Sender<VaultEvent>,
    config: TotpConfig,
    account_label: Option<String>,
}

impl VaultMachine {
    /// Load (or initialize) the vault from the secret store.
    ///
    /// The master key is generated and persisted on first run. A missing or
    /// unreadable vault record lands in [`VaultState::Setup`] with a fresh
    /// pending TOTP secret; a readable one lands in [`VaultState::Locked`].
    /// The key and the record are tolerated independently absent: a lost
    /// key with a surviving record still loads, and the recovery path can
    /// re-provision the TOTP secret under the fresh key.
    pub async fn load(
        backend: Arc<dyn SecretStore>,
        qr: Arc<dyn QrRenderer>,
        events: mpsc::Sender<VaultEvent>,
    ) -> Result<Self> {
        Self::load_with(backend, qr, events, TotpConfig::default(), None).await
    }

    /// [`load`](Self::load) with an explicit token configuration and
    /// account label for provisioning URIs.
    pub async fn load_with(
        backend: Arc<dyn SecretStore>,
        qr: Arc<dyn QrRenderer>,
        events: mpsc::Sender<VaultEvent>,
        config: TotpConfig,
        account_label: Option<String>,
    ) -> Result<Self> {
        let master_key = match backend.get(MASTER_KEY_KEY).await? {
            Some(key) => MasterKey::from_string(key),
            None => {
                let key = MasterKey::generate();
                backend.set(MASTER_KEY_KEY, key.as_str()).await?;
                info!("generated new master key");
                key
            }
        };

        let mut store = VaultStore::new(backend);
        store.load().await?;

        let mut machine = Self {
            state: VaultState::Locked,
            master_key,
            store,
            session: Session::default(),
            qr,
            events,
            config,
            account_label,
        };

        if machine.store.is_present() {
            info!("vault loaded, locked");
            machine.emit(VaultEvent::StateChanged(VaultState::Locked)).await;
        } else {
            machine.enter_setup().await?;
        }
        Ok(machine)
    }

    pub fn state(&self) -> VaultState {
        self.state
    }

    /// Run one command, converting any failure into an `Error` event.
    /// Errors are terminal to the offending command only.
    pub async fn dispatch(&mut self, command: VaultCommand) {
        if let Err(err) = self.apply(command).await {
            warn!("command rejected: {} ({})", err, err.code());
            self.emit(VaultEvent::Error {
                code: err.code().to_string(),
                message: err.to_string(),
            })
            .await;
        }
    }

    async fn apply(&mut self, command: VaultCommand) -> Result<()> {
        match command {
            VaultCommand::Ready => self.resync().await,
            VaultCommand::ConfirmSetup {
                token,
                question,
                answer,
            } => self.confirm_setup(&token, &question, &answer).await,
            VaultCommand::UnlockByTotp { token } => self.unlock_by_totp(&token).await,
            VaultCommand::RequestRecovery => self.request_recovery().await,
            VaultCommand::SubmitAnswer { answer } => self.submit_answer(&answer).await,
            VaultCommand::CancelRecovery => self.cancel_recovery().await,
            VaultCommand::ConfirmResetup { token } => self.confirm_resetup(&token).await,
            VaultCommand::BeginAddEntry => self.begin_add_entry().await,
            VaultCommand::CancelAddEntry => self.cancel_add_entry().await,
            VaultCommand::AddEntry {
                kind,
                name,
                value,
                username,
            } => self.add_entry(kind, &name, &value, username.as_deref()).await,
            VaultCommand::ViewEntry { id } => self.view_entry(&id).await.map(|_| ()),
            VaultCommand::CopyEntry { id } => self.copy_entry(&id).await.map(|_| ()),
            VaultCommand::DeleteEntry { id } => self.delete_entry(&id).await,
            VaultCommand::TogglePin { id } => self.toggle_pin(&id).await,
            VaultCommand::Lock => self.lock().await,
        }
    }

    /// Re-announce the current state to a (re)loaded UI. Mutates nothing
    /// and never touches persistence.
    pub async fn resync(&mut self) -> Result<()> {
        match self.state {
            VaultState::Setup | VaultState::ResetupPending => {
                let data_url = self.render_pending_qr().await?;
                self.emit(VaultEvent::StateChanged(self.state)).await;
                self.emit(VaultEvent::QrReady { data_url }).await;
            }
            VaultState::Locked => {
                self.emit(VaultEvent::StateChanged(VaultState::Locked)).await;
            }
            VaultState::RecoveryPending => {
                let question = self
                    .store
                    .record()
                    .ok_or(VaultError::NotSetup)?
                    .security_question
                    .clone();
                self.emit(VaultEvent::SecurityQuestion { question }).await;
                self.emit(VaultEvent::StateChanged(VaultState::RecoveryPending)).await;
            }
            VaultState::Unlocked | VaultState::AddingEntry => {
                self.emit(VaultEvent::StateChanged(self.state)).await;
                self.emit_entries().await;
            }
        }
        Ok(())
    }

    /// Finish first-time provisioning.
    ///
    /// Checks run before anything is persisted; a failed persistence
    /// handoff leaves the machine in `Setup` with the pending secret
    /// intact so the user can retry.
    pub async fn confirm_setup(&mut self, token: &str, question: &str, answer: &str) -> Result<()> {
        if self.state != VaultState::Setup {
            return Err(VaultError::State { state: self.state });
        }
        let pending = self
            .session
            .pending_totp_secret
            .as_ref()
            .ok_or(VaultError::State { state: self.state })?;

        if !totp::verify(token, pending, &self.config) {
            return Err(VaultError::Authentication);
        }
        let question = question.trim();
        if question.is_empty() || answer.trim().is_empty() {
            return Err(VaultError::Validation(
                "security question and answer are required".into(),
            ));
        }

        let salt = crypto::generate_salt();
        let record = VaultRecord {
            totp_secret_ciphertext: crypto::encrypt(pending.as_str(), &self.master_key)?,
            security_question: question.to_string(),
            security_answer_hash: crypto::hash_answer(answer, &salt),
            security_answer_salt: salt,
            entries: Vec::new(),
        };
        self.store.install(record).await?;

        self.session.pending_totp_secret = None;
        self.session.unlocked = true;
        self.state = VaultState::Unlocked;
        info!("vault configured");

        self.emit(VaultEvent::StateChanged(VaultState::Unlocked)).await;
        self.emit_entries().await;
        self.emit(VaultEvent::ActionAcknowledged {
            message: "Vault configured".into(),
        })
        .await;
        Ok(())
    }

    /// Unlock with a TOTP token against the stored (decrypted) secret.
    pub async fn unlock_by_totp(&mut self, token: &str) -> Result<()> {
        if self.state != VaultState::Locked {
            return Err(VaultError::State { state: self.state });
        }
        let secret = self.stored_totp_secret()?;
        if !totp::verify(token, &secret, &self.config) {
            return Err(VaultError::Authentication);
        }

        self.session.unlocked = true;
        self.state = VaultState::Unlocked;
        info!("vault unlocked");

        self.emit(VaultEvent::StateChanged(VaultState::Unlocked)).await;
        self.emit_entries().await;
        Ok(())
    }

    /// Expose the stored security question and await the answer.
    pub async fn request_recovery(&mut self) -> Result<()> {
        if self.state != VaultState::Locked {
            return Err(VaultError::State { state: self.state });
        }
        let question = self
            .store
            .record()
            .ok_or(VaultError::NotSetup)?
            .security_question
            .clone();

        self.state = VaultState::RecoveryPending;
        debug!("recovery requested");

        self.emit(VaultEvent::SecurityQuestion { question }).await;
        self.emit(VaultEvent::StateChanged(VaultState::RecoveryPending)).await;
        Ok(())
    }

    /// Verify the recovery answer. Success moves on to re-provisioning a
    /// fresh TOTP secret; the old secret is never disclosed either way.
    pub async fn submit_answer(&mut self, answer: &str) -> Result<()> {
        if self.state != VaultState::RecoveryPending {
            return Err(VaultError::State { state: self.state });
        }
        {
            let record = self.store.record().ok_or(VaultError::NotSetup)?;
            if !crypto::verify_answer(
                answer,
                &record.security_answer_hash,
                &record.security_answer_salt,
            ) {
                return Err(VaultError::Authentication);
            }
        }

        self.session.pending_totp_secret = Some(TotpSecret::generate());
        self.session.recovery_in_progress = true;
        let data_url = self.render_pending_qr().await?;
        self.state = VaultState::ResetupPending;
        info!("recovery answer accepted, awaiting new authenticator");

        self.emit(VaultEvent::StateChanged(VaultState::ResetupPending)).await;
        self.emit(VaultEvent::QrReady { data_url }).await;
        Ok(())
    }

    /// Abandon recovery/re-provisioning; the previous TOTP secret stays in
    /// force and the vault returns to `Locked`.
    pub async fn cancel_recovery(&mut self) -> Result<()> {
        if !matches!(
            self.state,
            VaultState::RecoveryPending | VaultState::ResetupPending
        ) {
            return Err(VaultError::State { state: self.state });
        }
        self.session.clear();
        self.state = VaultState::Locked;
        debug!("recovery cancelled");
        self.emit(VaultEvent::StateChanged(VaultState::Locked)).await;
        Ok(())
    }

    /// Confirm the re-provisioned TOTP secret and unlock.
    ///
    /// Gated on the recovery flag so an out-of-order confirmation is
    /// rejected even if a pending secret exists. A failed persistence
    /// handoff keeps the previous ciphertext and stays in
    /// `ResetupPending` for retry.
    pub async fn confirm_resetup(&mut self, token: &str) -> Result<()> {
        if self.state != VaultState::ResetupPending {
            return Err(VaultError::State { state: self.state });
        }
        if !self.session.recovery_in_progress {
            return Err(VaultError::State { state: self.state });
        }
        let pending = self
            .session
            .pending_totp_secret
            .as_ref()
            .ok_or(VaultError::State { state: self.state })?;
        if !totp::verify(token, pending, &self.config) {
            return Err(VaultError::Authentication);
        }

        let ciphertext = crypto::encrypt(pending.as_str(), &self.master_key)?;
        self.store.replace_totp_ciphertext(ciphertext).await?;

        self.session.pending_totp_secret = None;
        self.session.recovery_in_progress = false;
        self.session.unlocked = true;
        self.state = VaultState::Unlocked;
        info!("authenticator re-provisioned, vault unlocked");

        self.emit(VaultEvent::StateChanged(VaultState::Unlocked)).await;
        self.emit_entries().await;
        self.emit(VaultEvent::ActionAcknowledged {
            message: "Authenticator reconfigured".into(),
        })
        .await;
        Ok(())
    }

    /// Open the add-entry sub-flow.
    pub async fn begin_add_entry(&mut self) -> Result<()> {
        if self.state != VaultState::Unlocked {
            return Err(VaultError::State { state: self.state });
        }
        self.state = VaultState::AddingEntry;
        self.emit(VaultEvent::StateChanged(VaultState::AddingEntry)).await;
        Ok(())
    }

    /// Close the add-entry sub-flow without adding.
    pub async fn cancel_add_entry(&mut self) -> Result<()> {
        if self.state != VaultState::AddingEntry {
            return Err(VaultError::State { state: self.state });
        }
        self.state = VaultState::Unlocked;
        self.emit(VaultEvent::StateChanged(VaultState::Unlocked)).await;
        Ok(())
    }

    /// Encrypt and store a new entry.
    pub async fn add_entry(
        &mut self,
        kind: EntryKind,
        name: &str,
        value: &str,
        username: Option<&str>,
    ) -> Result<()> {
        self.ensure_unlocked()?;

        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::Validation("a name is required".into()));
        }
        if value.trim().is_empty() {
            return Err(VaultError::Validation("a value is required".into()));
        }
        let username = match kind {
            EntryKind::Login => {
                let username = username.map(str::trim).unwrap_or("");
                if username.is_empty() {
                    return Err(VaultError::Validation(
                        "a username is required for logins".into(),
                    ));
                }
                Some(username.to_string())
            }
            _ => None,
        };

        let ciphertext = crypto::encrypt(value, &self.master_key)?;
        let entry = StoredEntry::new(kind, name, ciphertext, username);
        let message = format!("\"{}\" saved", entry.name);
        self.store.add_entry(entry).await?;
        debug!("entry added ({})", kind);

        if self.state == VaultState::AddingEntry {
            self.state = VaultState::Unlocked;
            self.emit(VaultEvent::StateChanged(VaultState::Unlocked)).await;
        }
        self.emit_entries().await;
        self.emit(VaultEvent::ActionAcknowledged { message }).await;
        Ok(())
    }

    /// Decrypt one entry on demand.
    ///
    /// The plaintext is delivered exactly once (return value + event) and
    /// not cached; any display expiry is the caller's concern.
    pub async fn view_entry(&mut self, id: &str) -> Result<String> {
        self.ensure_unlocked()?;
        let value = self.decrypt_entry(id)?;
        self.emit(VaultEvent::EntryRevealed {
            id: id.to_string(),
            value: value.clone(),
        })
        .await;
        Ok(value)
    }

    /// Decrypt one entry for the host's clipboard flow. Same single-delivery
    /// contract as [`view_entry`](Self::view_entry); the clipboard itself
    /// belongs to the host.
    pub async fn copy_entry(&mut self, id: &str) -> Result<String> {
        self.ensure_unlocked()?;
        let value = self.decrypt_entry(id)?;
        self.emit(VaultEvent::EntryRevealed {
            id: id.to_string(),
            value: value.clone(),
        })
        .await;
        self.emit(VaultEvent::ActionAcknowledged {
            message: "Copied".into(),
        })
        .await;
        Ok(value)
    }

    /// Remove an entry.
    pub async fn delete_entry(&mut self, id: &str) -> Result<()> {
        self.ensure_unlocked()?;
        let removed = self.store.remove_entry(id).await?;
        self.emit_entries().await;
        self.emit(VaultEvent::ActionAcknowledged {
            message: format!("\"{}\" deleted", removed.name),
        })
        .await;
        Ok(())
    }

    /// Flip an entry's pinned flag.
    pub async fn toggle_pin(&mut self, id: &str) -> Result<()> {
        self.ensure_unlocked()?;
        self.store.toggle_pinned(id).await?;
        self.emit_entries().await;
        Ok(())
    }

    /// Lock the vault: clear the session including any pending secret.
    /// Entries remain encrypted at rest; nothing about them survives in
    /// the cleared session.
    pub async fn lock(&mut self) -> Result<()> {
        if !self.store.is_present() {
            return Err(VaultError::NotSetup);
        }
        self.session.clear();
        self.state = VaultState::Locked;
        info!("vault locked");
        self.emit(VaultEvent::StateChanged(VaultState::Locked)).await;
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Re-checked at call time by every entry-mutating or entry-revealing
    /// operation; a lock can land between queued UI actions.
    fn ensure_unlocked(&self) -> Result<()> {
        if self.session.unlocked
            && matches!(self.state, VaultState::Unlocked | VaultState::AddingEntry)
        {
            Ok(())
        } else {
            Err(VaultError::State { state: self.state })
        }
    }

    fn stored_totp_secret(&self) -> Result<TotpSecret> {
        let record = self.store.record().ok_or(VaultError::NotSetup)?;
        let secret = crypto::decrypt(&record.totp_secret_ciphertext, &self.master_key)?;
        Ok(TotpSecret::from_base32(secret))
    }

    fn decrypt_entry(&self, id: &str) -> Result<String> {
        let entry = self
            .store
            .find_by_id(id)
            .ok_or_else(|| VaultError::EntryNotFound(id.to_string()))?;
        crypto::decrypt(&entry.ciphertext, &self.master_key)
    }

    async fn enter_setup(&mut self) -> Result<()> {
        self.session.clear();
        self.session.pending_totp_secret = Some(TotpSecret::generate());
        let data_url = self.render_pending_qr().await?;
        self.state = VaultState::Setup;
        info!("no vault record, entering setup");

        self.emit(VaultEvent::StateChanged(VaultState::Setup)).await;
        self.emit(VaultEvent::QrReady { data_url }).await;
        Ok(())
    }

    async fn render_pending_qr(&self) -> Result<String> {
        let pending = self
            .session
            .pending_totp_secret
            .as_ref()
            .ok_or(VaultError::State { state: self.state })?;
        let uri = totp::provisioning_uri(pending, self.account_label.as_deref(), &self.config);
        Ok(self.qr.render(&uri).await?)
    }

    async fn emit_entries(&self) {
        self.emit(VaultEvent::EntriesChanged {
            entries: self.store.summaries(),
        })
        .await;
    }

    async fn emit(&self, event: VaultEvent) {
        // Receiver gone means the host UI is shutting down; nothing to do
        let _ = self.events.send(event).await;
    }
}
