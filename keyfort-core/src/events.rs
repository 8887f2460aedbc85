//! Inbound commands and outbound events exchanged with the host UI.
//!
//! Both sides of the conversation are closed enums matched exhaustively by
//! the state machine, so adding a command or event is a compile-time
//! exercise. Field naming and framing beyond these serde derives is the
//! host's concern.

use serde::{Deserialize, Serialize};

use crate::vault::record::{EntryKind, EntrySummary};
use crate::vault::VaultState;

/// Commands issued by the host UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VaultCommand {
    /// The UI (re)loaded and wants the current state re-announced.
    Ready,
    ConfirmSetup {
        token: String,
        question: String,
        answer: String,
    },
    UnlockByTotp {
        token: String,
    },
    RequestRecovery,
    SubmitAnswer {
        answer: String,
    },
    CancelRecovery,
    ConfirmResetup {
        token: String,
    },
    BeginAddEntry,
    CancelAddEntry,
    AddEntry {
        kind: EntryKind,
        name: String,
        value: String,
        username: Option<String>,
    },
    ViewEntry {
        id: String,
    },
    CopyEntry {
        id: String,
    },
    DeleteEntry {
        id: String,
    },
    TogglePin {
        id: String,
    },
    Lock,
}

/// Events emitted to the host UI, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VaultEvent {
    StateChanged(VaultState),
    QrReady {
        data_url: String,
    },
    SecurityQuestion {
        question: String,
    },
    EntriesChanged {
        entries: Vec<EntrySummary>,
    },
    /// Single delivery of a decrypted value; the vault keeps no copy.
    EntryRevealed {
        id: String,
        value: String,
    },
    ActionAcknowledged {
        message: String,
    },
    Error {
        code: String,
        message: String,
    },
}

impl VaultCommand {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl VaultEvent {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
