//! Persisted vault data model.
//!
//! `VaultRecord` is serialized to JSON and handed to the secret store as an
//! opaque string. Entry values and the TOTP secret are encrypted before they
//! reach this layer; the security question, answer digest, and salt are
//! non-secret metadata needed for the recovery flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::security::crypto;

/// What kind of secret an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    ApiKey,
    Login,
    Note,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey => write!(f, "api-key"),
            Self::Login => write!(f, "login"),
            Self::Note => write!(f, "note"),
        }
    }
}

/// One secret held in the vault.
///
/// For `login` entries the username lives in plaintext alongside the
/// ciphertext so listings stay searchable; only the password crosses the
/// ciphertext boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub id: String,
    pub kind: EntryKind,
    pub name: String,
    pub ciphertext: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
}

impl StoredEntry {
    pub fn new(kind: EntryKind, name: &str, ciphertext: String, username: Option<String>) -> Self {
        Self {
            id: crypto::generate_entry_id(),
            kind,
            name: name.to_string(),
            ciphertext,
            username,
            pinned: false,
            created_at: Utc::now(),
        }
    }
}

/// The persisted aggregate. Exists iff setup has completed; its absence is
/// the sentinel for "needs setup".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultRecord {
    /// TOTP secret, encrypted under the master key.
    pub totp_secret_ciphertext: String,
    /// Plaintext prompt shown during recovery.
    pub security_question: String,
    /// hex(SHA-256(salt || normalized answer))
    pub security_answer_hash: String,
    /// Unique per vault.
    pub security_answer_salt: String,
    /// Insertion order preserved for stable display.
    #[serde(default)]
    pub entries: Vec<StoredEntry>,
}

/// Listing projection: carries no ciphertext or plaintext field at all, so
/// a listing cannot leak a secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub id: String,
    pub kind: EntryKind,
    pub name: String,
    pub username: Option<String>,
    pub pinned: bool,
}

impl From<&StoredEntry> for EntrySummary {
    fn from(entry: &StoredEntry) -> Self {
        Self {
            id: entry.id.clone(),
            kind: entry.kind,
            name: entry.name.clone(),
            username: entry.username.clone(),
            pinned: entry.pinned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> VaultRecord {
        VaultRecord {
            totp_secret_ciphertext: "AAAA".into(),
            security_question: "First pet?".into(),
            security_answer_hash: "ab".into(),
            security_answer_salt: "cd".into(),
            entries: vec![StoredEntry::new(
                EntryKind::Login,
                "Mail",
                "BBBB".into(),
                Some("user@example.com".into()),
            )],
        }
    }

    #[test]
    fn test_record_json_roundtrip() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        let parsed: VaultRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.security_question, record.security_question);
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].id, record.entries[0].id);
        assert_eq!(parsed.entries[0].kind, EntryKind::Login);
    }

    #[test]
    fn test_entry_kind_wire_form_is_kebab_case() {
        assert_eq!(
            serde_json::to_string(&EntryKind::ApiKey).unwrap(),
            "\"api-key\""
        );
        assert_eq!(
            serde_json::from_str::<EntryKind>("\"note\"").unwrap(),
            EntryKind::Note
        );
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let json = r#"{
            "totp_secret_ciphertext": "AAAA",
            "security_question": "q",
            "security_answer_hash": "h",
            "security_answer_salt": "s"
        }"#;
        let parsed: VaultRecord = serde_json::from_str(json).unwrap();
        assert!(parsed.entries.is_empty());

        let entry_json = r#"{
            "id": "1",
            "kind": "note",
            "name": "n",
            "ciphertext": "CCCC",
            "created_at": "2026-01-01T00:00:00Z"
        }"#;
        let entry: StoredEntry = serde_json::from_str(entry_json).unwrap();
        assert!(!entry.pinned);
        assert!(entry.username.is_none());
    }

    #[test]
    fn test_summary_projection() {
        let record = sample_record();
        let summary = EntrySummary::from(&record.entries[0]);
        assert_eq!(summary.id, record.entries[0].id);
        assert_eq!(summary.username.as_deref(), Some("user@example.com"));
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("BBBB"), "summaries never carry ciphertext");
    }
}
