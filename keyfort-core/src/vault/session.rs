//! Transient session state. Process-lifetime only, never persisted.

use crate::security::totp::TotpSecret;

/// Unlock/setup/recovery progress.
///
/// `pending_totp_secret` exists only between a begin-setup/recovery
/// transition and its confirming or abandoning one; the `Option` makes it
/// impossible to read a pending secret on a path that never produced one.
#[derive(Debug, Default)]
pub struct Session {
    pub unlocked: bool,
    pub pending_totp_secret: Option<TotpSecret>,
    /// Gate: a re-provisioning confirmation is only accepted after the
    /// recovery answer has been verified.
    pub recovery_in_progress: bool,
}

impl Session {
    /// Drop everything, including the pending secret (zeroized on drop).
    pub fn clear(&mut self) {
        self.unlocked = false;
        self.pending_totp_secret = None;
        self.recovery_in_progress = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_resets_all_fields() {
        let mut session = Session {
            unlocked: true,
            pending_totp_secret: Some(TotpSecret::generate()),
            recovery_in_progress: true,
        };
        session.clear();
        assert!(!session.unlocked);
        assert!(session.pending_totp_secret.is_none());
        assert!(!session.recovery_in_progress);
    }
}
