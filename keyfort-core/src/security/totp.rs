//! Time-based one-time passcode generation and verification (RFC 4226/6238).
//!
//! Secrets are 160-bit random values carried as unpadded base32. Verification
//! is a boolean decision: every internal fault (malformed secret, malformed
//! token, clock before epoch) is converted to `false`, never an error the
//! caller has to handle.

use std::time::{SystemTime, UNIX_EPOCH};

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha1 = Hmac<Sha1>;

/// Fixed issuer label baked into provisioning URIs.
pub const ISSUER: &str = "Keyfort";

/// Account label used when the host does not supply one.
pub const DEFAULT_ACCOUNT: &str = "developer";

/// Secret size in bytes before base32 encoding (160 bits, RFC 4226 §4).
const SECRET_LEN: usize = 20;

/// A base32-encoded shared TOTP secret.
///
/// Zeroizes on drop; `Debug` never prints the material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TotpSecret(String);

impl TotpSecret {
    /// Generate a fresh random secret.
    pub fn generate() -> Self {
        use rand::RngCore;

        let mut bytes = [0u8; SECRET_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self(BASE32_NOPAD.encode(&bytes))
    }

    /// Wrap an existing base32 secret (e.g. decrypted from the vault).
    pub fn from_base32(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TotpSecret").field(&"[REDACTED]").finish()
    }
}

/// Token parameters. The drift window is configuration, not dogma:
/// ±1 step is the conventional default.
#[derive(Debug, Clone, Copy)]
pub struct TotpConfig {
    /// Token length; 6 or 8 digits.
    pub digits: u32,
    /// Time-step length in seconds.
    pub period_secs: u64,
    /// Steps of clock drift tolerated on either side of now.
    pub skew_steps: u64,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            digits: 6,
            period_secs: 30,
            skew_steps: 1,
        }
    }
}

/// Build the `otpauth://totp/...` URI consumed by the QR collaborator.
///
/// A blank or missing account label falls back to [`DEFAULT_ACCOUNT`].
pub fn provisioning_uri(secret: &TotpSecret, account: Option<&str>, config: &TotpConfig) -> String {
    let account = account
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(DEFAULT_ACCOUNT);

    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits={digits}&period={period}",
        issuer = escape_label(ISSUER),
        account = escape_label(account),
        secret = secret.as_str(),
        digits = config.digits,
        period = config.period_secs,
    )
}

/// Percent-escape everything outside the RFC 3986 unreserved set.
fn escape_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for byte in label.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Verify a token against the current wall clock.
pub fn verify(token: &str, secret: &TotpSecret, config: &TotpConfig) -> bool {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(now) => verify_at(token, secret, config, now.as_secs()),
        Err(_) => false,
    }
}

/// Verify a token at an explicit unix timestamp.
///
/// Accepts the token if it matches any time step within
/// `now ± skew_steps`. Comparison is constant-time per candidate.
pub fn verify_at(token: &str, secret: &TotpSecret, config: &TotpConfig, unix_time: u64) -> bool {
    let token = token.trim();
    if token.len() != config.digits as usize || !token.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let key = match decode_secret(secret.as_str()) {
        Some(key) => key,
        None => return false,
    };
    if config.period_secs == 0 {
        return false;
    }

    let current_step = unix_time / config.period_secs;
    let skew = config.skew_steps;
    let mut matched = false;
    for step in current_step.saturating_sub(skew)..=current_step.saturating_add(skew) {
        if let Some(candidate) = hotp(&key, step, config.digits) {
            // Non-short-circuiting so every candidate costs the same
            matched |= bool::from(candidate.as_bytes().ct_eq(token.as_bytes()));
        }
    }
    matched
}

/// The code for a secret at an explicit unix timestamp.
///
/// `None` on a malformed secret or unsupported digit count. Exposed for
/// hosts that display the current code and for deterministic tests.
pub fn code_at(secret: &TotpSecret, config: &TotpConfig, unix_time: u64) -> Option<String> {
    if config.period_secs == 0 {
        return None;
    }
    let key = decode_secret(secret.as_str())?;
    hotp(&key, unix_time / config.period_secs, config.digits)
}

/// RFC 4226 §5.3: HMAC-SHA-1 over the big-endian counter, dynamic
/// truncation, modulo 10^digits.
fn hotp(key: &[u8], counter: u64, digits: u32) -> Option<String> {
    if !(6..=8).contains(&digits) {
        return None;
    }

    let mut mac = HmacSha1::new_from_slice(key).ok()?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    let code = binary % 10u32.pow(digits);
    Some(format!("{:0width$}", code, width = digits as usize))
}

/// Decode a base32 secret, tolerating whitespace and lowercase input.
fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let normalized: String = secret
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .map(|ch| ch.to_ascii_uppercase())
        .collect();
    if normalized.is_empty() {
        return None;
    }
    BASE32_NOPAD.decode(normalized.as_bytes()).ok()
}
