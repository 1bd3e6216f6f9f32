//! Credential fingerprints.
//!
//! Credentials are bearer secrets. Anything that needs to remember *which*
//! credential failed (so it is not retried) keeps a SHA-256 fingerprint
//! instead of the secret itself, and logs only a short prefix of that.

use std::fmt;

use sha2::{Digest, Sha256};

/// SHA-256 digest of a credential.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CredentialFingerprint([u8; 32]);

impl CredentialFingerprint {
    /// Fingerprints `credential`.
    pub fn of(credential: &str) -> Self {
        Self(Sha256::digest(credential.as_bytes()).into())
    }

    /// Whether `credential` has this fingerprint.
    pub fn matches(&self, credential: &str) -> bool {
        *self == Self::of(credential)
    }

    /// The raw digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for CredentialFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

// Debug shows a prefix only; it ends up in log lines.
impl fmt::Debug for CredentialFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialFingerprint(")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "…)")
    }
}
