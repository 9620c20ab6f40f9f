//! Credential encryption-at-rest and verification.
//!
//! A private resource stores only `CredentialCiphertext`: base64 of
//! `nonce || AES-256-GCM(credential)`, keyed by HKDF over the process-wide
//! [`EncryptionSecret`]. There is no built-in fallback secret.

use crate::encryption::{constant_time_eq, EncryptionError, AES256GCM};
use crate::identifiers::PlaintextCredential;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

const KDF_SALT: &[u8] = b"sharelock.credential.v1";
const KDF_INFO: &[u8] = b"credential-encryption";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no encryption secret is configured")]
    MissingSecret,
    #[error("credential encryption failed: {0}")]
    Encryption(EncryptionError),
}

/// Operator-supplied secret used to derive the credential encryption key.
#[derive(Clone)]
pub struct EncryptionSecret(String);

impl EncryptionSecret {
    /// Accept a configured secret. Empty or whitespace-only values are treated
    /// as "not configured".
    pub fn new(value: impl Into<String>) -> Result<Self, CredentialError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(CredentialError::MissingSecret);
        }
        Ok(Self(value))
    }

    /// Parse an optional configuration value into a secret, dropping blanks.
    pub fn from_optional(value: Option<String>) -> Option<Self> {
        value.and_then(|v| Self::new(v).ok())
    }

    fn cipher(&self) -> Result<AES256GCM, CredentialError> {
        AES256GCM::derive(self.0.as_bytes(), KDF_SALT, KDF_INFO).map_err(CredentialError::Encryption)
    }
}

impl fmt::Debug for EncryptionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionSecret(<redacted>)")
    }
}

/// Stored, encrypted form of a credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialCiphertext(String);

impl CredentialCiphertext {
    pub fn from_encoded(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CredentialCiphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialCiphertext(..)")
    }
}

/// Encrypt a plaintext credential for storage.
pub fn encrypt(
    plaintext: &PlaintextCredential,
    secret: &EncryptionSecret,
) -> Result<CredentialCiphertext, CredentialError> {
    let sealed = secret
        .cipher()?
        .seal(plaintext.expose().as_bytes())
        .map_err(CredentialError::Encryption)?;
    Ok(CredentialCiphertext(STANDARD.encode(sealed)))
}

/// Check a supplied credential against stored ciphertext.
///
/// Any decoding or decryption failure is a plain `false`.
pub fn verify(supplied: &str, ciphertext: &CredentialCiphertext, secret: &EncryptionSecret) -> bool {
    let Ok(sealed) = STANDARD.decode(ciphertext.as_str()) else {
        return false;
    };
    let Ok(cipher) = secret.cipher() else {
        return false;
    };
    match cipher.open(&sealed) {
        Ok(stored) => constant_time_eq(supplied.as_bytes(), &stored),
        Err(_) => false,
    }
}

/// Credential operations bound to the process-wide secret, if any.
#[derive(Clone, Debug, Default)]
pub struct CredentialManager {
    secret: Option<EncryptionSecret>,
}

impl CredentialManager {
    pub fn new(secret: Option<EncryptionSecret>) -> Self {
        Self { secret }
    }

    /// Whether private registrations can be accepted.
    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn encrypt(
        &self,
        plaintext: &PlaintextCredential,
    ) -> Result<CredentialCiphertext, CredentialError> {
        let secret = self.secret.as_ref().ok_or(CredentialError::MissingSecret)?;
        encrypt(plaintext, secret)
    }

    /// `Err` only when no secret is configured; a wrong credential is `Ok(false)`.
    pub fn verify(
        &self,
        supplied: &str,
        ciphertext: &CredentialCiphertext,
    ) -> Result<bool, CredentialError> {
        let secret = self.secret.as_ref().ok_or(CredentialError::MissingSecret)?;
        Ok(verify(supplied, ciphertext, secret))
    }
}
