//! Symmetric encryption for Sharelock
//!
//! AES-256-GCM sealing with a random nonce prepended to the ciphertext,
//! and HKDF-SHA256 key derivation from an operator-supplied secret.

use rand_core::{OsRng, RngCore};

/// Length of the AES-GCM nonce prepended to sealed payloads.
pub const NONCE_LEN: usize = 12;

/// Length of the AES-GCM authentication tag.
pub const TAG_LEN: usize = 16;

/// Encryption error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionError {
    InvalidKey,
    InvalidCiphertext,
    EncryptionFailed,
    DecryptionFailed,
}

impl std::fmt::Display for EncryptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncryptionError::InvalidKey => write!(f, "Invalid encryption key"),
            EncryptionError::InvalidCiphertext => write!(f, "Invalid ciphertext"),
            EncryptionError::EncryptionFailed => write!(f, "Encryption failed"),
            EncryptionError::DecryptionFailed => write!(f, "Decryption failed"),
        }
    }
}

impl std::error::Error for EncryptionError {}

/// AES-256-GCM encryption implementation
pub struct AES256GCM {
    key: [u8; 32],
}

impl AES256GCM {
    /// Create a new AES-256-GCM instance
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Derive the cipher key from secret material using HKDF-SHA256
    pub fn derive(secret: &[u8], salt: &[u8], info: &[u8]) -> Result<Self, EncryptionError> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), secret);
        let mut key = [0u8; 32];
        hk.expand(info, &mut key)
            .map_err(|_| EncryptionError::InvalidKey)?;
        Ok(Self::new(key))
    }

    /// Encrypt data
    pub fn encrypt(&self, plaintext: &[u8], nonce: &[u8; NONCE_LEN]) -> Result<Vec<u8>, EncryptionError> {
        use aes_gcm::aead::{Aead, KeyInit};
        use aes_gcm::{Aes256Gcm, Key, Nonce};

        let key = Key::<Aes256Gcm>::from_slice(&self.key);
        let cipher = Aes256Gcm::new(key);
        let nonce = Nonce::from_slice(nonce);

        cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| EncryptionError::EncryptionFailed)
    }

    /// Decrypt data
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8; NONCE_LEN]) -> Result<Vec<u8>, EncryptionError> {
        use aes_gcm::aead::{Aead, KeyInit};
        use aes_gcm::{Aes256Gcm, Key, Nonce};

        let key = Key::<Aes256Gcm>::from_slice(&self.key);
        let cipher = Aes256Gcm::new(key);
        let nonce = Nonce::from_slice(nonce);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| EncryptionError::DecryptionFailed)
    }

    /// Encrypt under a fresh random nonce, returning `nonce || ciphertext`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let nonce = Self::generate_nonce();
        let ciphertext = self.encrypt(plaintext, &nonce)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Reverse of [`AES256GCM::seal`].
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(EncryptionError::InvalidCiphertext);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let mut nonce_array = [0u8; NONCE_LEN];
        nonce_array.copy_from_slice(nonce);
        self.decrypt(ciphertext, &nonce_array)
    }

    /// Generate a random nonce
    pub fn generate_nonce() -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }
}

/// Compare two byte strings without an early exit on the first differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}
