//! Identifier and credential generation.
//!
//! Both values are drawn from the operating system CSPRNG. A failing entropy
//! source panics inside `OsRng`; there is no local recovery from that.

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of random bytes behind a resource identifier.
pub const RESOURCE_ID_LEN: usize = 16;

/// Number of random bytes behind a plaintext credential.
pub const CREDENTIAL_LEN: usize = 16;

/// Opaque identifier of a registered resource.
///
/// Rendered as lowercase hex everywhere it leaves the process (JSON, URLs,
/// QR payloads).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId([u8; RESOURCE_ID_LEN]);

impl ResourceId {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; RESOURCE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; RESOURCE_ID_LEN] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self, String> {
        if hex_str.len() != RESOURCE_ID_LEN * 2 {
            return Err(format!(
                "ResourceId hex must be {} characters, got {}",
                RESOURCE_ID_LEN * 2,
                hex_str.len()
            ));
        }
        let mut arr = [0u8; RESOURCE_ID_LEN];
        hex::decode_to_slice(hex_str, &mut arr).map_err(|e| format!("Invalid hex: {e}"))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.to_hex())
    }
}

impl FromStr for ResourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// Credential handed to the creator of a private resource, exactly once.
///
/// Never persisted; only its ciphertext is stored.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PlaintextCredential(String);

impl PlaintextCredential {
    /// Wrap an existing credential string (e.g. the one a client supplied).
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume into the secret value.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for PlaintextCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PlaintextCredential(<redacted>)")
    }
}

/// Generate a fresh resource identifier.
pub fn new_resource_id() -> ResourceId {
    let mut bytes = [0u8; RESOURCE_ID_LEN];
    OsRng.fill_bytes(&mut bytes);
    ResourceId(bytes)
}

/// Generate a fresh plaintext credential, independent of any identifier.
pub fn new_credential() -> PlaintextCredential {
    let mut bytes = [0u8; CREDENTIAL_LEN];
    OsRng.fill_bytes(&mut bytes);
    PlaintextCredential(hex::encode(bytes))
}
