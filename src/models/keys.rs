// src/models/keys.rs
//! Primitive value types embedded in signed payloads.
//!
//! Keys, hashes and signatures are fixed-width byte arrays; their width is
//! part of the wire format and is checked at every parse boundary.

use crate::error::{ProtocolError, Result};
use crate::fixed_bytes_newtype;
use crate::utils::crypto::hash_data;
use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

fixed_bytes_newtype!(
    /// Compressed SEC1 secp256k1 public key (33 bytes).
    PublicKeyBytes,
    33
);

fixed_bytes_newtype!(
    /// Compact ECDSA signature, `r || s` (64 bytes).
    SignatureBytes,
    64
);

fixed_bytes_newtype!(
    /// Genesis hash of the chain instance a diploma is bound to (32 bytes).
    GenesisHash,
    32
);

/// Content address of an externally stored skill description.
///
/// Payloads never sign the id string itself, only [`ContentId::digest`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    /// Validates a content id.
    ///
    /// # Errors
    /// `MalformedInput` for an empty id or one containing a comma or
    /// whitespace, since ids travel as tokens of text lines.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::malformed("content id is empty"));
        }
        if trimmed.contains(',') || trimmed.contains(char::is_whitespace) {
            return Err(ProtocolError::malformed(format!(
                "content id '{}' contains a delimiter",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Keccak-256 digest committed in the private grant payload.
    pub fn digest(&self) -> [u8; 32] {
        hash_data(self.0.as_bytes())
    }
}

impl TryFrom<String> for ContentId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ContentId> for String {
    fn from(value: ContentId) -> Self {
        value.0
    }
}

impl FromStr for ContentId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token amount staked behind a diploma.
///
/// Arbitrary precision at the API; the wire field is 16 bytes, so amounts
/// beyond `u128::MAX` are rejected when encoded. Serialized as a decimal
/// string, never as a float.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Amount(pub BigUint);

impl Amount {
    /// Width of the amount field in signed payloads.
    pub const WIRE_LEN: usize = 16;

    /// Amount from a native integer.
    pub fn from_u128(value: u128) -> Self {
        Self(BigUint::from(value))
    }

    /// Little-endian encoding padded to [`Amount::WIRE_LEN`] bytes.
    pub fn to_wire_bytes(&self) -> Result<[u8; Self::WIRE_LEN]> {
        let le = self.0.to_bytes_le();
        if le.len() > Self::WIRE_LEN {
            return Err(ProtocolError::malformed(format!(
                "amount {} does not fit in {} bytes",
                self.0,
                Self::WIRE_LEN
            )));
        }
        let mut out = [0u8; Self::WIRE_LEN];
        out[..le.len()].copy_from_slice(&le);
        Ok(out)
    }
}

impl FromStr for Amount {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProtocolError::malformed(format!(
                "amount '{}' is not an unsigned integer",
                s
            )));
        }
        BigUint::parse_bytes(trimmed.as_bytes(), 10)
            .map(Self)
            .ok_or_else(|| ProtocolError::malformed(format!("amount '{}' is not a number", s)))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
