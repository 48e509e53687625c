// src/utils/serialization.rs
//! Serialization utilities for the diploma system.
//!
//! Provides:
//! - JSON helpers used by the storage and backup layers
//! - `0x`-prefixed hex encoding shared by keys, hashes and signatures
//! - [`fixed_bytes_newtype!`], which gives fixed-width byte arrays a hex
//!   string representation in JSON and in the QR text format

use ethers::utils::hex;
use serde::{Deserialize, Serialize};

/// Serializes a value to a JSON string.
pub fn serialize<T: Serialize>(data: &T) -> std::result::Result<String, serde_json::Error> {
    serde_json::to_string(data)
}

/// Deserializes a value from a JSON string.
pub fn deserialize<'a, T: Deserialize<'a>>(data: &'a str) -> std::result::Result<T, serde_json::Error> {
    serde_json::from_str(data)
}

/// Encodes bytes as lowercase hex with a `0x` prefix.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decodes hex with or without a `0x` prefix.
pub fn from_hex(text: &str) -> std::result::Result<Vec<u8>, String> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits).map_err(|e| format!("invalid hex '{}': {}", text, e))
}

/// Decodes hex into an array of exactly `N` bytes.
pub fn from_hex_fixed<const N: usize>(text: &str) -> std::result::Result<[u8; N], String> {
    let bytes = from_hex(text)?;
    <[u8; N]>::try_from(bytes.as_slice())
        .map_err(|_| format!("expected {} bytes, got {}", N, bytes.len()))
}

/// Declares a fixed-width byte newtype that (de)serializes as `0x` hex.
///
/// The generated type implements `FromStr`, `Display`, `TryFrom<&[u8]>`,
/// `AsRef<[u8]>` and serde's `Serialize`/`Deserialize`.
#[macro_export]
macro_rules! fixed_bytes_newtype {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                $crate::utils::serialization::to_hex(&self.0)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = $crate::error::ProtocolError;

            fn try_from(bytes: &[u8]) -> std::result::Result<Self, Self::Error> {
                <[u8; $len]>::try_from(bytes).map(Self).map_err(|_| {
                    $crate::error::ProtocolError::MalformedInput(format!(
                        "{} must be {} bytes, got {}",
                        stringify!($name),
                        $len,
                        bytes.len()
                    ))
                })
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::ProtocolError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                $crate::utils::serialization::from_hex_fixed::<$len>(s)
                    .map(Self)
                    .map_err(|e| {
                        $crate::error::ProtocolError::MalformedInput(format!(
                            "{}: {}",
                            stringify!($name),
                            e
                        ))
                    })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let text = <String as serde::Deserialize>::deserialize(deserializer)?;
                text.parse::<Self>().map_err(serde::de::Error::custom)
            }
        }
    };
}
