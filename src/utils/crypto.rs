// src/utils/crypto.rs
//! Cryptographic utilities shared by signers and verifiers.
//!
//! Uses Keccak-256 for prehashing and secp256k1 ECDSA (via `k256`) for
//! signatures. Signing itself lives behind the [`Signer`](crate::wallet::signer::Signer)
//! trait; this module only hashes, wraps and verifies.

use crate::models::keys::{PublicKeyBytes, SignatureBytes};
use ethers::utils::keccak256;
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature, VerifyingKey};

/// Opening tag of the "this is not a transaction" envelope.
pub const BYTES_PREFIX: &[u8] = b"<Bytes>";
/// Closing tag of the "this is not a transaction" envelope.
pub const BYTES_POSTFIX: &[u8] = b"</Bytes>";

/// Computes a Keccak-256 hash of the input data.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}

/// Wraps a payload in the `<Bytes>...</Bytes>` envelope before signing.
///
/// A signature over the wrapped form can never double as a signature over an
/// extrinsic, and an extrinsic signature never verifies as a protocol
/// signature. The envelope is applied unconditionally.
pub fn wrap_bytes(payload: &[u8]) -> Vec<u8> {
    let mut wrapped = Vec::with_capacity(BYTES_PREFIX.len() + payload.len() + BYTES_POSTFIX.len());
    wrapped.extend_from_slice(BYTES_PREFIX);
    wrapped.extend_from_slice(payload);
    wrapped.extend_from_slice(BYTES_POSTFIX);
    wrapped
}

/// Verifies a compact ECDSA signature over `keccak256(message)`.
///
/// Returns `false` for keys that are not valid curve points and for
/// signatures that fail to parse, so callers can treat any failure as a
/// mismatch.
pub fn verify_signature(
    public_key: &PublicKeyBytes,
    message: &[u8],
    signature: &SignatureBytes,
) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(public_key.as_ref()) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature.as_ref()) else {
        return false;
    };
    verifying_key
        .verify_prehash(&hash_data(message), &signature)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_bytes_envelope() {
        let wrapped = wrap_bytes(&[1, 2, 3]);
        assert_eq!(&wrapped[..7], b"<Bytes>");
        assert_eq!(&wrapped[7..10], &[1, 2, 3]);
        assert_eq!(&wrapped[10..], b"</Bytes>");
    }

    #[test]
    fn test_keccak_known_vector() {
        // keccak256("") is a fixed Ethereum constant
        assert_eq!(
            ethers::utils::hex::encode(hash_data(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_verify_rejects_garbage_key() {
        let key = PublicKeyBytes([0u8; 33]);
        let sig = SignatureBytes([1u8; 64]);
        assert!(!verify_signature(&key, b"payload", &sig));
    }
}
