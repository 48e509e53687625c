// src/encoding/payload.rs
//! Canonical byte payloads signed by referees and workers.
//!
//! This is the only place the wire layout is defined. Signer and verifier both
//! call these functions, so the layout is never re-derived at a call site.
//!
//! ```text
//! private data = skill_digest[32] ‖ receipt
//! receipt      = genesis[32] ‖ letter_number u32 LE ‖ expiry_block u64 LE
//!                ‖ referee[33] ‖ worker[33] ‖ amount u128 LE
//! insurance    = receipt ‖ referee_sign_over_receipt[64] ‖ employer[33]
//! ```
//!
//! Every field has a fixed width, so distinct inputs always produce distinct
//! bytes. The functions are pure: no clocks, no hidden state.

use crate::error::Result;
use crate::models::keys::{Amount, ContentId, GenesisHash, PublicKeyBytes, SignatureBytes};
use crate::models::letter::Receipt;

/// Length of an encoded receipt.
pub const RECEIPT_LEN: usize =
    GenesisHash::LEN + 4 + 8 + PublicKeyBytes::LEN + PublicKeyBytes::LEN + Amount::WIRE_LEN;

/// Length of encoded private grant data.
pub const PRIVATE_DATA_LEN: usize = 32 + RECEIPT_LEN;

/// Length of an encoded insurance payload.
pub const INSURANCE_LEN: usize = RECEIPT_LEN + SignatureBytes::LEN + PublicKeyBytes::LEN;

fn put_receipt(out: &mut Vec<u8>, receipt: &Receipt) -> Result<()> {
    let amount = receipt.amount.to_wire_bytes()?;
    out.extend_from_slice(receipt.genesis.as_ref());
    out.extend_from_slice(&receipt.letter_number.to_le_bytes());
    out.extend_from_slice(&receipt.expiry_block.to_le_bytes());
    out.extend_from_slice(receipt.referee.as_ref());
    out.extend_from_slice(receipt.worker.as_ref());
    out.extend_from_slice(&amount);
    Ok(())
}

/// Payload the referee signs to bind the diploma to its skill content.
///
/// # Errors
/// `MalformedInput` if the amount does not fit the 16-byte field.
pub fn encode_private_data(cid: &ContentId, receipt: &Receipt) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(PRIVATE_DATA_LEN);
    out.extend_from_slice(&cid.digest());
    put_receipt(&mut out, receipt)?;
    Ok(out)
}

/// Payload the referee signs as a receipt disclosable to third parties.
///
/// # Errors
/// `MalformedInput` if the amount does not fit the 16-byte field.
pub fn encode_receipt(receipt: &Receipt) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(RECEIPT_LEN);
    put_receipt(&mut out, receipt)?;
    Ok(out)
}

/// Payload the worker signs to delegate usage rights to `employer`.
///
/// Anchored on the referee's receipt signature, so a delegation cannot be
/// produced without holding the original diploma.
///
/// # Errors
/// `MalformedInput` if the amount does not fit the 16-byte field.
pub fn encode_insurance(
    receipt: &Receipt,
    referee_sign_over_receipt: &SignatureBytes,
    employer: &PublicKeyBytes,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(INSURANCE_LEN);
    put_receipt(&mut out, receipt)?;
    out.extend_from_slice(referee_sign_over_receipt.as_ref());
    out.extend_from_slice(employer.as_ref());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use num_bigint::BigUint;

    fn receipt() -> Receipt {
        Receipt {
            genesis: GenesisHash([7u8; 32]),
            letter_number: 3,
            expiry_block: 100,
            referee: PublicKeyBytes([2u8; 33]),
            worker: PublicKeyBytes([3u8; 33]),
            amount: Amount::from_u128(572_000_000_000_000),
        }
    }

    #[test]
    fn test_receipt_layout() {
        let bytes = encode_receipt(&receipt()).unwrap();
        assert_eq!(bytes.len(), RECEIPT_LEN);
        assert_eq!(&bytes[..32], &[7u8; 32]);
        assert_eq!(&bytes[32..36], &3u32.to_le_bytes());
        assert_eq!(&bytes[36..44], &100u64.to_le_bytes());
        assert_eq!(&bytes[44..77], &[2u8; 33]);
        assert_eq!(&bytes[77..110], &[3u8; 33]);
        assert_eq!(&bytes[110..], &572_000_000_000_000u128.to_le_bytes());
    }

    #[test]
    fn test_private_data_prefixes_skill_digest() {
        let cid = ContentId::new("bafkreigh2akiscaildc").unwrap();
        let private = encode_private_data(&cid, &receipt()).unwrap();
        assert_eq!(private.len(), PRIVATE_DATA_LEN);
        assert_eq!(&private[..32], &cid.digest());
        assert_eq!(&private[32..], encode_receipt(&receipt()).unwrap().as_slice());
    }

    #[test]
    fn test_insurance_appends_anchor_and_employer() {
        let sig = SignatureBytes([9u8; 64]);
        let employer = PublicKeyBytes([4u8; 33]);
        let bytes = encode_insurance(&receipt(), &sig, &employer).unwrap();
        assert_eq!(bytes.len(), INSURANCE_LEN);
        assert_eq!(&bytes[RECEIPT_LEN..RECEIPT_LEN + 64], &[9u8; 64]);
        assert_eq!(&bytes[RECEIPT_LEN + 64..], &[4u8; 33]);
    }

    #[test]
    fn test_distinct_fields_give_distinct_bytes() {
        let base = receipt();
        let variants = [
            Receipt { letter_number: 4, ..base.clone() },
            Receipt { expiry_block: 101, ..base.clone() },
            Receipt { genesis: GenesisHash([8u8; 32]), ..base.clone() },
            Receipt { referee: PublicKeyBytes([5u8; 33]), ..base.clone() },
            Receipt { worker: PublicKeyBytes([6u8; 33]), ..base.clone() },
            Receipt { amount: Amount::from_u128(1), ..base.clone() },
            // swapping referee and worker must not collide either
            Receipt { referee: base.worker, worker: base.referee, ..base.clone() },
        ];
        let original = encode_receipt(&base).unwrap();
        let mut seen = vec![original];
        for variant in &variants {
            let bytes = encode_receipt(variant).unwrap();
            assert!(!seen.contains(&bytes), "collision for {:?}", variant);
            seen.push(bytes);
        }
    }

    #[test]
    fn test_oversized_amount_is_malformed() {
        let mut r = receipt();
        r.amount = Amount(BigUint::from(u128::MAX) * 2u32);
        assert!(matches!(encode_receipt(&r), Err(ProtocolError::MalformedInput(_))));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = encode_receipt(&receipt()).unwrap();
        let b = encode_receipt(&receipt()).unwrap();
        assert_eq!(a, b);
    }
}
