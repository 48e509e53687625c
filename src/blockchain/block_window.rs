// src/blockchain/block_window.rs
//! Converts a wall-clock validity period into an absolute expiry block.

use crate::error::{ProtocolError, Result};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Validity in days as seconds.
///
/// # Errors
/// `MalformedInput` if the period overflows `u64` seconds.
pub fn days_to_secs(days: u64) -> Result<u64> {
    days.checked_mul(SECONDS_PER_DAY)
        .ok_or_else(|| ProtocolError::malformed(format!("{} days overflows the validity period", days)))
}

/// `current + floor(valid_for_secs * 1000 / block_time_ms)`.
///
/// # Errors
/// - `BlockTimeUnknown` when the block time is missing or zero.
/// - `MalformedInput` when the result does not fit a block number.
pub fn expiry_block(current_block: u64, block_time_ms: Option<u64>, valid_for_secs: u64) -> Result<u64> {
    let block_time_ms = match block_time_ms {
        Some(ms) if ms > 0 => ms,
        _ => return Err(ProtocolError::BlockTimeUnknown),
    };
    let overflow = || ProtocolError::malformed("validity period overflows the block number");
    let blocks = valid_for_secs.checked_mul(1000).ok_or_else(overflow)? / block_time_ms;
    current_block.checked_add(blocks).ok_or_else(overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_block_basic() {
        assert_eq!(expiry_block(0, Some(6000), 600).unwrap(), 100);
        assert_eq!(expiry_block(1_000, Some(6000), 600).unwrap(), 1_100);
    }

    #[test]
    fn test_expiry_block_rounds_down() {
        assert_eq!(expiry_block(10, Some(6000), 5).unwrap(), 10);
        assert_eq!(expiry_block(10, Some(7000), 20).unwrap(), 12);
    }

    #[test]
    fn test_two_years_at_six_seconds() {
        let secs = days_to_secs(730).unwrap();
        assert_eq!(expiry_block(0, Some(6000), secs).unwrap(), 10_512_000);
    }

    #[test]
    fn test_missing_block_time() {
        assert!(matches!(expiry_block(5, None, 600), Err(ProtocolError::BlockTimeUnknown)));
        assert!(matches!(expiry_block(5, Some(0), 600), Err(ProtocolError::BlockTimeUnknown)));
    }

    #[test]
    fn test_overflow_is_rejected() {
        assert!(matches!(
            expiry_block(0, Some(1), u64::MAX),
            Err(ProtocolError::MalformedInput(_))
        ));
        assert!(matches!(
            expiry_block(u64::MAX, Some(1), 1),
            Err(ProtocolError::MalformedInput(_))
        ));
        assert!(days_to_secs(u64::MAX).is_err());
    }
}
