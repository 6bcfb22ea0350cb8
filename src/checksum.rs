//! Additive 8-bit checksum used by every packet of the protocol.
//!
//! The checksum byte is chosen so that the sum of all packet bytes, checksum
//! included, is `0` modulo 256.

/// Checksum over `bytes`, where the checksum's own slot (if present) is `0`.
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum = byte_sum(bytes);
    ((256 - (sum % 256)) % 256) as u8
}

/// True when the complete packet (checksum included) sums to `0` mod 256.
pub fn is_valid_sum(bytes: &[u8]) -> bool {
    byte_sum(bytes) % 256 == 0
}

fn byte_sum(bytes: &[u8]) -> u32 {
    bytes.iter().map(|&b| b as u32).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_minimal_request() {
        assert_eq!(checksum(&[0xFF, 0xFF, 0x02, 0x04, 0x00]), 0xFC);
        assert!(is_valid_sum(&[0xFF, 0xFF, 0x02, 0x04, 0xFC]));
    }

    #[test]
    fn checksum_wraps_to_zero() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x80, 0x80]), 0);
        assert!(is_valid_sum(&[0x80, 0x80, 0x00]));
    }

    #[test]
    fn corrupted_packet_fails_predicate() {
        assert!(!is_valid_sum(&[0xFF, 0xFF, 0x02, 0x04, 0xFD]));
    }
}
