//! Modulo-N index arithmetic.
//!
//! Marker indices wrap around the descriptor's index modulus. Two indices
//! are ambiguous once they are half the modulus apart; anything beyond
//! `modulus / 2 - 1` ahead is treated as belonging to an older cycle.

/// Forward distance from `from` to `to` in a ring of `modulus` slots
#[inline]
pub fn forward_distance(from: u32, to: u32, modulus: u32) -> u32 {
    let m = modulus.max(1) as u64;
    ((to as u64 + m - (from as u64 % m)) % m) as u32
}

/// Largest forward distance still considered the same cycle
#[inline]
pub fn ambiguity_threshold(modulus: u32) -> u32 {
    (modulus / 2).saturating_sub(1)
}

/// Whether `record` has been superseded by `incoming`
#[inline]
pub fn is_stale(record: u32, incoming: u32, modulus: u32) -> bool {
    forward_distance(record, incoming, modulus) > ambiguity_threshold(modulus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_distance_wraps() {
        assert_eq!(forward_distance(250, 4, 256), 10);
        assert_eq!(forward_distance(4, 250, 256), 246);
        assert_eq!(forward_distance(7, 7, 256), 0);
    }

    #[test]
    fn test_threshold_for_byte_indices() {
        assert_eq!(ambiguity_threshold(256), 127);
        assert!(!is_stale(10, 137, 256));
        assert!(is_stale(10, 138, 256));
        // an index behind the incoming one looks like a very old record
        assert!(is_stale(20, 10, 256));
    }
}
