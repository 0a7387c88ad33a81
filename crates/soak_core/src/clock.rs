//! Wall-clock readings used for write keys, delete thresholds, and
//! per-invocation jitter seeds.

use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch, as the signed 64-bit integer the
/// `model` table is keyed by. A clock reading before the epoch yields 0.
pub fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

/// Seed for a per-invocation jitter RNG.
pub fn rng_seed() -> u64 {
    unix_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nanos_are_positive_and_nondecreasing() {
        let first = unix_nanos();
        let second = unix_nanos();
        assert!(first > 0);
        assert!(second >= first);
    }
}
