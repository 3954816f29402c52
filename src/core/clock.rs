//! Monotonic timestamps for counter readings.
//!
//! Readings are stamped with `CLOCK_MONOTONIC`, so timestamps are only
//! comparable within one run of the process.

use crate::core::types::Timestamp;

/// Current value of the monotonic clock in nanoseconds.
pub fn monotonic_nanos() -> Timestamp {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec and CLOCK_MONOTONIC is always available.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    if rc != 0 {
        return 0;
    }

    (ts.tv_sec as u64)
        .saturating_mul(1_000_000_000)
        .saturating_add(ts.tv_nsec as u64)
}

/// Timestamp for a new logical instant that follows `previous`.
///
/// Two calls within the same clock tick still get distinct instants.
pub fn next_instant(previous: Timestamp) -> Timestamp {
    monotonic_nanos().max(previous.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_does_not_go_backwards() {
        let a = monotonic_nanos();
        let b = monotonic_nanos();
        assert!(a > 0);
        assert!(b >= a);
    }

    #[test]
    fn test_next_instant_is_strictly_later() {
        let far_future = monotonic_nanos() + 1_000_000_000_000;
        assert_eq!(next_instant(far_future), far_future + 1);

        let now = monotonic_nanos();
        assert!(next_instant(now) > now);
    }
}
