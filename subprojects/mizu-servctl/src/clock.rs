//! Monotonic time source shared with the timer queue.

/// Nanoseconds on the host monotonic clock.
///
/// Timer deadlines are measured against the same clock, so values read here
/// order correctly with timer fires.
pub fn global_time_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid out-pointer; CLOCK_MONOTONIC always exists on Linux.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    (ts.tv_sec as u64) * 1_000_000_000 + ts.tv_nsec as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_time_is_monotonic() {
        let a = global_time_ns();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = global_time_ns();
        assert!(b > a);
        assert!(b - a >= 1_000_000);
    }
}
