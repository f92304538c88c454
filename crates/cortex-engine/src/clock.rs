//! Monotonic nanosecond clock and absolute sleep-until.
//!
//! All scheduling math in the Replayer and Scheduler is done against this
//! clock; no wall-clock (`SystemTime`) ever enters timing decisions.

use std::time::Duration;

use crate::shutdown::ShutdownFlag;

/// Nanosecond timestamp via `CLOCK_MONOTONIC_RAW` (Linux) or a lazily
/// initialized `Instant` epoch on other platforms.
#[inline(always)]
pub fn now_ns() -> u64 {
    #[cfg(target_os = "linux")]
    {
        let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut ts);
        }
        (ts.tv_sec as u64) * 1_000_000_000 + (ts.tv_nsec as u64)
    }
    #[cfg(not(target_os = "linux"))]
    {
        use std::sync::OnceLock;
        use std::time::Instant;
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        let epoch = EPOCH.get_or_init(Instant::now);
        epoch.elapsed().as_nanos() as u64
    }
}

/// Sleeps (in short slices, absorbing spurious wake-ups) until `now_ns() >=
/// deadline_ns` or `shutdown` becomes set. Never sleeps past the deadline by
/// more than one slice, and never sleeps in a single long call — shutdown
/// latency is bounded by `SLICE`.
pub fn sleep_until(deadline_ns: u64, shutdown: &ShutdownFlag) {
    const SLICE: Duration = Duration::from_micros(500);
    loop {
        if shutdown.is_set() {
            return;
        }
        let now = now_ns();
        if now >= deadline_ns {
            return;
        }
        let remaining_ns = deadline_ns - now;
        let slice = if remaining_ns < SLICE.as_nanos() as u64 {
            Duration::from_nanos(remaining_ns)
        } else {
            SLICE
        };
        std::thread::sleep(slice);
    }
}

/// A short opaque run identifier, unique within a host for practical
/// purposes: seconds-since-epoch * 1000 + the sub-second millisecond part
/// of the monotonic clock at the moment of construction.
pub fn new_run_id() -> String {
    let wall = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let millis_part = now_ns() / 1_000_000 % 1000;
    format!("{}{:03}", wall.as_secs(), millis_part)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ns_is_monotonic() {
        let a = now_ns();
        let b = now_ns();
        assert!(b >= a);
    }

    #[test]
    fn sleep_until_returns_at_or_after_deadline() {
        let shutdown = ShutdownFlag::new();
        let start = now_ns();
        let deadline = start + 2_000_000; // 2ms
        sleep_until(deadline, &shutdown);
        assert!(now_ns() >= deadline);
    }

    #[test]
    fn sleep_until_honors_shutdown() {
        let shutdown = ShutdownFlag::new();
        shutdown.set();
        let start = now_ns();
        // Deadline far in the future; shutdown must short-circuit immediately.
        sleep_until(start + 10_000_000_000, &shutdown);
        assert!(now_ns() - start < 100_000_000);
    }

    #[test]
    fn run_ids_are_distinct_across_calls() {
        let a = new_run_id();
        std::thread::sleep(Duration::from_millis(2));
        let b = new_run_id();
        assert_ne!(a, b);
    }
}
