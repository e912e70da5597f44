//! Injectable time sources.
//!
//! All timing decisions in the crate (clock deductions, time forfeits,
//! activity tracking for garbage collection) read the current time through
//! a [`TimeSource`]. Production code uses [`SystemTimeSource`]; tests drive a
//! [`ManualTimeSource`] so that forfeits and increments can be exercised
//! without real delays.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of "now", in integer milliseconds since the Unix epoch.
pub trait TimeSource: Send + Sync + std::fmt::Debug {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        current_timestamp()
    }
}

/// A time source that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: AtomicU64,
}

impl ManualTimeSource {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    /// Moves time forward by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jumps to an absolute time.
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Current Unix time in milliseconds.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_source_moves_only_when_advanced() {
        let time = ManualTimeSource::new(1_000);
        assert_eq!(time.now_ms(), 1_000);
        time.advance(250);
        assert_eq!(time.now_ms(), 1_250);
        time.set(10);
        assert_eq!(time.now_ms(), 10);
    }

    #[test]
    fn system_source_is_after_2020() {
        assert!(SystemTimeSource::new().now_ms() > 1_577_836_800_000);
    }
}
