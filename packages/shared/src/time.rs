//! Time-related utilities with clock abstraction for testability.
//!
//! The engine stamps read receipts, typing events and heartbeats with a
//! server-authoritative time, so every timestamp flows through [`Clock`].

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Clock trait for dependency injection and testing
pub trait Clock: Send + Sync {
    /// Current instant in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// System clock implementation (uses actual system time)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock implementation for testing (returns a fixed time)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    fixed_time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given instant
    pub fn new(fixed_time: DateTime<Utc>) -> Self {
        Self { fixed_time }
    }

    /// Create a new fixed clock from a Unix timestamp in milliseconds.
    ///
    /// Out-of-range values fall back to the Unix epoch.
    pub fn from_millis(fixed_time_millis: i64) -> Self {
        let fixed_time = Utc
            .timestamp_millis_opt(fixed_time_millis)
            .single()
            .unwrap_or_default();
        Self { fixed_time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.fixed_time
    }
}

/// Format an instant as RFC 3339 in UTC with millisecond precision
pub fn to_rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_returns_increasing_timestamps() {
        // テスト項目: SystemClock が呼び出すたびに増加するタイムスタンプを返す
        // given (前提条件):
        let clock = SystemClock;

        // when (操作):
        let timestamp1 = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let timestamp2 = clock.now();

        // then (期待する結果):
        assert!(timestamp2 >= timestamp1);
    }

    #[test]
    fn test_fixed_clock_returns_consistent_timestamp() {
        // テスト項目: FixedClock が複数回呼び出しても同じタイムスタンプを返す
        // given (前提条件):
        let clock = FixedClock::from_millis(1_672_531_200_000);

        // when (操作):
        let timestamp1 = clock.now();
        let timestamp2 = clock.now();

        // then (期待する結果):
        assert_eq!(timestamp1, timestamp2);
        assert_eq!(timestamp1.timestamp_millis(), 1_672_531_200_000);
    }

    #[test]
    fn test_to_rfc3339_uses_utc_with_milliseconds() {
        // テスト項目: タイムスタンプが UTC の RFC 3339 形式（ミリ秒付き）に変換される
        // given (前提条件):
        // 2023-01-01 00:00:00.123 UTC
        let clock = FixedClock::from_millis(1_672_531_200_123);

        // when (操作):
        let result = to_rfc3339(clock.now());

        // then (期待する結果):
        assert_eq!(result, "2023-01-01T00:00:00.123Z");
    }
}
