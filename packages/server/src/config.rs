//! Engine tunables.

use std::time::Duration;

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("ping interval ({ping:?}) must be shorter than the read timeout ({read:?})")]
    PingNotBeforeReadTimeout { ping: Duration, read: Duration },
}

/// Runtime configuration of the hub and its connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Bounded per-connection outbox capacity (envelopes)
    pub outbox_capacity: usize,
    /// Read deadline, refreshed on every inbound frame (pong included)
    pub read_timeout: Duration,
    /// Deadline for each socket write
    pub write_timeout: Duration,
    /// Interval of keep-alive pings sent by the writer loop
    pub ping_interval: Duration,
    /// Heartbeat age after which the janitor marks a connection record inactive
    pub stale_threshold: Duration,
    /// How often the janitor sweeps
    pub sweep_interval: Duration,
    /// Capacity of the register/subscription/broadcast queues feeding the hub
    pub hub_queue_capacity: usize,
    /// Join queued envelopes into one text frame separated by `\n`
    pub coalesce_writes: bool,
    /// Upper bound of envelopes joined into one frame
    pub max_coalesced_frames: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 256,
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            stale_threshold: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60),
            hub_queue_capacity: 1024,
            coalesce_writes: false,
            max_coalesced_frames: 16,
        }
    }
}

impl HubConfig {
    /// Check the invariants between the tunables
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero_counts = [
            ("outbox_capacity", self.outbox_capacity),
            ("hub_queue_capacity", self.hub_queue_capacity),
            ("max_coalesced_frames", self.max_coalesced_frames),
        ];
        for (name, value) in non_zero_counts {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }

        let non_zero_durations = [
            ("read_timeout", self.read_timeout),
            ("write_timeout", self.write_timeout),
            ("ping_interval", self.ping_interval),
            ("stale_threshold", self.stale_threshold),
            ("sweep_interval", self.sweep_interval),
        ];
        for (name, value) in non_zero_durations {
            if value.is_zero() {
                return Err(ConfigError::Zero(name));
            }
        }

        if self.ping_interval >= self.read_timeout {
            return Err(ConfigError::PingNotBeforeReadTimeout {
                ping: self.ping_interval,
                read: self.read_timeout,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        // テスト項目: デフォルト設定はバリデーションを通過する
        // given (前提条件):
        let config = HubConfig::default();

        // when (操作):
        let result = config.validate();

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(config.outbox_capacity, 256);
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert_eq!(config.stale_threshold, Duration::from_secs(300));
    }

    #[test]
    fn test_zero_outbox_capacity_is_rejected() {
        // テスト項目: outbox の容量 0 はエラーになる
        // given (前提条件):
        let config = HubConfig {
            outbox_capacity: 0,
            ..HubConfig::default()
        };

        // when (操作):
        let result = config.validate();

        // then (期待する結果):
        assert_eq!(result, Err(ConfigError::Zero("outbox_capacity")));
    }

    #[test]
    fn test_ping_interval_must_be_shorter_than_read_timeout() {
        // テスト項目: ping 間隔が読み取りタイムアウト以上の場合はエラーになる
        // given (前提条件):
        let config = HubConfig {
            ping_interval: Duration::from_secs(60),
            read_timeout: Duration::from_secs(60),
            ..HubConfig::default()
        };

        // when (操作):
        let result = config.validate();

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(ConfigError::PingNotBeforeReadTimeout { .. })
        ));
    }
}
