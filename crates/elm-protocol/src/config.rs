//! Adapter configuration

use crate::error::ElmError;
use crate::protocol::ElmProtocol;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for AT commands that acknowledge with `OK`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after the first failed one (0 = single shot)
    pub max_retries: u8,
    /// Backoff base in milliseconds, multiplied by the attempt number
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u8) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(attempt as u64))
    }
}

/// Settings for the adapter link and protocol engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElmConfig {
    /// Serial device (e.g. "/dev/ttyUSB0")
    pub device: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Wait for each reply byte (milliseconds)
    pub command_timeout_ms: u64,
    /// Silence that ends a drain (milliseconds)
    pub quiet_ms: u64,
    /// Pause after the first reset command (milliseconds)
    pub reset_settle_ms: u64,
    /// Pause after arming the receive filter (milliseconds)
    pub monitor_settle_ms: u64,
    /// Substring a cold-reset banner must contain
    pub expected_firmware: String,
    /// Bus protocol selected during configuration
    pub protocol: ElmProtocol,
    /// Largest ISO-TP message accepted
    pub max_message_len: usize,
    /// Largest reply line kept from a command
    pub reply_capacity: usize,
    /// Retry behaviour for configuration commands
    pub retry: RetryPolicy,
}

impl Default for ElmConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 38400,
            command_timeout_ms: 1000,
            quiet_ms: 100,
            reset_settle_ms: 1000,
            monitor_settle_ms: 400,
            expected_firmware: "v1.5".to_string(),
            protocol: ElmProtocol::default(),
            max_message_len: 512,
            reply_capacity: 32,
            retry: RetryPolicy::default(),
        }
    }
}

impl ElmConfig {
    /// Reject settings the protocol engine cannot work with.
    ///
    /// Headers are programmed as 3 hex digits, so the bus must use 11-bit
    /// identifiers.
    pub fn validate(&self) -> Result<(), ElmError> {
        if !self.protocol.is_standard_id() {
            return Err(ElmError::Config(format!(
                "protocol {:?} does not use 11-bit identifiers",
                self.protocol
            )));
        }
        if self.reply_capacity < 2 {
            return Err(ElmError::Config(format!(
                "reply_capacity {} leaves no room for a reply",
                self.reply_capacity
            )));
        }
        Ok(())
    }

    /// Per-byte reply timeout
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Quiet window for drains
    pub fn quiet(&self) -> Duration {
        Duration::from_millis(self.quiet_ms)
    }

    /// Pause between the two reset commands
    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }

    /// Pause after programming the monitor filter
    pub fn monitor_settle(&self) -> Duration {
        Duration::from_millis(self.monitor_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ElmConfig::default();
        assert_eq!(config.baud_rate, 38400);
        assert_eq!(config.command_timeout(), Duration::from_secs(1));
        assert_eq!(config.expected_firmware, "v1.5");
        assert_eq!(config.retry.max_retries, 0);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: ElmConfig =
            serde_json::from_str(r#"{"device": "/dev/ttyACM0", "retry": {"max_retries": 2}}"#)
                .unwrap();
        assert_eq!(config.device, "/dev/ttyACM0");
        assert_eq!(config.quiet_ms, 100);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.backoff_ms, 100);
    }

    #[test]
    fn test_linear_backoff() {
        let retry = RetryPolicy {
            max_retries: 3,
            backoff_ms: 50,
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(50));
        assert_eq!(retry.backoff(3), Duration::from_millis(150));
    }

    #[test]
    fn test_backoff_saturates() {
        let retry = RetryPolicy {
            max_retries: 2,
            backoff_ms: u64::MAX,
        };
        assert_eq!(retry.backoff(2), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_validate_rejects_extended_and_auto_protocols() {
        assert!(ElmConfig::default().validate().is_ok());

        for protocol in [
            ElmProtocol::Auto,
            ElmProtocol::Iso15765_4Can29bit500,
            ElmProtocol::Iso15765_4Can29bit250,
        ] {
            let config = ElmConfig {
                protocol,
                ..Default::default()
            };
            let err = config.validate().unwrap_err();
            assert!(matches!(err, ElmError::Config(_)));
            assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
        }

        let slow = ElmConfig {
            protocol: ElmProtocol::Iso15765_4Can11bit250,
            ..Default::default()
        };
        assert!(slow.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_tiny_reply_capacity() {
        let config = ElmConfig {
            reply_capacity: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
