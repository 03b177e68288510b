//! How long the driver waits before the next cycle.

use std::time::Duration;

use crate::config::BackoffConfig;
use crate::error::FailureClass;

/// Delay per cycle outcome.
///
/// Completed cycles, whether or not the body could be used, wait the steady
/// `idle` period. Failures before a response was received wait the delay of
/// their class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub idle: Duration,
    pub link_down: Duration,
    pub resolve: Duration,
    pub connect: Duration,
    pub send: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&BackoffConfig::default())
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        Self {
            idle: Duration::from_millis(config.idle_ms),
            link_down: Duration::from_millis(config.link_down_ms),
            resolve: Duration::from_millis(config.resolve_ms),
            connect: Duration::from_millis(config.connect_ms),
            send: Duration::from_millis(config.send_ms),
        }
    }
}

impl BackoffPolicy {
    /// Same delay for every outcome. Handy for tests and bench setups.
    pub fn uniform(delay: Duration) -> Self {
        Self {
            idle: delay,
            link_down: delay,
            resolve: delay,
            connect: delay,
            send: delay,
        }
    }

    /// Delay after a cycle that ended with `failure`, or `None` for success.
    pub fn delay_for(&self, failure: Option<FailureClass>) -> Duration {
        match failure {
            None => self.idle,
            Some(FailureClass::LinkDown) => self.link_down,
            Some(FailureClass::Resolve) => self.resolve,
            Some(FailureClass::Connect) => self.connect,
            Some(FailureClass::Send) => self.send,
            Some(FailureClass::Framing | FailureClass::Parse | FailureClass::Buffer) => self.idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(None), Duration::from_secs(11));
        assert_eq!(
            policy.delay_for(Some(FailureClass::LinkDown)),
            Duration::from_secs(11)
        );
        assert_eq!(
            policy.delay_for(Some(FailureClass::Resolve)),
            Duration::from_secs(1)
        );
        assert_eq!(
            policy.delay_for(Some(FailureClass::Connect)),
            Duration::from_secs(4)
        );
        assert_eq!(policy.delay_for(Some(FailureClass::Send)), Duration::from_secs(4));
    }

    #[test]
    fn test_post_receive_failures_use_idle() {
        let policy = BackoffPolicy {
            idle: Duration::from_secs(30),
            ..BackoffPolicy::uniform(Duration::from_secs(1))
        };
        for class in [FailureClass::Framing, FailureClass::Parse, FailureClass::Buffer] {
            assert_eq!(policy.delay_for(Some(class)), Duration::from_secs(30));
        }
        assert_eq!(policy.delay_for(Some(FailureClass::Connect)), Duration::from_secs(1));
    }

    #[test]
    fn test_from_config() {
        let config = BackoffConfig {
            idle_ms: 100,
            link_down_ms: 200,
            resolve_ms: 300,
            connect_ms: 400,
            send_ms: 500,
        };
        let policy = BackoffPolicy::from(&config);
        assert_eq!(policy.link_down, Duration::from_millis(200));
        assert_eq!(policy.send, Duration::from_millis(500));
    }
}
