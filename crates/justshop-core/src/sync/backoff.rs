//! Reconnect delays

use std::time::Duration;

use crate::config::Config;

/// How long to wait between push channel attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay after the first failure
    pub initial: Duration,
    /// Upper bound for the delay
    pub max: Duration,
    /// Growth factor per consecutive failure (1 = flat delay)
    pub multiplier: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

impl ReconnectPolicy {
    /// Same delay after every failure
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial: delay,
            max: delay,
            multiplier: 1,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let initial = Duration::from_secs(config.reconnect_delay_secs);
        Self {
            initial,
            max: Duration::from_secs(config.max_reconnect_delay_secs).max(initial),
            ..Self::default()
        }
    }
}

/// Delay sequence for one run of consecutive failures
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    policy: ReconnectPolicy,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            current: policy.initial,
        }
    }

    /// Delay to wait now; the following call returns a longer one
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .saturating_mul(self.policy.multiplier.max(1))
            .min(self.policy.max);
        delay
    }

    /// Back to the initial delay after a successful connect
    pub(crate) fn reset(&mut self) {
        self.current = self.policy.initial;
    }
}
