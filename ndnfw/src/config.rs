use std::time::Duration;

use serde::{Deserialize, Serialize};

use ndnfw_core::Name;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderOptions {
    /// Whether Data without a PIT token may be matched by name.
    pub data_no_token_match: bool,
    /// Buffer size of the event side channel, per subscriber.
    pub event_capacity: usize,
    /// Names of this node, consulted when choosing whether to follow a forwarding hint.
    pub node_names: Vec<Name>,
}

impl Default for ForwarderOptions {
    fn default() -> Self {
        Self {
            data_no_token_match: true,
            event_capacity: 256,
            node_names: Vec::new(),
        }
    }
}

impl ForwarderOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroEventCapacity);
        }
        Ok(())
    }
}

/// Backoff schedule of a readvertise retry controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Keep retrying after `retries` attempts, reusing the last delay.
    pub forever: bool,
    pub retries: u32,
    pub factor: f64,
    #[serde(with = "duration_ms", rename = "min_timeout_ms")]
    pub min_timeout: Duration,
    #[serde(with = "duration_ms", rename = "max_timeout_ms")]
    pub max_timeout: Duration,
    /// Multiply each delay by a random factor in `[1, 2)`.
    pub randomize: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            forever: true,
            retries: 10,
            factor: 2.0,
            min_timeout: Duration::from_secs(5),
            max_timeout: Duration::from_secs(60),
            randomize: true,
        }
    }
}

impl RetryOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.factor < 1.0 || !self.factor.is_finite() {
            return Err(ConfigError::InvalidRetry("factor must be at least 1"));
        }
        if self.min_timeout > self.max_timeout {
            return Err(ConfigError::InvalidRetry(
                "min_timeout must not exceed max_timeout",
            ));
        }
        if self.forever && self.retries == 0 {
            return Err(ConfigError::InvalidRetry("forever requires retries > 0"));
        }
        Ok(())
    }

    /// Delay before retry number `attempt`, counting from zero.
    pub fn timeout(&self, attempt: u32) -> Duration {
        let random = if self.randomize {
            1.0 + fastrand::f64()
        } else {
            1.0
        };
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let ms = random * self.min_timeout.as_millis() as f64 * self.factor.powi(exponent);
        let max_ms = self.max_timeout.as_millis() as f64;
        Duration::from_millis(ms.round().min(max_ms) as u64)
    }
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
