use std::{fs, path::Path};

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

use ndnfw::{ForwarderOptions, Name, RetryOptions, TracerOptions};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "producer")]
    pub producers: Vec<ProducerConfig>,
    pub forwarder: ForwarderOptions,
    pub logging: LoggingConfig,
    pub tracer: TracerConfig,
    pub readvertise: ReadvertiseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub options: TracerOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadvertiseConfig {
    /// Log announced prefixes through a readvertise destination.
    pub enabled: bool,
    pub retry: RetryOptions,
}

impl Default for ReadvertiseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retry: RetryOptions::default(),
        }
    }
}

/// Static content served under a prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    pub prefix: Name,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_announce")]
    pub announce: bool,
    #[serde(default)]
    pub freshness_period_ms: u64,
}

fn default_concurrency() -> usize {
    1
}

fn default_announce() -> bool {
    true
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.forwarder.validate()?;
        self.readvertise.retry.validate()?;
        for producer in &self.producers {
            ensure!(
                producer.concurrency > 0,
                "producer {} must have positive concurrency",
                producer.prefix
            );
        }
        Ok(())
    }
}
