use crate::format::FormatConfig;
use crate::humanize::ByteSize;
use crate::scheduler::{DEFAULT_CONCURRENCY_CAP, SchedulerConfig, default_max_concurrent};
use crate::worker::http::HttpConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Target format; missing keys fall back to per-encoder defaults
    #[serde(default)]
    pub output: FormatConfig,
}

/// `[http]` section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpSettings {
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: ByteSize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

impl HttpSettings {
    pub fn to_http_config(&self) -> HttpConfig {
        HttpConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            user_agent: self.user_agent.clone(),
            max_image_bytes: self.max_image_bytes,
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    HttpConfig::default().user_agent
}

fn default_max_image_bytes() -> ByteSize {
    ByteSize::mib(32)
}

/// `[scheduler]` section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerSettings {
    /// Explicit concurrency; computed from the hardware when unset
    #[serde(default)]
    pub max_concurrent: Option<usize>,
    #[serde(default = "default_concurrency_cap")]
    pub concurrency_cap: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: None,
            concurrency_cap: default_concurrency_cap(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl SchedulerSettings {
    /// Resolve the concurrency limit once, here.
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent: self
                .max_concurrent
                .unwrap_or_else(|| default_max_concurrent(self.concurrency_cap)),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

fn default_concurrency_cap() -> usize {
    DEFAULT_CONCURRENCY_CAP
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    777
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_runtime_defaults() {
        let config = Config::default();
        let http = config.http.to_http_config();
        assert_eq!(http.request_timeout, Duration::from_secs(10));
        assert_eq!(http.max_image_bytes, ByteSize::mib(32));

        let scheduler = config.scheduler.to_scheduler_config();
        assert_eq!(scheduler.max_retries, 3);
        assert_eq!(scheduler.retry_delay, Duration::from_millis(777));
        assert!((1..=DEFAULT_CONCURRENCY_CAP).contains(&scheduler.max_concurrent));
    }

    #[test]
    fn test_explicit_concurrency_wins_over_cap() {
        let settings = SchedulerSettings {
            max_concurrent: Some(8),
            concurrency_cap: 2,
            ..Default::default()
        };
        assert_eq!(settings.to_scheduler_config().max_concurrent, 8);

        let settings = SchedulerSettings {
            concurrency_cap: 1,
            ..Default::default()
        };
        assert_eq!(settings.to_scheduler_config().max_concurrent, 1);
    }
}
