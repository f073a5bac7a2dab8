//! Configuration loading for the ferry daemon.
//!
//! Configuration is loaded in priority order:
//! 1. Environment variables prefixed `FERRY_` (highest priority)
//! 2. Configuration file (`ferry.toml`)
//! 3. Built-in defaults (lowest priority)
//!
//! The loader produces a validated record; the engine itself never reads
//! the environment. A missing webhook URL or queue reference is rejected
//! here, before any connection is attempted.

use std::time::Duration;

use anyhow::{Context, Result};
use ferry_engine::{engine::RunMode, sqs::QueueConfig, EngineConfig};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "ferry.toml";

/// Complete daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Full queue URL. Takes precedence over `queue_name`.
    ///
    /// Environment variable: `FERRY_QUEUE_URL`
    pub queue_url: Option<String>,

    /// Queue name; resolved against the service or the custom endpoint.
    ///
    /// Environment variable: `FERRY_QUEUE_NAME`
    pub queue_name: Option<String>,

    /// AWS region of the queue.
    ///
    /// Environment variable: `FERRY_REGION`
    pub region: String,

    /// Custom queue service endpoint (local stacks, compatible services).
    ///
    /// Environment variable: `FERRY_ENDPOINT_URL`
    pub endpoint_url: Option<String>,

    /// Static AWS access key id. Leave unset to use the ambient provider
    /// chain (instance profiles, environment, etc.).
    ///
    /// Environment variable: `FERRY_ACCESS_KEY_ID`
    pub access_key_id: Option<String>,

    /// Static AWS secret access key.
    ///
    /// Environment variable: `FERRY_SECRET_ACCESS_KEY`
    pub secret_access_key: Option<String>,

    /// Optional session token for temporary credentials.
    ///
    /// Environment variable: `FERRY_SESSION_TOKEN`
    pub session_token: Option<String>,

    /// Worker webhook URL messages are POSTed to. Required.
    ///
    /// Environment variable: `FERRY_WEBHOOK_URL`
    pub webhook_url: Option<String>,

    /// Content type for forwarded message bodies.
    ///
    /// Environment variable: `FERRY_CONTENT_TYPE`
    pub content_type: String,

    /// User agent for worker requests.
    ///
    /// Environment variable: `FERRY_USER_AGENT`
    pub user_agent: String,

    /// Concurrency ceiling: maximum messages in flight at once.
    ///
    /// Environment variable: `FERRY_MAX_IN_FLIGHT`
    pub max_in_flight: usize,

    /// Long-poll wait window in seconds (0-20).
    ///
    /// Environment variable: `FERRY_WAIT_TIME_SECONDS`
    pub wait_time_seconds: i32,

    /// Per-delivery timeout in milliseconds (0 = unbounded).
    ///
    /// Environment variable: `FERRY_DELIVERY_TIMEOUT_MS`
    pub delivery_timeout_ms: u64,

    /// Keep running on an empty queue instead of exiting after one cycle.
    ///
    /// Environment variable: `FERRY_DAEMONIZED`
    pub daemonized: bool,

    /// Seconds to wait after polling an empty queue when daemonized.
    ///
    /// Environment variable: `FERRY_IDLE_SLEEP_SECONDS`
    pub idle_sleep_seconds: u64,

    /// Worker health URL checked once before the loop starts.
    ///
    /// Environment variable: `FERRY_WORKER_HEALTH_URL`
    pub worker_health_url: Option<String>,

    /// How long to wait for the worker to become healthy, in milliseconds.
    ///
    /// Environment variable: `FERRY_WORKER_HEALTH_WAIT_MS`
    pub worker_health_wait_ms: u64,

    /// Delivery failures tolerated before draining (0 = unlimited).
    ///
    /// Environment variable: `FERRY_MAX_ERRORS`
    pub max_errors: u32,
}

impl Config {
    /// Loads configuration from defaults, `ferry.toml`, and `FERRY_*`
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when extraction or validation fails.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("FERRY_"));

        let config: Self = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// The queue name: explicit, or derived from the queue URL's last path
    /// segment.
    pub fn queue_name(&self) -> String {
        if let Some(name) = &self.queue_name {
            return name.clone();
        }

        self.queue_url
            .as_deref()
            .map(|url| url.rsplit('/').next().unwrap_or(url).to_string())
            .unwrap_or_default()
    }

    /// A loggable queue reference (URL or name).
    pub fn queue_display(&self) -> String {
        self.queue_url
            .clone()
            .or_else(|| self.queue_name.clone())
            .unwrap_or_default()
    }

    /// Converts to the engine configuration.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            webhook_url: self.webhook_url.clone().unwrap_or_default(),
            queue_name: self.queue_name(),
            content_type: self.content_type.clone(),
            user_agent: self.user_agent.clone(),
            max_in_flight: self.max_in_flight,
            delivery_timeout: Duration::from_millis(self.delivery_timeout_ms),
            run_mode: if self.daemonized {
                RunMode::Continuous
            } else {
                RunMode::SingleBatch
            },
            idle_backoff: Duration::from_secs(self.idle_sleep_seconds),
            health_url: self.worker_health_url.clone(),
            health_wait: Duration::from_millis(self.worker_health_wait_ms),
            max_errors: self.max_errors,
        }
    }

    /// Converts to the queue backend configuration.
    pub fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            queue_url: self.queue_url.clone(),
            queue_name: self.queue_name.clone(),
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            session_token: self.session_token.clone(),
            wait_time_seconds: self.wait_time_seconds,
        }
    }

    /// Validates the configuration.
    fn validate(&self) -> Result<()> {
        if self.webhook_url.as_deref().is_none_or(str::is_empty) {
            anyhow::bail!("webhook_url is required (FERRY_WEBHOOK_URL)");
        }

        let has_queue_url = self.queue_url.as_deref().is_some_and(|v| !v.is_empty());
        let has_queue_name = self.queue_name.as_deref().is_some_and(|v| !v.is_empty());
        if !has_queue_url && !has_queue_name {
            anyhow::bail!("a queue reference is required (FERRY_QUEUE_URL or FERRY_QUEUE_NAME)");
        }

        if self.max_in_flight == 0 {
            anyhow::bail!("max_in_flight must be greater than 0");
        }

        if !(0..=20).contains(&self.wait_time_seconds) {
            anyhow::bail!("wait_time_seconds must be between 0 and 20");
        }

        if self.content_type.is_empty() {
            anyhow::bail!("content_type must not be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_url: None,
            queue_name: None,
            region: default_region(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            webhook_url: None,
            content_type: default_content_type(),
            user_agent: default_user_agent(),
            max_in_flight: ferry_engine::DEFAULT_MAX_IN_FLIGHT,
            wait_time_seconds: ferry_engine::DEFAULT_WAIT_TIME_SECONDS,
            delivery_timeout_ms: ferry_engine::DEFAULT_DELIVERY_TIMEOUT_MS,
            daemonized: false,
            idle_sleep_seconds: 0,
            worker_health_url: None,
            worker_health_wait_ms: default_health_wait_ms(),
            max_errors: 0,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_content_type() -> String {
    "application/json".to_string()
}

fn default_user_agent() -> String {
    format!("ferry/{}", env!("CARGO_PKG_VERSION"))
}

fn default_health_wait_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, env, sync::Mutex};

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct TestEnvGuard {
        _lock: std::sync::MutexGuard<'static, ()>,
        vars: Vec<String>,
        originals: HashMap<String, Option<String>>,
    }

    impl TestEnvGuard {
        fn new() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Self { _lock: lock, vars: Vec::new(), originals: HashMap::new() }
        }

        fn set_var(&mut self, key: &str, value: &str) {
            if !self.vars.contains(&key.to_string()) {
                self.originals.insert(key.to_string(), env::var(key).ok());
                self.vars.push(key.to_string());
            }
            env::set_var(key, value);
        }
    }

    impl Drop for TestEnvGuard {
        fn drop(&mut self) {
            for var in &self.vars {
                match self.originals.get(var) {
                    Some(Some(value)) => env::set_var(var, value),
                    Some(None) => env::remove_var(var),
                    None => {},
                }
            }
        }
    }

    #[test]
    fn defaults_alone_fail_validation() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn minimal_config_from_env_loads() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("FERRY_WEBHOOK_URL", "http://localhost:8080/hook");
        guard.set_var(
            "FERRY_QUEUE_URL",
            "https://sqs.us-east-1.amazonaws.com/123456789012/jobs",
        );

        let config = Config::load().expect("minimal configuration should load");

        assert_eq!(config.webhook_url.as_deref(), Some("http://localhost:8080/hook"));
        assert_eq!(config.queue_name(), "jobs");
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.max_in_flight, 10);
        assert!(!config.daemonized);
    }

    #[test]
    fn env_overrides_take_priority() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("FERRY_WEBHOOK_URL", "http://localhost:8080/hook");
        guard.set_var("FERRY_QUEUE_NAME", "background-jobs");
        guard.set_var("FERRY_REGION", "eu-west-1");
        guard.set_var("FERRY_MAX_IN_FLIGHT", "4");
        guard.set_var("FERRY_WAIT_TIME_SECONDS", "5");
        guard.set_var("FERRY_DELIVERY_TIMEOUT_MS", "0");
        guard.set_var("FERRY_DAEMONIZED", "true");
        guard.set_var("FERRY_IDLE_SLEEP_SECONDS", "2");
        guard.set_var("FERRY_MAX_ERRORS", "25");

        let config = Config::load().expect("configuration should load");

        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.max_in_flight, 4);
        assert_eq!(config.wait_time_seconds, 5);
        assert_eq!(config.delivery_timeout_ms, 0);
        assert!(config.daemonized);
        assert_eq!(config.max_errors, 25);

        let engine = config.to_engine_config();
        assert_eq!(engine.run_mode, RunMode::Continuous);
        assert_eq!(engine.queue_name, "background-jobs");
        assert_eq!(engine.delivery_timeout, Duration::ZERO);
        assert_eq!(engine.idle_backoff, Duration::from_secs(2));
    }

    #[test]
    fn queue_name_derives_from_url_last_segment() {
        let config = Config {
            queue_url: Some("https://sqs.us-east-1.amazonaws.com/123456789012/orders".to_string()),
            webhook_url: Some("http://localhost/hook".to_string()),
            ..Config::default()
        };

        assert!(config.validate().is_ok());
        assert_eq!(config.queue_name(), "orders");
    }

    #[test]
    fn explicit_queue_name_wins_over_derivation() {
        let config = Config {
            queue_url: Some("https://example.com/123/derived".to_string()),
            queue_name: Some("explicit".to_string()),
            webhook_url: Some("http://localhost/hook".to_string()),
            ..Config::default()
        };

        assert_eq!(config.queue_name(), "explicit");
    }

    #[test]
    fn missing_queue_reference_is_rejected() {
        let config = Config {
            webhook_url: Some("http://localhost/hook".to_string()),
            ..Config::default()
        };

        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("queue reference"));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let base = Config {
            queue_name: Some("jobs".to_string()),
            webhook_url: Some("http://localhost/hook".to_string()),
            ..Config::default()
        };

        let config = Config { max_in_flight: 0, ..base.clone() };
        assert!(config.validate().is_err());

        let config = Config { wait_time_seconds: 21, ..base.clone() };
        assert!(config.validate().is_err());

        let config = Config { content_type: String::new(), ..base };
        assert!(config.validate().is_err());
    }
}
