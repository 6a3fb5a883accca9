//! Configuration module for the txguard client.
//!
//! Configuration is built once per client instance and is read-only after
//! that; every interceptor call receives it by reference.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use crate::errors::{TxGuardError, TxGuardResult};
use crate::interceptors::FailureMode;
use crate::polling::{PollConfig, PollStrategy};
use crate::types::{DefaultMetadata, PaymentPreference};

/// Default timeout for gateway calls (10 seconds).
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the completion report queue.
pub const DEFAULT_COMPLETION_QUEUE_CAPACITY: usize = 256;

/// Configuration for the txguard client.
#[derive(Clone)]
pub struct TxGuardConfig {
    /// Base URL of the authorization gateway.
    pub gateway_url: Option<String>,
    /// API key for the gateway (stored securely).
    pub(crate) api_key: Option<SecretString>,
    /// Behavior when the gateway malfunctions.
    pub failure_mode: FailureMode,
    /// Metadata applied to every transaction.
    pub metadata: DefaultMetadata,
    /// Polling settings.
    pub poll: PollConfig,
    /// Preferred payment network/scheme.
    pub payment_preference: PaymentPreference,
    /// Timeout for each gateway call.
    pub gateway_timeout: Duration,
    /// Capacity of the completion report queue.
    pub completion_queue_capacity: usize,
}

impl TxGuardConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> TxGuardConfigBuilder {
        TxGuardConfigBuilder::new()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TXGUARD_GATEWAY_URL`: gateway base URL
    /// - `TXGUARD_API_KEY`: gateway API key
    /// - `TXGUARD_FAILURE_MODE`: `open` (default) or `closed`
    /// - `TXGUARD_POLL_INTERVAL_MS` / `TXGUARD_POLL_TIMEOUT_MS`: polling bounds
    /// - `TXGUARD_AGENT_ID`, `TXGUARD_AGENT_NAME`, `TXGUARD_SERVICE_NAME`,
    ///   `TXGUARD_TRACE_ID`: default metadata
    pub fn from_env() -> TxGuardResult<Self> {
        let mut builder = TxGuardConfigBuilder::new();

        if let Ok(url) = std::env::var("TXGUARD_GATEWAY_URL") {
            builder = builder.gateway_url(url);
        }

        if let Ok(key) = std::env::var("TXGUARD_API_KEY") {
            builder = builder.api_key(key);
        }

        if let Ok(mode) = std::env::var("TXGUARD_FAILURE_MODE") {
            builder = builder.failure_mode(mode.parse()?);
        }

        if let Some(ms) = env_millis("TXGUARD_POLL_INTERVAL_MS")? {
            builder = builder.poll_interval(ms);
        }

        if let Some(ms) = env_millis("TXGUARD_POLL_TIMEOUT_MS")? {
            builder = builder.poll_timeout(ms);
        }

        if let Ok(v) = std::env::var("TXGUARD_AGENT_ID") {
            builder = builder.agent_id(v);
        }
        if let Ok(v) = std::env::var("TXGUARD_AGENT_NAME") {
            builder = builder.agent_name(v);
        }
        if let Ok(v) = std::env::var("TXGUARD_SERVICE_NAME") {
            builder = builder.service_name(v);
        }
        if let Ok(v) = std::env::var("TXGUARD_TRACE_ID") {
            builder = builder.trace_id(v);
        }

        builder.build()
    }

    /// Returns the gateway API key (exposing the secret).
    pub(crate) fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.expose_secret().as_str())
    }

    /// Returns the API key hint (last 4 characters) for debugging.
    pub fn api_key_hint(&self) -> Option<String> {
        self.api_key.as_ref().map(|key| {
            let key = key.expose_secret();
            if key.len() > 4 {
                format!("...{}", &key[key.len() - 4..])
            } else {
                "****".to_string()
            }
        })
    }
}

impl Default for TxGuardConfig {
    fn default() -> Self {
        Self {
            gateway_url: None,
            api_key: None,
            failure_mode: FailureMode::default(),
            metadata: DefaultMetadata::default(),
            poll: PollConfig::default(),
            payment_preference: PaymentPreference::default(),
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
            completion_queue_capacity: DEFAULT_COMPLETION_QUEUE_CAPACITY,
        }
    }
}

impl std::fmt::Debug for TxGuardConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxGuardConfig")
            .field("gateway_url", &self.gateway_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("failure_mode", &self.failure_mode)
            .field("metadata", &self.metadata)
            .field("poll", &self.poll)
            .field("gateway_timeout", &self.gateway_timeout)
            .finish()
    }
}

fn env_millis(var: &str) -> TxGuardResult<Option<Duration>> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| TxGuardError::configuration(format!("{} must be a number of milliseconds", var))),
        Err(_) => Ok(None),
    }
}

/// Builder for `TxGuardConfig`.
#[derive(Default)]
pub struct TxGuardConfigBuilder {
    gateway_url: Option<String>,
    api_key: Option<String>,
    failure_mode: Option<FailureMode>,
    metadata: DefaultMetadata,
    poll_interval: Option<Duration>,
    poll_timeout: Option<Duration>,
    poll_strategy: Option<PollStrategy>,
    payment_preference: PaymentPreference,
    gateway_timeout: Option<Duration>,
    completion_queue_capacity: Option<usize>,
}

impl TxGuardConfigBuilder {
    /// Creates a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the gateway base URL.
    pub fn gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into());
        self
    }

    /// Sets the gateway API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the failure mode.
    pub fn failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = Some(mode);
        self
    }

    /// Sets the default agent id.
    pub fn agent_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.agent_id = Some(id.into());
        self
    }

    /// Sets the default agent name.
    pub fn agent_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.agent_name = Some(name.into());
        self
    }

    /// Sets the default service name.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.service_name = Some(name.into());
        self
    }

    /// Sets the default trace id.
    pub fn trace_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.trace_id = Some(id.into());
        self
    }

    /// Sets the poll interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Sets the poll timeout.
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    /// Sets the poll backoff strategy.
    pub fn poll_strategy(mut self, strategy: PollStrategy) -> Self {
        self.poll_strategy = Some(strategy);
        self
    }

    /// Prefers a payment network when a 402 offers several.
    pub fn preferred_network(mut self, network: impl Into<String>) -> Self {
        self.payment_preference.network = Some(network.into());
        self
    }

    /// Prefers a payment scheme when a 402 offers several.
    pub fn preferred_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.payment_preference.scheme = Some(scheme.into());
        self
    }

    /// Sets the timeout for gateway calls.
    pub fn gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = Some(timeout);
        self
    }

    /// Sets the completion queue capacity.
    pub fn completion_queue_capacity(mut self, capacity: usize) -> Self {
        self.completion_queue_capacity = Some(capacity);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> TxGuardResult<TxGuardConfig> {
        let gateway_url = match self.gateway_url {
            Some(raw) => {
                let trimmed = raw.trim_end_matches('/').to_string();
                let parsed = url::Url::parse(&trimmed)?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(TxGuardError::configuration(
                        "Gateway URL must use http or https",
                    ));
                }
                if parsed.scheme() == "http" {
                    tracing::warn!(url = %trimmed, "Gateway URL does not use HTTPS");
                }
                Some(trimmed)
            }
            None => None,
        };

        if let Some(key) = &self.api_key {
            if key.is_empty() {
                return Err(TxGuardError::configuration("API key cannot be empty"));
            }
        }

        let defaults = PollConfig::default();
        let poll = PollConfig {
            interval: self.poll_interval.unwrap_or(defaults.interval),
            timeout: self.poll_timeout.unwrap_or(defaults.timeout),
            strategy: self.poll_strategy.unwrap_or(defaults.strategy),
        };
        poll.validate()?;

        let completion_queue_capacity = self
            .completion_queue_capacity
            .unwrap_or(DEFAULT_COMPLETION_QUEUE_CAPACITY);
        if completion_queue_capacity == 0 {
            return Err(TxGuardError::configuration(
                "Completion queue capacity must be greater than zero",
            ));
        }

        Ok(TxGuardConfig {
            gateway_url,
            api_key: self.api_key.map(SecretString::new),
            failure_mode: self.failure_mode.unwrap_or_default(),
            metadata: self.metadata,
            poll,
            payment_preference: self.payment_preference,
            gateway_timeout: self.gateway_timeout.unwrap_or(DEFAULT_GATEWAY_TIMEOUT),
            completion_queue_capacity,
        })
    }
}
