//! Per-call overrides and default metadata.

use serde_json::{Map, Value};
use std::time::Duration;

/// Metadata applied to every transaction unless a call overrides it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultMetadata {
    /// Agent identifier.
    pub agent_id: Option<String>,
    /// Agent display name.
    pub agent_name: Option<String>,
    /// Service name.
    pub service_name: Option<String>,
    /// Trace identifier.
    pub trace_id: Option<String>,
}

/// Per-call overrides, passed alongside a request rather than attached to it.
///
/// # Example
///
/// ```rust
/// use txguard_client::CallContext;
///
/// let ctx = CallContext::new()
///     .service_name("weather")
///     .action_name("forecast")
///     .qualifier("region", "eu");
///
/// assert_eq!(ctx.service_name.as_deref(), Some("weather"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallContext {
    /// Service name override.
    pub service_name: Option<String>,
    /// Action name override.
    pub action_name: Option<String>,
    /// Resource name override.
    pub resource_name: Option<String>,
    /// Trace identifier override.
    pub trace_id: Option<String>,
    /// Agent identifier override.
    pub agent_id: Option<String>,
    /// Agent name override.
    pub agent_name: Option<String>,
    /// Opaque policy context.
    pub qualifiers: Map<String, Value>,
    /// Send the call without authorization.
    pub skip_authorization: bool,
    /// Poll interval override.
    pub poll_interval: Option<Duration>,
    /// Poll timeout override.
    pub poll_timeout: Option<Duration>,
}

impl CallContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service name.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Sets the action name.
    pub fn action_name(mut self, name: impl Into<String>) -> Self {
        self.action_name = Some(name.into());
        self
    }

    /// Sets the resource name.
    pub fn resource_name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }

    /// Sets the trace identifier.
    pub fn trace_id(mut self, id: impl Into<String>) -> Self {
        self.trace_id = Some(id.into());
        self
    }

    /// Sets the agent identifier.
    pub fn agent_id(mut self, id: impl Into<String>) -> Self {
        self.agent_id = Some(id.into());
        self
    }

    /// Sets the agent name.
    pub fn agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = Some(name.into());
        self
    }

    /// Adds a qualifier.
    pub fn qualifier(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.qualifiers.insert(key.into(), value.into());
        self
    }

    /// Skips authorization for this call.
    pub fn skip_authorization(mut self) -> Self {
        self.skip_authorization = true;
        self
    }

    /// Overrides the poll interval for this call.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Overrides the poll timeout for this call.
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    /// Merges this context over the configured defaults.
    pub fn resolve(&self, defaults: &DefaultMetadata) -> ResolvedContext {
        ResolvedContext {
            service_name: self
                .service_name
                .clone()
                .or_else(|| defaults.service_name.clone()),
            action_name: self.action_name.clone(),
            resource_name: self.resource_name.clone(),
            trace_id: self.trace_id.clone().or_else(|| defaults.trace_id.clone()),
            agent_id: self.agent_id.clone().or_else(|| defaults.agent_id.clone()),
            agent_name: self
                .agent_name
                .clone()
                .or_else(|| defaults.agent_name.clone()),
            qualifiers: self.qualifiers.clone(),
            skip_authorization: self.skip_authorization,
            poll_interval: self.poll_interval,
            poll_timeout: self.poll_timeout,
            call_site: None,
        }
    }
}

/// Call context after merging with defaults, as seen by the interceptors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedContext {
    /// Service name.
    pub service_name: Option<String>,
    /// Action name.
    pub action_name: Option<String>,
    /// Resource name.
    pub resource_name: Option<String>,
    /// Trace identifier.
    pub trace_id: Option<String>,
    /// Agent identifier.
    pub agent_id: Option<String>,
    /// Agent name.
    pub agent_name: Option<String>,
    /// Opaque policy context.
    pub qualifiers: Map<String, Value>,
    /// Send the call without authorization.
    pub skip_authorization: bool,
    /// Poll interval override.
    pub poll_interval: Option<Duration>,
    /// Poll timeout override.
    pub poll_timeout: Option<Duration>,
    /// Caller source location, for diagnostics.
    pub call_site: Option<String>,
}

impl ResolvedContext {
    /// Records the caller's source location.
    pub fn with_call_site(mut self, call_site: impl Into<String>) -> Self {
        self.call_site = Some(call_site.into());
        self
    }
}
