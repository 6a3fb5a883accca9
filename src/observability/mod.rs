//! Observability module for the txguard client.
//!
//! Provides logging setup and metrics collection for monitoring guarded
//! calls. Spans and events are emitted through `tracing`.

mod logging;
mod metrics;

pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use metrics::{DefaultMetricsCollector, GuardMetrics, MetricsCollector};
