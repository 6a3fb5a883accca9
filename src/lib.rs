//! txguard client library
//!
//! Gates outbound HTTP calls behind an external authorization and payment
//! gateway. Before a call leaves the process it is registered as a
//! transaction and held until the gateway authorizes it; if the destination
//! answers `402 Payment Required`, the client negotiates payment on the same
//! transaction, attaches the proof of payment and retries exactly once with a
//! byte-identical body. Every call that carried a transaction is reported
//! back to the gateway in the background.
//!
//! # Features
//!
//! - **Authorization**: create-or-reuse transactions, bounded polling with a
//!   configurable backoff strategy and caller cancellation
//! - **Payments**: 402 envelope parsing, reauthorization, single paid retry
//! - **Body replay**: text, binary, multipart and streaming bodies are captured
//!   once and resent unchanged
//! - **Failure modes**: fail-open (default) or fail-closed on gateway outage;
//!   denials always surface
//! - **Observability**: `tracing` spans and events, guard metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use txguard_client::{CallContext, RequestDescriptor, TxGuardClient, TxGuardConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = TxGuardClient::builder()
//!         .config(
//!             TxGuardConfig::builder()
//!                 .gateway_url("https://gateway.example.com/v1")
//!                 .api_key("tg_live_key")
//!                 .build()?,
//!         )
//!         .build()?;
//!
//!     let response = client
//!         .execute(
//!             RequestDescriptor::post("https://api.example.com/premium").with_text("query"),
//!             CallContext::new().action_name("lookup"),
//!         )
//!         .await?;
//!
//!     println!("{} {}", response.status, response.text());
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod body;
pub mod client;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod headers;
pub mod interceptors;
pub mod mocks;
pub mod observability;
pub mod polling;
pub mod reporting;
pub mod transport;
pub mod types;

pub use auth::{ApiKeyAuth, AuthProvider, NoAuth};
pub use body::{MultipartForm, MultipartPart, ReplayableBody, RequestBody};
pub use client::{TxGuardClient, TxGuardClientBuilder};
pub use config::{TxGuardConfig, TxGuardConfigBuilder};
pub use errors::{GatewayOperation, TxGuardError, TxGuardResult};
pub use gateway::{HttpTransactionGateway, TransactionGateway};
pub use headers::{PAYMENT_HEADER, TRANSACTION_ID_HEADER};
pub use interceptors::{
    AuthorizationInterceptor, FailureMode, FailurePolicy, PaymentInterceptor, PaymentOutcome,
};
pub use observability::{DefaultMetricsCollector, GuardMetrics, MetricsCollector};
pub use polling::{PollConfig, PollResult, PollStrategy, TransactionPoller};
pub use reporting::CompletionReporter;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use types::{
    BufferedRequest, CallContext, CompletionOutcome, CompletionReport, DefaultMetadata,
    PaymentRequiredEnvelope, PaymentRequirement, RequestDescriptor, Transaction,
    TransactionStatus,
};
