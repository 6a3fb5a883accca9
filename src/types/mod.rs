//! Type definitions shared by the interceptors and the gateway.

pub mod context;
pub mod facts;
pub mod payment;
pub mod request;
pub mod transaction;

pub use context::{CallContext, DefaultMetadata, ResolvedContext};
pub use facts::{
    CompletionOutcome, CompletionReport, CreateTransaction, ErrorFacts, RequestFacts,
    ResponseFacts, UrlFacts,
};
pub use payment::{
    PaymentPreference, PaymentRequiredEnvelope, PaymentRequirement, ReauthorizeWithPayment,
};
pub use request::{BufferedRequest, RequestDescriptor};
pub use transaction::{Trace, Transaction, TransactionPayment, TransactionStatus};
