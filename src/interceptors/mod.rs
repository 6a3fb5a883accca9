//! Interception layer wrapped around every guarded call.
//!
//! Order on a single call path: authorization, the network call, payment
//! negotiation when the destination answers 402, then completion reporting.

mod authorization;
mod payment;
mod policy;

pub use authorization::AuthorizationInterceptor;
pub use payment::{PaymentInterceptor, PaymentOutcome};
pub use policy::{FailureMode, FailurePolicy};
