//! Transaction records returned by the authorization gateway.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Authorization state of a transaction.
///
/// `denied` and `cancelled` never change once reached; `authorized` does not
/// revert for the lifetime of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// The backend is still assembling the decision context.
    Preparing,
    /// Waiting on a decision.
    Pending,
    /// The call may proceed.
    Authorized,
    /// The call was refused.
    Denied,
    /// The transaction was withdrawn.
    Cancelled,
}

impl TransactionStatus {
    /// Returns true for statuses that end polling.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Preparing | TransactionStatus::Pending)
    }

    /// Returns true for `denied` and `cancelled`.
    pub fn is_denial(&self) -> bool {
        matches!(self, TransactionStatus::Denied | TransactionStatus::Cancelled)
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Preparing => "preparing",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Authorized => "authorized",
            TransactionStatus::Denied => "denied",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment data attached to a transaction after reauthorization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayment {
    /// Proof of payment to forward to the destination, either text or a
    /// structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_payload: Option<Value>,
}

/// Workflow trace a transaction belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    /// Backend trace identifier.
    pub id: String,
    /// Caller-supplied external identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

/// The backend's authorization/payment record for one outbound call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Transaction identifier.
    pub id: String,
    /// Current status.
    pub status: TransactionStatus,
    /// Payment data, present once payment has been authorized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<TransactionPayment>,
    /// Trace grouping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Trace>,
    /// Service inferred by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// Action inferred by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_name: Option<String>,
    /// Resource inferred by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    /// Opaque policy context.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub qualifiers: Map<String, Value>,
}

impl Transaction {
    /// Creates a bare transaction with the given status.
    pub fn new(id: impl Into<String>, status: TransactionStatus) -> Self {
        Self {
            id: id.into(),
            status,
            payment: None,
            trace: None,
            service_name: None,
            action_name: None,
            resource_name: None,
            qualifiers: Map::new(),
        }
    }

    /// Attaches a payment authorization payload.
    pub fn with_payment_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payment = Some(TransactionPayment {
            authorization_payload: Some(payload.into()),
        });
        self
    }

    /// Returns the payment authorization payload, if any.
    pub fn authorization_payload(&self) -> Option<&Value> {
        self.payment
            .as_ref()
            .and_then(|p| p.authorization_payload.as_ref())
            .filter(|v| !v.is_null())
    }
}
