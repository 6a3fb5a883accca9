//! Payment-required envelope carried by 402 responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a 402 response describing acceptable payment methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredEnvelope {
    /// Protocol version.
    pub x402_version: u32,
    /// Human-readable reason supplied by the destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Accepted payment methods.
    pub accepts: Vec<PaymentRequirement>,
}

/// One accepted payment method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    /// Payment scheme (e.g. `exact`).
    pub scheme: String,
    /// Settlement network.
    pub network: String,
    /// Required amount in the asset's base units.
    pub max_amount_required: String,
    /// Resource being paid for.
    pub resource: String,
    /// Destination address.
    pub pay_to: String,
    /// Asset identifier.
    pub asset: String,
    /// Resource description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the paid resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Validity window of a payment, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
    /// Scheme-specific data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Network/scheme preference used to choose among accepted methods.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentPreference {
    /// Preferred settlement network.
    pub network: Option<String>,
    /// Preferred payment scheme.
    pub scheme: Option<String>,
}

impl PaymentPreference {
    fn matches(&self, requirement: &PaymentRequirement) -> bool {
        self.network
            .as_deref()
            .map_or(true, |n| n == requirement.network)
            && self
                .scheme
                .as_deref()
                .map_or(true, |s| s == requirement.scheme)
    }
}

impl PaymentRequiredEnvelope {
    /// Parses an envelope from a response body.
    ///
    /// Returns `None` for anything that is not a usable envelope, including an
    /// envelope with no accepted methods.
    pub fn parse(body: &[u8]) -> Option<Self> {
        let envelope: Self = serde_json::from_slice(body).ok()?;
        if envelope.accepts.is_empty() {
            return None;
        }
        Some(envelope)
    }

    /// Chooses the requirement to negotiate: the first one matching the
    /// preference, falling back to the first accepted method.
    pub fn select(&self, preference: &PaymentPreference) -> Option<&PaymentRequirement> {
        self.accepts
            .iter()
            .find(|r| preference.matches(r))
            .or_else(|| self.accepts.first())
    }
}

/// Body of a reauthorization request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReauthorizeWithPayment {
    /// Protocol version of the envelope the requirement came from.
    pub x402_version: u32,
    /// The chosen payment method.
    pub payment_requirement: PaymentRequirement,
}
