pub mod paystack;

pub use paystack::PaystackGateway;

use async_trait::async_trait;
use std::fmt;

/// Failure talking to the payment provider.
///
/// `transient` distinguishes retryable infrastructure trouble (timeouts,
/// connection failures, provider 5xx) from permanent rejections (bad
/// request, unknown reference, declined configuration). The adapter never
/// touches application state either way.
#[derive(Debug, Clone)]
pub struct GatewayError {
    pub transient: bool,
    pub message: String,
}

impl GatewayError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            transient: true,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            transient: false,
            message: message.into(),
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.transient {
            write!(f, "transient gateway error: {}", self.message)
        } else {
            write!(f, "gateway error: {}", self.message)
        }
    }
}

impl std::error::Error for GatewayError {}

/// Inputs for creating a hosted-checkout session. Amounts are minor units.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub reference: String,
    pub email: String,
    pub amount_minor: i64,
    pub currency: String,
}

/// Hosted-checkout session returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializedPayment {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// Result of asking the provider what happened to a transaction.
///
/// `success == false` is a definite answer (declined, abandoned, reversed),
/// not an error; `raw_status` preserves the provider's own wording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub success: bool,
    pub reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub raw_status: String,
}

/// Boundary to the external payment provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a hosted-checkout session for the given reference and amount.
    async fn initialize(&self, request: &PaymentRequest)
        -> Result<InitializedPayment, GatewayError>;

    /// Looks up the definitive state of a transaction by reference.
    async fn verify(&self, reference: &str) -> Result<PaymentOutcome, GatewayError>;
}
