//! Payment authorizer capability.
//!
//! The authorizer's answer is ground truth: an accepted authorization is never
//! re-checked here, and a rejection is surfaced to the customer verbatim.

use async_trait::async_trait;
use thiserror::Error;

use rdpstore_checkout::PaymentDetails;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationDecision {
    Accepted { reference: String },
    Rejected { reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("authorizer unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PaymentAuthorizer: Send + Sync {
    async fn authorize(
        &self,
        details: &PaymentDetails,
        amount: u64,
        currency: &str,
    ) -> Result<AuthorizationDecision, PaymentError>;
}

/// Card that the sandbox always declines.
pub const SANDBOX_DECLINED_CARD: &str = "4000000000000002";
/// Card that the sandbox declines for insufficient funds.
pub const SANDBOX_INSUFFICIENT_FUNDS_CARD: &str = "4000000000009995";

/// Authorizer for development and tests.
///
/// Declines the two well-known test cards and accepts any other card that
/// passed format validation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SandboxAuthorizer;

#[async_trait]
impl PaymentAuthorizer for SandboxAuthorizer {
    async fn authorize(
        &self,
        details: &PaymentDetails,
        amount: u64,
        currency: &str,
    ) -> Result<AuthorizationDecision, PaymentError> {
        let decision = match details.card_number.as_str() {
            SANDBOX_DECLINED_CARD => AuthorizationDecision::Rejected {
                reason: "card declined".to_string(),
            },
            SANDBOX_INSUFFICIENT_FUNDS_CARD => AuthorizationDecision::Rejected {
                reason: "insufficient funds".to_string(),
            },
            _ => AuthorizationDecision::Accepted {
                reference: format!("sandbox-{}", uuid::Uuid::now_v7()),
            },
        };

        tracing::debug!(
            last4 = %details.last4(),
            amount,
            currency,
            accepted = matches!(decision, AuthorizationDecision::Accepted { .. }),
            "sandbox authorization"
        );
        Ok(decision)
    }
}
