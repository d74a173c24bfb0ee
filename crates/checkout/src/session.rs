use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use rdpstore_core::OrderId;
use rdpstore_provisioning::BillingContact;

use crate::billing::{BillingForm, FieldErrors};
use crate::payment::{PaymentDetails, PaymentForm};

/// Where a checkout session currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum CheckoutStep {
    Billing,
    Payment,
    Processing,
    Succeeded { order_id: OrderId },
    Failed { reason: String },
}

impl CheckoutStep {
    pub fn name(&self) -> &'static str {
        match self {
            CheckoutStep::Billing => "billing",
            CheckoutStep::Payment => "payment",
            CheckoutStep::Processing => "processing",
            CheckoutStep::Succeeded { .. } => "succeeded",
            CheckoutStep::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    /// Form input is malformed; nothing happened.
    #[error("invalid input: {0}")]
    Validation(FieldErrors),

    #[error("cart is empty")]
    EmptyCart,

    /// The cart's lines cannot form an order; nothing was charged.
    #[error("cart cannot be ordered: {0}")]
    UnorderableCart(String),

    /// The payment authorizer declined; no order was created.
    #[error("payment declined: {reason}")]
    PaymentRejected { reason: String },

    /// The authorizer could not be reached; no order was created.
    #[error("payment authorizer unavailable: {0}")]
    AuthorizerUnavailable(String),

    #[error("cannot {attempted} while checkout is at '{step}'")]
    InvalidStep {
        step: &'static str,
        attempted: &'static str,
    },

    /// A ticket from another submission was handed back.
    #[error("stale submission ticket")]
    StaleTicket,

    /// Fulfillment ran and failed; the session moved to `Failed`.
    #[error("fulfillment failed: {0}")]
    Fulfillment(String),
}

/// Proof that the session entered `Processing`.
///
/// Issued once per `Payment → Processing` edge and consumed by
/// [`CheckoutSession::complete`] or [`CheckoutSession::fail`]; it is neither
/// `Clone` nor `Copy`, so one ticket can drive at most one fulfillment.
#[derive(Debug)]
pub struct SubmissionTicket {
    submission: u32,
}

impl SubmissionTicket {
    pub fn submission(&self) -> u32 {
        self.submission
    }
}

/// One customer's checkout.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    step: CheckoutStep,
    contact: Option<BillingContact>,
    last_error: Option<String>,
    submissions: u32,
}

impl Default for CheckoutSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckoutSession {
    pub fn new() -> Self {
        Self {
            step: CheckoutStep::Billing,
            contact: None,
            last_error: None,
            submissions: 0,
        }
    }

    pub fn step(&self) -> &CheckoutStep {
        &self.step
    }

    pub fn contact(&self) -> Option<&BillingContact> {
        self.contact.as_ref()
    }

    /// Reason of the last declined authorization or failed fulfillment.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// `Billing → Payment` once every billing field validates.
    pub fn submit_billing(&mut self, form: &BillingForm) -> Result<&BillingContact, CheckoutError> {
        self.expect_step(&[CheckoutStep::Billing], "submit billing")?;
        let contact = form.validate().map_err(CheckoutError::Validation)?;
        self.step = CheckoutStep::Payment;
        Ok(self.contact.insert(contact))
    }

    /// `Payment → Billing` (the billing form stays filled in).
    pub fn edit_billing(&mut self) -> Result<(), CheckoutError> {
        self.expect_step(&[CheckoutStep::Payment], "edit billing")?;
        self.step = CheckoutStep::Billing;
        Ok(())
    }

    /// Format-check the card. Does not change the step.
    pub fn validate_payment(
        &self,
        form: &PaymentForm,
        today: NaiveDate,
    ) -> Result<PaymentDetails, CheckoutError> {
        self.expect_step(&[CheckoutStep::Payment], "submit payment")?;
        form.validate(today).map_err(CheckoutError::Validation)
    }

    /// The authorizer declined: stay in `Payment`.
    pub fn payment_rejected(&mut self, reason: impl Into<String>) -> Result<(), CheckoutError> {
        self.expect_step(&[CheckoutStep::Payment], "record a declined payment")?;
        self.last_error = Some(reason.into());
        Ok(())
    }

    /// The authorizer accepted: `Payment → Processing`.
    pub fn authorization_accepted(&mut self) -> Result<SubmissionTicket, CheckoutError> {
        self.expect_step(&[CheckoutStep::Payment], "start processing")?;
        if self.contact.is_none() {
            return Err(CheckoutError::InvalidStep {
                step: self.step.name(),
                attempted: "start processing without billing details",
            });
        }
        self.submissions += 1;
        self.last_error = None;
        self.step = CheckoutStep::Processing;
        Ok(SubmissionTicket {
            submission: self.submissions,
        })
    }

    /// Fulfillment finished: `Processing → Succeeded`.
    pub fn complete(&mut self, ticket: SubmissionTicket, order_id: OrderId) -> Result<(), CheckoutError> {
        self.redeem(&ticket)?;
        self.step = CheckoutStep::Succeeded { order_id };
        Ok(())
    }

    /// Fulfillment errored: `Processing → Failed`. Never retried automatically.
    pub fn fail(&mut self, ticket: SubmissionTicket, reason: impl Into<String>) -> Result<(), CheckoutError> {
        self.redeem(&ticket)?;
        let reason = reason.into();
        self.last_error = Some(reason.clone());
        self.step = CheckoutStep::Failed { reason };
        Ok(())
    }

    /// `Failed → Payment`, letting the customer try again.
    pub fn retry_payment(&mut self) -> Result<(), CheckoutError> {
        if !matches!(self.step, CheckoutStep::Failed { .. }) {
            return Err(CheckoutError::InvalidStep {
                step: self.step.name(),
                attempted: "retry payment",
            });
        }
        self.step = CheckoutStep::Payment;
        Ok(())
    }

    fn redeem(&self, ticket: &SubmissionTicket) -> Result<(), CheckoutError> {
        self.expect_step(&[CheckoutStep::Processing], "finish processing")?;
        if ticket.submission != self.submissions {
            return Err(CheckoutError::StaleTicket);
        }
        Ok(())
    }

    fn expect_step(&self, allowed: &[CheckoutStep], attempted: &'static str) -> Result<(), CheckoutError> {
        if allowed.contains(&self.step) {
            Ok(())
        } else {
            Err(CheckoutError::InvalidStep {
                step: self.step.name(),
                attempted,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn billing() -> BillingForm {
        BillingForm {
            full_name: "Grace Hopper".to_string(),
            email: "grace@example.com".to_string(),
            address_line1: "1 Navy Way".to_string(),
            address_line2: None,
            city: "Arlington".to_string(),
            postal_code: "22202".to_string(),
            country: "US".to_string(),
            phone: None,
        }
    }

    fn card() -> PaymentForm {
        PaymentForm {
            cardholder: "Grace Hopper".to_string(),
            card_number: "4242424242424242".to_string(),
            expiry: "01/30".to_string(),
            cvc: "321".to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()
    }

    fn at_payment() -> CheckoutSession {
        let mut session = CheckoutSession::new();
        session.submit_billing(&billing()).unwrap();
        session
    }

    #[test]
    fn invalid_billing_stays_in_billing_with_field_errors() {
        let mut session = CheckoutSession::new();
        let mut form = billing();
        form.email = "nope".to_string();

        let err = session.submit_billing(&form).unwrap_err();
        match err {
            CheckoutError::Validation(fields) => assert!(fields.has("email")),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(session.step(), &CheckoutStep::Billing);
    }

    #[test]
    fn happy_path_reaches_succeeded() {
        let mut session = at_payment();
        assert_eq!(session.step(), &CheckoutStep::Payment);
        session.validate_payment(&card(), today()).unwrap();

        let ticket = session.authorization_accepted().unwrap();
        assert_eq!(session.step(), &CheckoutStep::Processing);

        let order_id = OrderId::new();
        session.complete(ticket, order_id).unwrap();
        assert_eq!(session.step(), &CheckoutStep::Succeeded { order_id });
    }

    #[test]
    fn payment_can_return_to_billing() {
        let mut session = at_payment();
        session.edit_billing().unwrap();
        assert_eq!(session.step(), &CheckoutStep::Billing);
        assert!(session.contact().is_some());
    }

    #[test]
    fn declined_payment_stays_in_payment() {
        let mut session = at_payment();
        session.payment_rejected("insufficient funds").unwrap();
        assert_eq!(session.step(), &CheckoutStep::Payment);
        assert_eq!(session.last_error(), Some("insufficient funds"));
    }

    #[test]
    fn processing_is_entered_once_per_submission() {
        let mut session = at_payment();
        let _ticket = session.authorization_accepted().unwrap();
        let err = session.authorization_accepted().unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidStep { step: "processing", .. }));
    }

    #[test]
    fn failed_can_retry_but_succeeded_is_final() {
        let mut session = at_payment();
        let ticket = session.authorization_accepted().unwrap();
        session.fail(ticket, "store unavailable").unwrap();
        assert!(matches!(session.step(), CheckoutStep::Failed { .. }));

        session.retry_payment().unwrap();
        let ticket = session.authorization_accepted().unwrap();
        assert_eq!(ticket.submission(), 2);
        session.complete(ticket, OrderId::new()).unwrap();

        assert!(session.retry_payment().is_err());
        assert!(session.authorization_accepted().is_err());
        assert!(session.edit_billing().is_err());
    }

    #[test]
    fn stale_ticket_is_refused() {
        let mut session = at_payment();
        let first = session.authorization_accepted().unwrap();
        session.fail(first, "boom").unwrap();
        session.retry_payment().unwrap();
        let _second = session.authorization_accepted().unwrap();

        let forged = SubmissionTicket { submission: 1 };
        assert_eq!(
            session.complete(forged, OrderId::new()),
            Err(CheckoutError::StaleTicket)
        );
    }

    #[test]
    fn payment_before_billing_is_refused() {
        let session = CheckoutSession::new();
        assert!(matches!(
            session.validate_payment(&card(), today()),
            Err(CheckoutError::InvalidStep { step: "billing", .. })
        ));
    }
}
