//! Checkout state machine.
//!
//! `Billing → Payment → Processing → {Succeeded, Failed}`. The session owns no
//! persistent state; it only gates when fulfillment may run. The async driver
//! that talks to the payment authorizer and the fulfillment pipeline lives in
//! `rdpstore-infra`.

pub mod billing;
pub mod payment;
pub mod session;

pub use billing::{BillingForm, FieldError, FieldErrors};
pub use payment::{PaymentDetails, PaymentForm};
pub use session::{CheckoutError, CheckoutSession, CheckoutStep, SubmissionTicket};
