//! Async driver for the checkout state machine.
//!
//! Glues a [`CheckoutSession`] to the payment authorizer and the fulfillment
//! pipeline. The session's submission ticket is taken only after the
//! authorizer accepted, and handed back exactly once, so each accepted
//! submission runs the pipeline at most once.

use std::sync::Arc;

use chrono::Utc;

use rdpstore_cart::Cart;
use rdpstore_checkout::{CheckoutError, CheckoutSession, PaymentForm};
use rdpstore_core::OwnerId;
use rdpstore_provisioning::Order;

use crate::payment::{AuthorizationDecision, PaymentAuthorizer, PaymentError};
use crate::pipeline::{Fulfillment, FulfillmentPipeline};

#[derive(Clone)]
pub struct CheckoutFlow {
    authorizer: Arc<dyn PaymentAuthorizer>,
    pipeline: FulfillmentPipeline,
}

impl CheckoutFlow {
    pub fn new(authorizer: Arc<dyn PaymentAuthorizer>, pipeline: FulfillmentPipeline) -> Self {
        Self { authorizer, pipeline }
    }

    /// Validate the card, authorize the cart total and fulfill on acceptance.
    ///
    /// Carts that cannot form an order are refused before the authorizer is
    /// asked, so no card is charged for them.
    ///
    /// On success the session is `Succeeded` and the cart is cleared. A
    /// declined or unreachable authorizer leaves the session in `Payment`; a
    /// fulfillment error moves it to `Failed`.
    pub async fn submit_payment(
        &self,
        session: &mut CheckoutSession,
        cart: &mut Cart,
        owner_id: OwnerId,
        form: &PaymentForm,
    ) -> Result<Fulfillment, CheckoutError> {
        let details = session.validate_payment(form, Utc::now().date_naive())?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let contact = session.contact().cloned().ok_or(CheckoutError::InvalidStep {
            step: session.step().name(),
            attempted: "submit payment without billing details",
        })?;

        let snapshot = cart.snapshot();
        Order::check_lines(snapshot.lines()).map_err(|err| CheckoutError::UnorderableCart(err.to_string()))?;
        let currency = &self.pipeline.settings().currency;

        match self.authorizer.authorize(&details, snapshot.total(), currency).await {
            Ok(AuthorizationDecision::Accepted { reference }) => {
                tracing::info!(%owner_id, %reference, amount = snapshot.total(), "payment authorized");
            }
            Ok(AuthorizationDecision::Rejected { reason }) => {
                tracing::info!(%owner_id, %reason, "payment declined");
                session.payment_rejected(reason.clone())?;
                return Err(CheckoutError::PaymentRejected { reason });
            }
            Err(PaymentError::Unavailable(msg)) => {
                tracing::warn!(%owner_id, error = %msg, "payment authorizer unavailable");
                return Err(CheckoutError::AuthorizerUnavailable(msg));
            }
        }

        let ticket = session.authorization_accepted()?;
        match self.pipeline.fulfill(owner_id, &snapshot, &contact).await {
            Ok(fulfillment) => {
                session.complete(ticket, fulfillment.order.id)?;
                cart.clear();
                Ok(fulfillment)
            }
            Err(err) => {
                let reason = err.to_string();
                tracing::error!(%owner_id, error = %reason, "fulfillment failed");
                session.fail(ticket, reason.clone())?;
                Err(CheckoutError::Fulfillment(reason))
            }
        }
    }
}
