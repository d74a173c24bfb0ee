use std::sync::Arc;

use axum::{Extension, Json, Router, http::StatusCode, response::IntoResponse, routing::post};

use rdpstore_cart::Cart;
use rdpstore_checkout::CheckoutSession;

use crate::app::routes::common;
use crate::app::{dto, errors, services::AppServices};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route("/", post(checkout))
}

/// One-shot checkout: billing, payment and cart in a single request.
///
/// The session and cart live for the duration of the request only.
pub async fn checkout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CheckoutRequest>,
) -> axum::response::Response {
    let lines = match common::price_lines(&services.prices, &body.lines) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let mut cart = Cart::new();
    for line in lines {
        cart.add_item(line);
    }

    let mut session = CheckoutSession::new();
    if let Err(e) = session.submit_billing(&body.billing) {
        return errors::checkout_error_to_response(e);
    }

    match services
        .checkout
        .submit_payment(&mut session, &mut cart, principal.owner_id(), &body.payment)
        .await
    {
        Ok(done) => (
            StatusCode::CREATED,
            Json(dto::FulfillmentResponse::new(&done.order, &done.instances)),
        )
            .into_response(),
        Err(e) => errors::checkout_error_to_response(e),
    }
}
