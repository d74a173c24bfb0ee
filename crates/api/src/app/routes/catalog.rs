use std::sync::Arc;

use axum::{Extension, Json, Router, response::IntoResponse, routing::post};

use rdpstore_catalog::PlanConfiguration;

use crate::app::{dto, errors, services::AppServices};

pub fn router() -> Router {
    Router::new().route("/quote", post(quote))
}

/// Price one configuration without touching any state.
pub async fn quote(
    Extension(services): Extension<Arc<AppServices>>,
    Json(config): Json<PlanConfiguration>,
) -> axum::response::Response {
    match services.prices.resolve(&config) {
        Ok(line) => Json(dto::QuoteResponse::new(&line, &services.currency)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
