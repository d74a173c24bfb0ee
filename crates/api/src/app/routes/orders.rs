use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::Path,
    response::IntoResponse,
    routing::get,
};

use rdpstore_core::OrderId;
use rdpstore_infra::store::OrderStore;

use crate::app::{dto, errors, services::AppServices};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.store.list_orders_by_owner(principal.owner_id()).await {
        Ok(orders) => Json(orders.iter().map(dto::OrderResponse::from).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(id) = id.parse::<OrderId>() else {
        return errors::invalid_id("order");
    };

    match services.store.get_order(id).await {
        Ok(Some(order)) if order.is_owned_by(principal.owner_id()) => {
            Json(dto::OrderResponse::from(&order)).into_response()
        }
        Ok(_) => errors::json_error(axum::http::StatusCode::NOT_FOUND, "not_found", "order not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}
