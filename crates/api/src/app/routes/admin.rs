//! Admin panel: order status control, instance overrides, audit stream and
//! reconciliation.
//!
//! Every route here sits behind [`crate::authz::admin_only`].

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;

use rdpstore_core::{InstanceId, OrderId};
use rdpstore_infra::Actor;
use rdpstore_infra::store::LogStore;

use crate::app::routes::common;
use crate::app::{dto, errors, services::AppServices};

const DEFAULT_LOG_LIMIT: usize = 100;
const MAX_LOG_LIMIT: usize = 1000;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/orders", post(create_manual_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", put(set_order_status))
        .route("/orders/:id/resend-credentials", post(resend_credentials))
        .route("/orders/:id/resume", post(resume_order))
        .route("/instances/:id/status", put(set_instance_status))
        .route("/instances/:id/provisioned", post(mark_provisioned))
        .route("/logs", get(recent_logs))
        .route("/reconciliation", get(stalled_orders))
        .route("/reconciliation/sweep", post(sweep))
        .layer(axum::middleware::from_fn(crate::authz::admin_only))
}

fn parse_order_id(raw: &str) -> Result<OrderId, axum::response::Response> {
    raw.parse().map_err(|_| errors::invalid_id("order"))
}

fn parse_instance_id(raw: &str) -> Result<InstanceId, axum::response::Response> {
    raw.parse().map_err(|_| errors::invalid_id("instance"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Orders
// ─────────────────────────────────────────────────────────────────────────────

pub async fn create_manual_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ManualOrderRequest>,
) -> axum::response::Response {
    let lines = match common::price_lines(&services.prices, &body.lines) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let contact = match body.billing.validate() {
        Ok(c) => c,
        Err(fields) => return errors::field_errors(&fields),
    };

    match services.admin.create_manual_order(body.owner_id, lines, contact).await {
        Ok(order) => (StatusCode::CREATED, Json(dto::OrderResponse::from(&order))).into_response(),
        Err(e) => errors::admin_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.admin.order(id).await {
        Ok(order) => Json(dto::OrderResponse::from(&order)).into_response(),
        Err(e) => errors::admin_error_to_response(e),
    }
}

pub async fn set_order_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::OrderStatusRequest>,
) -> axum::response::Response {
    let id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.admin.set_order_status(id, body.status).await {
        Ok(change) => Json(dto::FulfillmentResponse::new(&change.order, &change.created_instances)).into_response(),
        Err(e) => errors::admin_error_to_response(e),
    }
}

pub async fn resend_credentials(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.admin.resend_credentials(id).await {
        Ok(_) => StatusCode::ACCEPTED.into_response(),
        Err(e) => errors::admin_error_to_response(e),
    }
}

pub async fn resume_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.reconciler.resume(id).await {
        Ok(report) => Json(dto::ResumeResponse::from(&report)).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}

pub async fn stalled_orders(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.reconciler.stalled_orders(Utc::now()).await {
        Ok(orders) => Json(orders.iter().map(dto::OrderResponse::from).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}

/// Resume every stalled order past the grace period.
pub async fn sweep(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.reconciler.sweep(Utc::now()).await {
        Ok(reports) => Json(reports.iter().map(dto::ResumeResponse::from).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Instances and audit log
// ─────────────────────────────────────────────────────────────────────────────

pub async fn set_instance_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::InstanceStatusRequest>,
) -> axum::response::Response {
    let id = match parse_instance_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.lifecycle.set_status(Actor::Admin, id, body.status).await {
        Ok(i) => Json(dto::InstanceResponse::from(&i)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

/// Provisioner callback.
pub async fn mark_provisioned(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ProvisionedRequest>,
) -> axum::response::Response {
    let id = match parse_instance_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.lifecycle.mark_provisioned(id, body.ip_address).await {
        Ok(i) => Json(dto::InstanceResponse::from(&i)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn recent_logs(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<dto::LogsQuery>,
) -> axum::response::Response {
    let limit = q.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);
    match services.store.recent_logs(limit).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
