use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use rdpstore_core::InstanceId;
use rdpstore_infra::store::InstanceStore;

use crate::app::{dto, errors, services::AppServices};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_instances))
        .route("/:id", get(get_instance))
        .route("/:id/start", post(start_instance))
        .route("/:id/shutdown", post(shutdown_instance))
        .route("/:id/restart", post(restart_instance))
        .route("/:id/credentials", put(update_credentials))
        .route("/:id/logs", get(instance_logs))
}

fn parse_id(raw: &str) -> Result<InstanceId, axum::response::Response> {
    raw.parse().map_err(|_| errors::invalid_id("instance"))
}

pub async fn list_instances(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.store.list_instances_by_owner(principal.owner_id()).await {
        Ok(list) => Json(list.iter().map(dto::InstanceResponse::from).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_instance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.lifecycle.instance(principal.customer(), id).await {
        Ok(i) => Json(dto::InstanceResponse::from(&i)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn start_instance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.lifecycle.start(principal.customer(), id).await {
        Ok(i) => Json(dto::InstanceResponse::from(&i)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn shutdown_instance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.lifecycle.shutdown(principal.customer(), id).await {
        Ok(i) => Json(dto::InstanceResponse::from(&i)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

/// Answers `202` with the instance in `restarting`; it settles in the background.
pub async fn restart_instance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.lifecycle.restart(principal.customer(), id).await {
        Ok(handle) => (StatusCode::ACCEPTED, Json(dto::InstanceResponse::from(&handle.instance))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn update_credentials(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateCredentialsRequest>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services
        .lifecycle
        .update_credentials(principal.customer(), id, body.username, body.password)
        .await
    {
        Ok(i) => Json(dto::InstanceResponse::from(&i)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn instance_logs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.lifecycle.logs(principal.customer(), id).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}
