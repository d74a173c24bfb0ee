//! Admin guard for `/admin/*`.
//!
//! Runs after [`crate::middleware::auth_middleware`], so a principal is
//! always present when the token was valid.

use axum::{http::StatusCode, middleware::Next, response::Response};

use rdpstore_auth::{Role, require_role};

use crate::app::errors;
use crate::context::PrincipalContext;

pub async fn admin_only(req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let Some(principal) = req.extensions().get::<PrincipalContext>() else {
        return errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "missing principal");
    };

    if let Err(e) = require_role(principal.roles(), &Role::admin()) {
        tracing::warn!(owner_id = %principal.owner_id(), "admin route refused");
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    next.run(req).await
}
