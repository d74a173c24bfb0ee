use axum::{Router, routing::get};

pub mod admin;
pub mod catalog;
pub mod checkout;
pub mod common;
pub mod instances;
pub mod orders;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/catalog", catalog::router())
        .nest("/checkout", checkout::router())
        .nest("/orders", orders::router())
        .nest("/instances", instances::router())
        .nest("/admin", admin::router())
}
