//! HTTP API: customer and admin panels over the fulfillment workflow.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
