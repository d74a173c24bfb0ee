//! Orders, instances and their audit trail.
//!
//! This crate holds the deterministic rules of fulfillment: how an order freezes
//! its amount, how an instance computes its expiry, which lifecycle transitions
//! are legal, and how credentials are generated. Persistence and side effects
//! live in `rdpstore-infra`.

pub mod audit;
pub mod credentials;
pub mod instance;
pub mod lifecycle;
pub mod order;

pub use audit::{LogAction, LogStatus, SystemLogEntry};
pub use credentials::{
    CredentialGenerator, Credentials, OsRngCredentialGenerator, Password, validate_username,
};
pub use instance::{Instance, InstanceStatus};
pub use lifecycle::{IllegalTransition, LifecycleAction};
pub use order::{BillingContact, Order, PaymentStatus};
