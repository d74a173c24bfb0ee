//! Infrastructure layer: persistence, external capabilities and the services
//! that drive the fulfillment workflow over them.

pub mod admin;
pub mod checkout;
pub mod config;
pub mod lifecycle;
pub mod notifier;
pub mod payment;
pub mod pipeline;
pub mod provisioner;
pub mod reconcile;
pub mod store;

pub use admin::{AdminError, AdminOrderControl, StatusChange};
pub use checkout::CheckoutFlow;
pub use config::{AppConfig, ConfigError};
pub use lifecycle::{Actor, InstanceLifecycleManager, LifecycleError, LifecycleSettings, RestartHandle};
pub use notifier::{Document, InMemoryNotifier, LoggingNotifier, Notifier, NotifyError};
pub use payment::{AuthorizationDecision, PaymentAuthorizer, PaymentError, SandboxAuthorizer};
pub use pipeline::{Fulfillment, FulfillmentError, FulfillmentPipeline, PipelineSettings};
pub use provisioner::{Provisioner, SandboxProvisioner};
pub use reconcile::{Reconciler, ReconcileError, ResumeReport};
pub use store::{InMemoryStore, Persistence};
