use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use rdpstore_core::{InstanceId, OrderId, OwnerId};
use rdpstore_provisioning::{Credentials, Instance, InstanceStatus, Order, PaymentStatus, SystemLogEntry};

/// Persistence operation error.
///
/// These are **infrastructure errors** as opposed to domain errors
/// (validation, illegal transitions).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} {id} already exists")]
    AlreadyExists { entity: &'static str, id: String },

    /// A conditional write found a different value than expected.
    #[error("conditional write failed: expected '{expected}', found '{actual}'")]
    Conflict { expected: String, actual: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn order_not_found(id: OrderId) -> Self {
        Self::NotFound {
            entity: "order",
            id: id.to_string(),
        }
    }

    pub fn instance_not_found(id: InstanceId) -> Self {
        Self::NotFound {
            entity: "instance",
            id: id.to_string(),
        }
    }
}

/// Fields changed together with a guarded status write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceUpdate {
    pub status: Option<InstanceStatus>,
    pub ip_address: Option<String>,
    pub credentials: Option<Credentials>,
}

impl InstanceUpdate {
    pub fn status(status: InstanceStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn credentials(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Create an order row. Fails if the id already exists.
    async fn insert_order(&self, order: Order) -> Result<Order, StoreError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Orders of one owner, oldest first.
    async fn list_orders_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Order>, StoreError>;

    /// Orders whose provisioning was claimed but which link fewer instances
    /// than they have units.
    async fn list_underprovisioned_orders(&self) -> Result<Vec<Order>, StoreError>;

    /// Set `payment_status` to `new` only if it currently equals `expected`.
    async fn compare_and_set_payment_status(
        &self,
        id: OrderId,
        expected: PaymentStatus,
        new: PaymentStatus,
    ) -> Result<Order, StoreError>;

    /// Atomically claim instance creation for an order.
    ///
    /// Returns `true` for exactly one caller; later callers get `false`.
    async fn claim_provisioning(&self, id: OrderId) -> Result<bool, StoreError>;

    /// Drop the provisioning claim of an order that links no instance.
    ///
    /// Returns `false` (claim kept) once any instance is linked.
    async fn release_provisioning(&self, id: OrderId) -> Result<bool, StoreError>;

    /// Take the order's reconciliation lease until `until`.
    ///
    /// Returns `false` while another holder's lease is still valid at `now`.
    async fn acquire_reconcile_lease(
        &self,
        id: OrderId,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn release_reconcile_lease(&self, id: OrderId) -> Result<(), StoreError>;

    /// Append an instance id to the order's links (serialized per order,
    /// no-op if already linked).
    async fn link_instance(&self, id: OrderId, instance_id: InstanceId) -> Result<Order, StoreError>;
}

#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn insert_instance(&self, instance: Instance) -> Result<Instance, StoreError>;

    async fn get_instance(&self, id: InstanceId) -> Result<Option<Instance>, StoreError>;

    async fn get_instances(&self, ids: &[InstanceId]) -> Result<Vec<Instance>, StoreError>;

    /// Instances of one owner, oldest first.
    async fn list_instances_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Instance>, StoreError>;

    /// Instances of one owner created within `[from, to]`.
    async fn list_instances_created_between(
        &self,
        owner_id: OwnerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Instance>, StoreError>;

    /// Apply `update` only if the stored status equals `expected`.
    async fn compare_and_update(
        &self,
        id: InstanceId,
        expected: InstanceStatus,
        update: InstanceUpdate,
    ) -> Result<Instance, StoreError>;
}

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn append_log(&self, entry: SystemLogEntry) -> Result<(), StoreError>;

    /// Entries of one instance, oldest first.
    async fn logs_for_instance(&self, id: InstanceId) -> Result<Vec<SystemLogEntry>, StoreError>;

    /// The most recent entries across all instances, newest first.
    async fn recent_logs(&self, limit: usize) -> Result<Vec<SystemLogEntry>, StoreError>;
}

/// Everything the workflow needs from storage.
pub trait Persistence: OrderStore + InstanceStore + LogStore {}

impl<T> Persistence for T where T: OrderStore + InstanceStore + LogStore {}
