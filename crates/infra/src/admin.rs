//! Admin order control.
//!
//! Moving an order into `completed` is the only status change with side
//! effects. The "already provisioned" marker is the order's provisioning
//! claim (or any linked instance); the claim is a single-row conditional write
//! so repeated or racing `completed` calls provision at most once.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;

use rdpstore_catalog::LineItem;
use rdpstore_core::{DomainError, OrderId, OwnerId};
use rdpstore_provisioning::{BillingContact, Instance, Order, PaymentStatus};

use crate::pipeline::{FulfillmentError, FulfillmentPipeline, UnitBatch};
use crate::store::{Persistence, StoreError};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("order {0} not found")]
    NotFound(OrderId),

    /// Another caller holds the provisioning claim for this order.
    #[error("provisioning for order {0} is already in progress")]
    ProvisioningInProgress(OrderId),

    #[error("order {0} has no instances yet")]
    NotProvisioned(OrderId),

    #[error("order {order_id} changed concurrently: expected '{expected}', found '{actual}'")]
    Conflict {
        order_id: OrderId,
        expected: PaymentStatus,
        actual: String,
    },

    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("persistence failure: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of [`AdminOrderControl::set_order_status`].
#[derive(Debug)]
pub struct StatusChange {
    pub order: Order,
    /// Empty unless this call provisioned the order.
    pub created_instances: Vec<Instance>,
    pub notification: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct AdminOrderControl {
    store: Arc<dyn Persistence>,
    pipeline: FulfillmentPipeline,
}

impl AdminOrderControl {
    pub fn new(store: Arc<dyn Persistence>, pipeline: FulfillmentPipeline) -> Self {
        Self { store, pipeline }
    }

    pub async fn order(&self, id: OrderId) -> Result<Order, AdminError> {
        self.store
            .get_order(id)
            .await?
            .ok_or(AdminError::NotFound(id))
    }

    /// Set an order's payment status.
    ///
    /// Into `completed` on an unprovisioned order: claim, create one instance
    /// per unit, dispatch invoice and credentials, then write the status.
    /// Every other case only writes the status (or does nothing when it is
    /// unchanged).
    pub async fn set_order_status(&self, id: OrderId, new_status: PaymentStatus) -> Result<StatusChange, AdminError> {
        let order = self.order(id).await?;

        if new_status == PaymentStatus::Completed {
            if !order.is_provisioned() {
                return self.complete_and_provision(order).await;
            }
            // Claimed but nothing linked yet: the claimant writes the status.
            if order.payment_status != PaymentStatus::Completed && order.linked_instance_ids.is_empty() {
                return Err(AdminError::ProvisioningInProgress(id));
            }
        }

        if order.payment_status == new_status {
            tracing::debug!(order_id = %id, status = %new_status, "order status unchanged");
            return Ok(StatusChange {
                order,
                created_instances: Vec::new(),
                notification: None,
            });
        }

        let order = self.write_status(&order, new_status).await?;
        Ok(StatusChange {
            order,
            created_instances: Vec::new(),
            notification: None,
        })
    }

    /// Admin-entered sale: a `pending` order with no instances.
    pub async fn create_manual_order(
        &self,
        owner_id: OwnerId,
        lines: Vec<LineItem>,
        contact: BillingContact,
    ) -> Result<Order, AdminError> {
        let order = Order::place(
            owner_id,
            lines,
            self.pipeline.settings().currency.clone(),
            contact,
            PaymentStatus::Pending,
            Utc::now(),
        )?;
        let order = self.store.insert_order(order).await?;
        tracing::info!(order_id = %order.id, owner_id = %owner_id, amount = order.amount, "manual order created");
        Ok(order)
    }

    /// Re-send credentials for every linked instance. Never creates instances.
    pub async fn resend_credentials(&self, id: OrderId) -> Result<JoinHandle<()>, AdminError> {
        let order = self.order(id).await?;
        let instances = self.store.get_instances(&order.linked_instance_ids).await?;
        if instances.is_empty() {
            return Err(AdminError::NotProvisioned(id));
        }

        tracing::info!(order_id = %id, instances = instances.len(), "credentials re-sent");
        Ok(self.pipeline.deliver(&order, &instances, false))
    }

    async fn complete_and_provision(&self, order: Order) -> Result<StatusChange, AdminError> {
        if !self.store.claim_provisioning(order.id).await? {
            tracing::warn!(order_id = %order.id, "provisioning already claimed");
            return Err(AdminError::ProvisioningInProgress(order.id));
        }
        tracing::info!(order_id = %order.id, units = order.unit_count(), "provisioning manual order");

        let batches: Vec<UnitBatch<'_>> = order.line_items.iter().map(UnitBatch::whole_line).collect();
        let (linked, instances) = match self.pipeline.create_units(&order, &batches).await {
            Ok(created) => created,
            Err(err) => {
                self.release_if_nothing_created(&order).await;
                return Err(err.into());
            }
        };
        let notification = self.pipeline.deliver(&linked, &instances, true);

        let current = self.order(linked.id).await?;
        let order = if current.payment_status == PaymentStatus::Completed {
            current
        } else {
            self.write_status(&current, PaymentStatus::Completed).await?
        };

        Ok(StatusChange {
            order,
            created_instances: instances,
            notification: Some(notification),
        })
    }

    /// After a failed provisioning run, hand the claim back when no instance
    /// exists for the order so a later `completed` can start over. Instances
    /// that did get written keep the claim; reconciliation finishes those.
    async fn release_if_nothing_created(&self, order: &Order) {
        let created = match self
            .store
            .list_instances_created_between(order.owner_id, order.created_at, Utc::now())
            .await
        {
            Ok(found) => found.iter().filter(|i| i.order_id == order.id).count(),
            Err(err) => {
                tracing::warn!(order_id = %order.id, error = %err, "cannot count instances; claim kept");
                return;
            }
        };
        if created > 0 {
            tracing::warn!(order_id = %order.id, created, "provisioning stopped part-way; claim kept");
            return;
        }
        match self.store.release_provisioning(order.id).await {
            Ok(true) => tracing::info!(order_id = %order.id, "provisioning claim released"),
            Ok(false) => tracing::warn!(order_id = %order.id, "order gained links; claim kept"),
            Err(err) => tracing::warn!(order_id = %order.id, error = %err, "failed to release provisioning claim"),
        }
    }

    async fn write_status(&self, order: &Order, new_status: PaymentStatus) -> Result<Order, AdminError> {
        match self
            .store
            .compare_and_set_payment_status(order.id, order.payment_status, new_status)
            .await
        {
            Ok(updated) => {
                tracing::info!(
                    order_id = %order.id,
                    from = %order.payment_status,
                    to = %new_status,
                    "order status changed"
                );
                Ok(updated)
            }
            Err(StoreError::Conflict { actual, .. }) => {
                tracing::warn!(order_id = %order.id, expected = %order.payment_status, %actual, "conditional write lost");
                Err(AdminError::Conflict {
                    order_id: order.id,
                    expected: order.payment_status,
                    actual,
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}
