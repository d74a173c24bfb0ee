//! Fulfillment pipeline: paid cart → order → instances → documents.
//!
//! The order row is written before any instance so a crash mid-way leaves a
//! reconcilable record. Instances are linked to the order one by one; a failed
//! link leaves the instance discoverable by creation time (see `reconcile`).

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;

use rdpstore_cart::CartSnapshot;
use rdpstore_catalog::LineItem;
use rdpstore_core::{DomainError, OwnerId};
use rdpstore_provisioning::{BillingContact, CredentialGenerator, Instance, Order, PaymentStatus};

use crate::notifier::{InvoiceDocument, Notifier, fulfillment_documents, spawn_delivery};
use crate::provisioner::{Provisioner, spawn_provision};
use crate::store::{Persistence, StoreError};

#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("cannot fulfill an empty cart")]
    EmptyCart,

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("persistence failure: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// ISO-4217 code stamped on new orders.
    pub currency: String,
    /// Sender label on invoices.
    pub invoice_sender: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            invoice_sender: "billing@rdpstore.local".to_string(),
        }
    }
}

/// Result of a successful `fulfill`.
#[derive(Debug)]
pub struct Fulfillment {
    pub order: Order,
    pub instances: Vec<Instance>,
    /// Detached document delivery. Awaiting it is optional.
    pub notification: JoinHandle<()>,
}

/// A number of units still to create for one order line.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UnitBatch<'a> {
    pub line: &'a LineItem,
    /// 1-based number of the first unit, used for naming.
    pub first_unit: u32,
    pub count: u32,
}

impl<'a> UnitBatch<'a> {
    pub fn whole_line(line: &'a LineItem) -> Self {
        Self {
            line,
            first_unit: 1,
            count: line.quantity,
        }
    }
}

#[derive(Clone)]
pub struct FulfillmentPipeline {
    store: Arc<dyn Persistence>,
    notifier: Arc<dyn Notifier>,
    provisioner: Arc<dyn Provisioner>,
    credentials: Arc<dyn CredentialGenerator>,
    settings: PipelineSettings,
}

impl FulfillmentPipeline {
    pub fn new(
        store: Arc<dyn Persistence>,
        notifier: Arc<dyn Notifier>,
        provisioner: Arc<dyn Provisioner>,
        credentials: Arc<dyn CredentialGenerator>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            provisioner,
            credentials,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Turn an authorized cart into a completed order with one instance per unit.
    ///
    /// Must be called at most once per checkout submission; two identical carts
    /// submitted separately produce two orders.
    pub async fn fulfill(
        &self,
        owner_id: OwnerId,
        snapshot: &CartSnapshot,
        contact: &BillingContact,
    ) -> Result<Fulfillment, FulfillmentError> {
        if snapshot.is_empty() {
            return Err(FulfillmentError::EmptyCart);
        }

        let mut order = Order::place(
            owner_id,
            snapshot.lines().to_vec(),
            self.settings.currency.clone(),
            contact.clone(),
            PaymentStatus::Completed,
            Utc::now(),
        )?;
        order.provisioning_claimed = true;

        let order = self.store.insert_order(order).await?;
        tracing::info!(
            order_id = %order.id,
            owner_id = %owner_id,
            amount = order.amount,
            units = order.unit_count(),
            "order created"
        );

        let batches: Vec<UnitBatch<'_>> = order.line_items.iter().map(UnitBatch::whole_line).collect();
        let (order, instances) = self.create_units(&order, &batches).await?;

        let notification = self.deliver(&order, &instances, true);

        Ok(Fulfillment {
            order,
            instances,
            notification,
        })
    }

    /// Create, persist and link the given units of `order`.
    ///
    /// Returns the order as last seen by a successful link together with every
    /// instance created. Stops at the first instance that cannot be persisted.
    pub(crate) async fn create_units(
        &self,
        order: &Order,
        batches: &[UnitBatch<'_>],
    ) -> Result<(Order, Vec<Instance>), FulfillmentError> {
        let mut latest = order.clone();
        let mut instances = Vec::new();

        for batch in batches {
            for unit in batch.first_unit..batch.first_unit + batch.count {
                let created_at = Utc::now();
                let instance = Instance::provision(
                    order.owner_id,
                    order.id,
                    format!("{} #{unit}", batch.line.name),
                    self.credentials.generate(),
                    batch.line.configuration.clone(),
                    created_at,
                )?;

                let instance = self.store.insert_instance(instance).await.inspect_err(|err| {
                    tracing::error!(
                        order_id = %order.id,
                        created = instances.len(),
                        error = %err,
                        "instance creation failed; order left for reconciliation"
                    );
                })?;
                tracing::info!(order_id = %order.id, instance_id = %instance.id, "instance created");

                spawn_provision(Arc::clone(&self.provisioner), instance.clone());

                match self.store.link_instance(order.id, instance.id).await {
                    Ok(updated) => latest = updated,
                    Err(err) => tracing::warn!(
                        order_id = %order.id,
                        instance_id = %instance.id,
                        error = %err,
                        "failed to link instance to order"
                    ),
                }

                instances.push(instance);
            }
        }

        Ok((latest, instances))
    }

    /// Dispatch one notifier call to the order's billing address.
    pub(crate) fn deliver(&self, order: &Order, instances: &[Instance], with_invoice: bool) -> JoinHandle<()> {
        let invoice = with_invoice.then(|| InvoiceDocument::for_order(order, self.settings.invoice_sender.clone()));
        spawn_delivery(
            Arc::clone(&self.notifier),
            order.billing_contact.email.clone(),
            fulfillment_documents(invoice, instances),
        )
    }
}
