//! Outbound document delivery (invoice and credentials e-mail).
//!
//! Delivery is at-least-once and detached from the caller: the workflow hands
//! documents to [`spawn_delivery`] and never waits on, retries or escalates the
//! outcome. Failures only reach the logs.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use rdpstore_core::{InstanceId, OrderId};
use rdpstore_provisioning::{BillingContact, Instance, Order, Password};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceLine {
    pub name: String,
    pub quantity: u32,
    pub unit_price: u64,
    pub subtotal: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceDocument {
    pub order_id: OrderId,
    pub issued_at: DateTime<Utc>,
    pub sender: String,
    pub bill_to: BillingContact,
    pub lines: Vec<InvoiceLine>,
    pub amount: u64,
    pub currency: String,
}

impl InvoiceDocument {
    pub fn for_order(order: &Order, sender: impl Into<String>) -> Self {
        Self {
            order_id: order.id,
            issued_at: Utc::now(),
            sender: sender.into(),
            bill_to: order.billing_contact.clone(),
            lines: order
                .line_items
                .iter()
                .map(|l| InvoiceLine {
                    name: l.name.clone(),
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    subtotal: l.subtotal(),
                })
                .collect(),
            amount: order.amount,
            currency: order.currency.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialDocument {
    pub instance_id: InstanceId,
    pub instance_name: String,
    pub username: String,
    pub password: Password,
    pub ip_address: Option<String>,
    pub expiry_date: DateTime<Utc>,
}

impl From<&Instance> for CredentialDocument {
    fn from(instance: &Instance) -> Self {
        Self {
            instance_id: instance.id,
            instance_name: instance.name.clone(),
            username: instance.username.clone(),
            password: instance.password.clone(),
            ip_address: instance.ip_address.clone(),
            expiry_date: instance.expiry_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Document {
    Invoice(InvoiceDocument),
    Credentials(CredentialDocument),
}

/// Invoice first, then one credentials document per instance.
pub fn fulfillment_documents(invoice: Option<InvoiceDocument>, instances: &[Instance]) -> Vec<Document> {
    invoice
        .map(Document::Invoice)
        .into_iter()
        .chain(instances.iter().map(|i| Document::Credentials(i.into())))
        .collect()
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("recipient rejected: {0}")]
    Rejected(String),

    #[error("notifier unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, address: &str, documents: Vec<Document>) -> Result<(), NotifyError>;
}

/// Hand documents to the notifier on a detached task.
///
/// The returned handle resolves once the attempt finished; dropping it does
/// not cancel delivery.
pub fn spawn_delivery(
    notifier: Arc<dyn Notifier>,
    address: String,
    documents: Vec<Document>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let count = documents.len();
        match notifier.send(&address, documents).await {
            Ok(()) => tracing::debug!(%address, documents = count, "documents delivered"),
            Err(err) => tracing::warn!(%address, documents = count, error = %err, "document delivery failed"),
        }
    })
}

/// Notifier that only records deliveries in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, address: &str, documents: Vec<Document>) -> Result<(), NotifyError> {
        for doc in &documents {
            match doc {
                Document::Invoice(inv) => tracing::info!(
                    %address,
                    order_id = %inv.order_id,
                    amount = inv.amount,
                    currency = %inv.currency,
                    "invoice sent"
                ),
                Document::Credentials(c) => tracing::info!(
                    %address,
                    instance_id = %c.instance_id,
                    username = %c.username,
                    "credentials sent"
                ),
            }
        }
        Ok(())
    }
}

/// One recorded call to [`InMemoryNotifier::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub address: String,
    pub documents: Vec<Document>,
}

impl Delivery {
    pub fn credentials(&self) -> impl Iterator<Item = &CredentialDocument> {
        self.documents.iter().filter_map(|d| match d {
            Document::Credentials(c) => Some(c),
            Document::Invoice(_) => None,
        })
    }

    pub fn invoice(&self) -> Option<&InvoiceDocument> {
        self.documents.iter().find_map(|d| match d {
            Document::Invoice(inv) => Some(inv),
            Document::Credentials(_) => None,
        })
    }
}

/// Notifier that keeps every call in memory.
///
/// Intended for tests/dev. A failing instance still records the attempt.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    deliveries: Mutex<Vec<Delivery>>,
    fail_with: Option<NotifyError>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(err: NotifyError) -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            fail_with: Some(err),
        }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, address: &str, documents: Vec<Document>) -> Result<(), NotifyError> {
        self.deliveries
            .lock()
            .map_err(|_| NotifyError::Unavailable("lock poisoned".to_string()))?
            .push(Delivery {
                address: address.to_string(),
                documents,
            });

        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
