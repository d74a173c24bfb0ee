use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rdpstore_catalog::{LineItem, PlanConfiguration};
use rdpstore_checkout::{BillingForm, PaymentForm};
use rdpstore_core::{InstanceId, OrderId, OwnerId};
use rdpstore_infra::ResumeReport;
use rdpstore_provisioning::{Instance, InstanceStatus, Order, PaymentStatus};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub configuration: PlanConfiguration,
    #[serde(default = "one")]
    pub quantity: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub lines: Vec<OrderLineRequest>,
    pub billing: BillingForm,
    pub payment: PaymentForm,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCredentialsRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ManualOrderRequest {
    pub owner_id: OwnerId,
    pub lines: Vec<OrderLineRequest>,
    pub billing: BillingForm,
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest {
    pub status: PaymentStatus,
}

#[derive(Debug, Deserialize)]
pub struct InstanceStatusRequest {
    pub status: InstanceStatus,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionedRequest {
    pub ip_address: String,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub fingerprint: String,
    pub name: String,
    pub unit_price: u64,
    pub currency: String,
}

impl QuoteResponse {
    pub fn new(line: &LineItem, currency: &str) -> Self {
        Self {
            fingerprint: line.fingerprint.as_str().to_string(),
            name: line.name.clone(),
            unit_price: line.unit_price,
            currency: currency.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderLineResponse {
    pub name: String,
    pub unit_price: u64,
    pub quantity: u32,
    pub subtotal: u64,
    pub configuration: PlanConfiguration,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub owner_id: OwnerId,
    pub amount: u64,
    pub currency: String,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lines: Vec<OrderLineResponse>,
    pub linked_instance_ids: Vec<InstanceId>,
}

impl From<&Order> for OrderResponse {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id,
            owner_id: o.owner_id,
            amount: o.amount,
            currency: o.currency.clone(),
            payment_status: o.payment_status,
            created_at: o.created_at,
            updated_at: o.updated_at,
            lines: o
                .line_items
                .iter()
                .map(|l| OrderLineResponse {
                    name: l.name.clone(),
                    unit_price: l.unit_price,
                    quantity: l.quantity,
                    subtotal: l.subtotal(),
                    configuration: l.configuration.clone(),
                })
                .collect(),
            linked_instance_ids: o.linked_instance_ids.clone(),
        }
    }
}

/// Instance view. The password is only ever delivered by the notifier.
#[derive(Debug, Serialize)]
pub struct InstanceResponse {
    pub id: InstanceId,
    pub order_id: OrderId,
    pub name: String,
    pub username: String,
    pub status: InstanceStatus,
    pub ip_address: Option<String>,
    pub plan: PlanConfiguration,
    pub created_at: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
}

impl From<&Instance> for InstanceResponse {
    fn from(i: &Instance) -> Self {
        Self {
            id: i.id,
            order_id: i.order_id,
            name: i.name.clone(),
            username: i.username.clone(),
            status: i.status,
            ip_address: i.ip_address.clone(),
            plan: i.plan_details.clone(),
            created_at: i.created_at,
            expiry_date: i.expiry_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FulfillmentResponse {
    pub order: OrderResponse,
    pub instances: Vec<InstanceResponse>,
}

impl FulfillmentResponse {
    pub fn new(order: &Order, instances: &[Instance]) -> Self {
        Self {
            order: order.into(),
            instances: instances.iter().map(InstanceResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    pub order: OrderResponse,
    pub relinked: Vec<InstanceId>,
    pub created: Vec<InstanceResponse>,
}

impl From<&ResumeReport> for ResumeResponse {
    fn from(r: &ResumeReport) -> Self {
        Self {
            order: (&r.order).into(),
            relinked: r.relinked.clone(),
            created: r.created.iter().map(InstanceResponse::from).collect(),
        }
    }
}
