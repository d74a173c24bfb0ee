use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rdpstore_catalog::LineItem;
use rdpstore_core::{DomainError, DomainResult, Entity, InstanceId, OrderId, OwnerId, ValueObject};

/// Payment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where invoices and credentials are delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingContact {
    pub full_name: String,
    pub email: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2, upper case.
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ValueObject for BillingContact {}

/// A financial record of one checkout (or one admin-entered sale).
///
/// `amount` is frozen at creation from `line_items` and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner_id: OwnerId,
    /// Smallest currency unit (e.g., cents).
    pub amount: u64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payment_status: PaymentStatus,
    pub line_items: Vec<LineItem>,
    pub linked_instance_ids: Vec<InstanceId>,
    pub billing_contact: BillingContact,
    /// Set once instance creation has been claimed for this order.
    pub provisioning_claimed: bool,
    /// While in the future, one reconciliation run owns this order.
    #[serde(default)]
    pub reconcile_lease_until: Option<DateTime<Utc>>,
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Order {
    /// Build a new order over a non-empty set of lines.
    pub fn place(
        owner_id: OwnerId,
        line_items: Vec<LineItem>,
        currency: impl Into<String>,
        billing_contact: BillingContact,
        payment_status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let amount = Self::check_lines(&line_items)?;

        Ok(Self {
            id: OrderId::new(),
            owner_id,
            amount,
            currency: currency.into(),
            created_at: now,
            updated_at: now,
            payment_status,
            line_items,
            linked_instance_ids: Vec::new(),
            billing_contact,
            provisioning_claimed: false,
            reconcile_lease_until: None,
        })
    }

    /// Validate lines for a new order and return their total amount.
    ///
    /// Lines must be sellable (positive, capped quantity; bounded duration),
    /// the order must stay within [`LineItem::MAX_ORDER_UNITS`] and the
    /// amount must fit in a `u64`.
    pub fn check_lines(line_items: &[LineItem]) -> DomainResult<u64> {
        if line_items.is_empty() {
            return Err(DomainError::validation("order must contain at least one line"));
        }

        let mut units = 0u64;
        let mut amount = 0u64;
        for line in line_items {
            if !(1..=LineItem::MAX_QUANTITY).contains(&line.quantity) {
                return Err(DomainError::validation(format!(
                    "line quantity must be within 1..={}",
                    LineItem::MAX_QUANTITY
                )));
            }
            if !line.configuration.duration.is_sellable() {
                return Err(DomainError::validation(format!(
                    "duration {} is not sold",
                    line.configuration.duration.label()
                )));
            }
            units += u64::from(line.quantity);
            amount = line
                .unit_price
                .checked_mul(u64::from(line.quantity))
                .and_then(|subtotal| amount.checked_add(subtotal))
                .ok_or_else(|| DomainError::validation("order amount is out of range"))?;
        }
        if units > LineItem::MAX_ORDER_UNITS {
            return Err(DomainError::validation(format!(
                "order must not exceed {} units",
                LineItem::MAX_ORDER_UNITS
            )));
        }

        Ok(amount)
    }

    /// Number of instances this order entitles its owner to.
    pub fn unit_count(&self) -> u64 {
        self.line_items.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// True once instance creation ran (or is running) for this order.
    pub fn is_provisioned(&self) -> bool {
        self.provisioning_claimed || !self.linked_instance_ids.is_empty()
    }

    pub fn is_owned_by(&self, owner_id: OwnerId) -> bool {
        self.owner_id == owner_id
    }
}
