use serde::{Deserialize, Serialize};

use rdpstore_core::ValueObject;

use crate::config::PlanConfiguration;
use crate::fingerprint::Fingerprint;

/// A priced configuration with a unit count.
///
/// The originating configuration travels with the line so that fulfillment can
/// copy it into every instance it creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub fingerprint: Fingerprint,
    pub name: String,
    /// Price per unit in smallest currency unit (e.g., cents).
    pub unit_price: u64,
    pub quantity: u32,
    pub configuration: PlanConfiguration,
}

impl ValueObject for LineItem {}

impl LineItem {
    /// Most units one line can carry.
    pub const MAX_QUANTITY: u32 = 50;
    /// Most units one order can carry across all its lines.
    pub const MAX_ORDER_UNITS: u64 = 100;

    /// Single-unit line for `configuration` at `unit_price`.
    pub fn new(configuration: PlanConfiguration, unit_price: u64) -> Self {
        Self {
            fingerprint: configuration.fingerprint(),
            name: configuration.display_name(),
            unit_price,
            quantity: 1,
            configuration,
        }
    }

    /// Set the unit count, clamped to `1..=MAX_QUANTITY`.
    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity.clamp(1, Self::MAX_QUANTITY);
        self
    }

    /// `unit_price × quantity`, saturating at `u64::MAX`.
    pub fn subtotal(&self) -> u64 {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }
}
