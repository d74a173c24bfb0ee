use chrono::{DateTime, Days, Months, Utc};
use serde::{Deserialize, Serialize};

use rdpstore_core::ValueObject;

use crate::fingerprint::Fingerprint;

/// Optional extras that can be attached to a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Addon {
    ExtraIpv4,
    DailyBackups,
    PriorityTraffic,
    AdminAccess,
}

impl Addon {
    pub fn as_str(&self) -> &'static str {
        match self {
            Addon::ExtraIpv4 => "extra_ipv4",
            Addon::DailyBackups => "daily_backups",
            Addon::PriorityTraffic => "priority_traffic",
            Addon::AdminAccess => "admin_access",
        }
    }
}

/// Rental period of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "unit", content = "count", rename_all = "lowercase")]
pub enum PlanDuration {
    Days(u32),
    Months(u32),
}

impl PlanDuration {
    /// Longest month plan on sale.
    pub const MAX_MONTHS: u32 = 36;
    /// Longest day plan on sale.
    pub const MAX_DAYS: u32 = 1095;

    pub fn count(&self) -> u32 {
        match self {
            PlanDuration::Days(n) | PlanDuration::Months(n) => *n,
        }
    }

    /// At least one unit and no longer than the cap for its unit.
    pub fn is_sellable(&self) -> bool {
        match self {
            PlanDuration::Days(n) => (1..=Self::MAX_DAYS).contains(n),
            PlanDuration::Months(n) => (1..=Self::MAX_MONTHS).contains(n),
        }
    }

    /// Instant at which a plan started at `created_at` runs out.
    ///
    /// Months are calendar months (Jan 31 + 1 month = end of February).
    /// Returns `None` only if the result is not representable.
    pub fn expiry_from(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            PlanDuration::Days(n) => created_at.checked_add_days(Days::new(u64::from(*n))),
            PlanDuration::Months(n) => created_at.checked_add_months(Months::new(*n)),
        }
    }

    /// Compact code used inside fingerprints (`7d`, `1m`).
    pub fn code(&self) -> String {
        match self {
            PlanDuration::Days(n) => format!("{n}d"),
            PlanDuration::Months(n) => format!("{n}m"),
        }
    }

    pub fn label(&self) -> String {
        match self {
            PlanDuration::Days(1) => "1 day".to_string(),
            PlanDuration::Days(n) => format!("{n} days"),
            PlanDuration::Months(1) => "1 month".to_string(),
            PlanDuration::Months(n) => format!("{n} months"),
        }
    }
}

/// A user-selected machine specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanConfiguration {
    pub cpu_cores: u32,
    pub ram_gb: u32,
    pub storage_gb: u32,
    pub os: String,
    pub region: String,
    #[serde(default)]
    pub addons: Vec<Addon>,
    pub duration: PlanDuration,
}

impl ValueObject for PlanConfiguration {}

impl PlanConfiguration {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }

    /// Human-readable name, used for cart lines and instance names.
    pub fn display_name(&self) -> String {
        format!(
            "{} vCPU / {} GB RAM / {} GB SSD · {} · {} · {}",
            self.cpu_cores,
            self.ram_gb,
            self.storage_gb,
            self.os.trim(),
            self.region.trim(),
            self.duration.label()
        )
    }

    pub fn has_addon(&self, addon: Addon) -> bool {
        self.addons.contains(&addon)
    }
}
