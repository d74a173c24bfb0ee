//! Plan catalog: machine configurations, their fingerprints and prices.
//!
//! Everything here is a pure function of its inputs (no IO, no clock reads).

pub mod config;
pub mod fingerprint;
pub mod line_item;
pub mod pricing;

pub use config::{Addon, PlanConfiguration, PlanDuration};
pub use fingerprint::Fingerprint;
pub use line_item::LineItem;
pub use pricing::{PriceList, RegionRate};
