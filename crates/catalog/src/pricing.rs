//! Price list and configuration resolution.

use serde::{Deserialize, Serialize};

use rdpstore_core::{DomainError, DomainResult};

use crate::config::{Addon, PlanConfiguration, PlanDuration};
use crate::line_item::LineItem;

/// Region price factor, in per-mille of the base monthly price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRate {
    pub code: String,
    pub per_mille: u64,
}

/// Catalog prices. All amounts are monthly, in smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceList {
    pub per_cpu_core: u64,
    pub per_gb_ram: u64,
    pub per_gb_storage: u64,
    /// `(os, monthly surcharge)`; an OS missing here is not sold.
    pub operating_systems: Vec<(String, u64)>,
    pub regions: Vec<RegionRate>,
    pub addon_prices: Vec<(Addon, u64)>,
}

const CPU_RANGE: core::ops::RangeInclusive<u32> = 1..=64;
const RAM_RANGE: core::ops::RangeInclusive<u32> = 1..=512;
const STORAGE_RANGE: core::ops::RangeInclusive<u32> = 16..=4096;

impl Default for PriceList {
    fn default() -> Self {
        Self {
            per_cpu_core: 400,
            per_gb_ram: 150,
            per_gb_storage: 5,
            operating_systems: vec![
                ("ubuntu".to_string(), 0),
                ("debian".to_string(), 0),
                ("windows-10".to_string(), 1200),
                ("windows-server-2022".to_string(), 1500),
            ],
            regions: vec![
                RegionRate { code: "us-east".to_string(), per_mille: 1000 },
                RegionRate { code: "us-west".to_string(), per_mille: 1000 },
                RegionRate { code: "eu-central".to_string(), per_mille: 1100 },
                RegionRate { code: "ap-southeast".to_string(), per_mille: 1200 },
            ],
            addon_prices: vec![
                (Addon::ExtraIpv4, 300),
                (Addon::DailyBackups, 200),
                (Addon::PriorityTraffic, 250),
                (Addon::AdminAccess, 500),
            ],
        }
    }
}

impl PriceList {
    /// Resolve a configuration into a single-unit priced line.
    pub fn resolve(&self, config: &PlanConfiguration) -> DomainResult<LineItem> {
        let unit_price = self.quote(config)?;
        Ok(LineItem::new(config.clone(), unit_price))
    }

    /// Price of one unit of `config` for its full duration.
    pub fn quote(&self, config: &PlanConfiguration) -> DomainResult<u64> {
        if !CPU_RANGE.contains(&config.cpu_cores) {
            return Err(DomainError::validation(format!(
                "cpu_cores must be within {}..={}",
                CPU_RANGE.start(),
                CPU_RANGE.end()
            )));
        }
        if !RAM_RANGE.contains(&config.ram_gb) {
            return Err(DomainError::validation(format!(
                "ram_gb must be within {}..={}",
                RAM_RANGE.start(),
                RAM_RANGE.end()
            )));
        }
        if !STORAGE_RANGE.contains(&config.storage_gb) {
            return Err(DomainError::validation(format!(
                "storage_gb must be within {}..={}",
                STORAGE_RANGE.start(),
                STORAGE_RANGE.end()
            )));
        }
        if !config.duration.is_sellable() {
            return Err(DomainError::validation(format!(
                "duration must be within 1..={} months or 1..={} days",
                PlanDuration::MAX_MONTHS,
                PlanDuration::MAX_DAYS
            )));
        }

        let os = config.os.trim().to_ascii_lowercase();
        let os_surcharge = self
            .operating_systems
            .iter()
            .find(|(name, _)| *name == os)
            .map(|(_, price)| *price)
            .ok_or_else(|| DomainError::validation(format!("unknown operating system '{os}'")))?;

        let region = config.region.trim().to_ascii_lowercase();
        let region_rate = self
            .regions
            .iter()
            .find(|r| r.code == region)
            .map(|r| r.per_mille)
            .ok_or_else(|| DomainError::validation(format!("unknown region '{region}'")))?;

        let mut addons = config.addons.clone();
        addons.sort_unstable();
        addons.dedup();
        let mut addon_total = 0;
        for addon in addons {
            let price = self
                .addon_prices
                .iter()
                .find(|(a, _)| *a == addon)
                .map(|(_, p)| *p)
                .ok_or_else(|| {
                    DomainError::validation(format!("add-on '{}' is not sold", addon.as_str()))
                })?;
            addon_total += price;
        }

        let base = u64::from(config.cpu_cores) * self.per_cpu_core
            + u64::from(config.ram_gb) * self.per_gb_ram
            + u64::from(config.storage_gb) * self.per_gb_storage
            + os_surcharge
            + addon_total;
        let monthly = base * region_rate / 1000;

        Ok(scale_to_duration(monthly, config.duration))
    }
}

/// Scale a monthly price to a rental period.
///
/// Long commitments are discounted: 5% from six months, 10% from twelve.
/// Day plans are pro-rata over a 30-day month.
fn scale_to_duration(monthly: u64, duration: PlanDuration) -> u64 {
    match duration {
        PlanDuration::Months(n) => {
            let n = u64::from(n);
            let discount_pct = match n {
                12.. => 10,
                6.. => 5,
                _ => 0,
            };
            monthly * n * (100 - discount_pct) / 100
        }
        PlanDuration::Days(n) => (monthly * u64::from(n)).div_ceil(30),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(cpu: u32, ram: u32, storage: u32) -> PlanConfiguration {
        PlanConfiguration {
            cpu_cores: cpu,
            ram_gb: ram,
            storage_gb: storage,
            os: "ubuntu".to_string(),
            region: "us-east".to_string(),
            addons: vec![],
            duration: PlanDuration::Months(1),
        }
    }

    #[test]
    fn resolves_base_monthly_price() {
        let line = PriceList::default().resolve(&config(2, 4, 64)).unwrap();
        // 2*400 + 4*150 + 64*5
        assert_eq!(line.unit_price, 1720);
        assert_eq!(line.quantity, 1);
    }

    #[test]
    fn windows_and_region_are_surcharged() {
        let mut c = config(2, 4, 64);
        c.os = "Windows-Server-2022".to_string();
        c.region = "eu-central".to_string();
        let price = PriceList::default().quote(&c).unwrap();
        assert_eq!(price, (1720 + 1500) * 1100 / 1000);
    }

    #[test]
    fn twelve_months_are_discounted() {
        let mut c = config(2, 4, 64);
        c.duration = PlanDuration::Months(12);
        assert_eq!(PriceList::default().quote(&c).unwrap(), 1720 * 12 * 90 / 100);
    }

    #[test]
    fn days_are_pro_rata() {
        let mut c = config(2, 4, 64);
        c.duration = PlanDuration::Days(15);
        assert_eq!(PriceList::default().quote(&c).unwrap(), 860);
    }

    #[test]
    fn duplicate_addons_are_charged_once() {
        let mut c = config(1, 1, 16);
        c.addons = vec![Addon::ExtraIpv4, Addon::ExtraIpv4];
        let with_dup = PriceList::default().quote(&c).unwrap();
        c.addons = vec![Addon::ExtraIpv4];
        assert_eq!(with_dup, PriceList::default().quote(&c).unwrap());
    }

    #[test]
    fn rejects_unknown_os_and_region() {
        let mut c = config(2, 4, 64);
        c.os = "templeos".to_string();
        assert!(matches!(
            PriceList::default().quote(&c),
            Err(DomainError::Validation(msg)) if msg.contains("operating system")
        ));

        let mut c = config(2, 4, 64);
        c.region = "moon-1".to_string();
        assert!(matches!(
            PriceList::default().quote(&c),
            Err(DomainError::Validation(msg)) if msg.contains("region")
        ));
    }

    #[test]
    fn rejects_out_of_range_resources() {
        let list = PriceList::default();
        assert!(list.quote(&config(0, 4, 64)).is_err());
        assert!(list.quote(&config(2, 1024, 64)).is_err());
        assert!(list.quote(&config(2, 4, 8)).is_err());

        let mut zero = config(2, 4, 64);
        zero.duration = PlanDuration::Months(0);
        assert!(list.quote(&zero).is_err());
    }

    #[test]
    fn rejects_periods_longer_than_sold() {
        let list = PriceList::default();
        for duration in [
            PlanDuration::Months(PlanDuration::MAX_MONTHS + 1),
            PlanDuration::Months(4_000_000),
            PlanDuration::Days(PlanDuration::MAX_DAYS + 1),
            PlanDuration::Days(u32::MAX),
        ] {
            let mut c = config(2, 4, 64);
            c.duration = duration;
            assert!(matches!(
                list.quote(&c),
                Err(DomainError::Validation(msg)) if msg.contains("duration")
            ));
        }

        let mut longest = config(2, 4, 64);
        longest.duration = PlanDuration::Months(PlanDuration::MAX_MONTHS);
        assert_eq!(list.quote(&longest).unwrap(), 1720 * 36 * 90 / 100);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: adding a core never makes a plan cheaper.
        #[test]
        fn price_is_monotonic_in_cpu(cpu in 1u32..64, ram in 1u32..=512, storage in 16u32..=4096) {
            let list = PriceList::default();
            let smaller = list.quote(&config(cpu, ram, storage)).unwrap();
            let larger = list.quote(&config(cpu + 1, ram, storage)).unwrap();
            prop_assert!(larger > smaller);
        }
    }
}
