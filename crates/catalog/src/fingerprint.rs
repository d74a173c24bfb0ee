//! Deterministic identity of a configuration.

use serde::{Deserialize, Serialize};

use crate::config::PlanConfiguration;

/// Canonical key of a [`PlanConfiguration`].
///
/// Two configurations share a fingerprint iff every field matches after
/// normalisation (trimmed, lower-cased OS/region; add-ons sorted and de-duplicated).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(config: &PlanConfiguration) -> Self {
        let mut addons: Vec<&'static str> = config.addons.iter().map(|a| a.as_str()).collect();
        addons.sort_unstable();
        addons.dedup();

        Self(format!(
            "cpu={};ram={};storage={};os={};region={};duration={};addons={}",
            config.cpu_cores,
            config.ram_gb,
            config.storage_gb,
            normalize(&config.os),
            normalize(&config.region),
            config.duration.code(),
            addons.join(",")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}
