use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rdpstore_catalog::PlanConfiguration;
use rdpstore_core::{DomainError, DomainResult, Entity, InstanceId, OrderId, OwnerId};

use crate::credentials::{Credentials, Password};

/// Instance status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Provisioning,
    Active,
    Offline,
    Restarting,
    Suspended,
    Expired,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Provisioning => "provisioning",
            InstanceStatus::Active => "active",
            InstanceStatus::Offline => "offline",
            InstanceStatus::Restarting => "restarting",
            InstanceStatus::Suspended => "suspended",
            InstanceStatus::Expired => "expired",
        }
    }
}

impl core::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provisioned remote-desktop machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub owner_id: OwnerId,
    /// Order whose fulfillment created this instance.
    pub order_id: OrderId,
    pub name: String,
    pub username: String,
    pub password: Password,
    pub plan_details: PlanConfiguration,
    /// Assigned by the external provisioner.
    pub ip_address: Option<String>,
    pub status: InstanceStatus,
    pub expiry_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Instance {
    type Id = InstanceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Instance {
    /// A fresh instance in `provisioning`, expiring one plan duration after `created_at`.
    pub fn provision(
        owner_id: OwnerId,
        order_id: OrderId,
        name: impl Into<String>,
        credentials: Credentials,
        plan_details: PlanConfiguration,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let expiry_date = plan_details.duration.expiry_from(created_at).ok_or_else(|| {
            DomainError::validation("plan duration overflows the calendar")
        })?;

        Ok(Self {
            id: InstanceId::new(),
            owner_id,
            order_id,
            name: name.into(),
            username: credentials.username,
            password: credentials.password,
            plan_details,
            ip_address: None,
            status: InstanceStatus::Provisioning,
            expiry_date,
            created_at,
            updated_at: created_at,
        })
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn is_owned_by(&self, owner_id: OwnerId) -> bool {
        self.owner_id == owner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialGenerator, OsRngCredentialGenerator};
    use chrono::TimeZone;
    use rdpstore_catalog::PlanDuration;

    fn plan(duration: PlanDuration) -> PlanConfiguration {
        PlanConfiguration {
            cpu_cores: 2,
            ram_gb: 4,
            storage_gb: 64,
            os: "ubuntu".to_string(),
            region: "us-east".to_string(),
            addons: vec![],
            duration,
        }
    }

    #[test]
    fn new_instance_starts_provisioning_without_address() {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let instance = Instance::provision(
            OwnerId::new(),
            OrderId::new(),
            "box #1",
            OsRngCredentialGenerator.generate(),
            plan(PlanDuration::Months(1)),
            created,
        )
        .unwrap();

        assert_eq!(instance.status, InstanceStatus::Provisioning);
        assert!(instance.ip_address.is_none());
        assert_eq!(instance.expiry_date, Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap());
        assert_eq!(instance.updated_at, created);
    }

    #[test]
    fn expiry_is_created_at_plus_duration() {
        let created = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap();
        for duration in [PlanDuration::Days(30), PlanDuration::Months(12)] {
            let instance = Instance::provision(
                OwnerId::new(),
                OrderId::new(),
                "box",
                OsRngCredentialGenerator.generate(),
                plan(duration),
                created,
            )
            .unwrap();
            assert_eq!(Some(instance.expiry_date), duration.expiry_from(instance.created_at));
        }
    }

    #[test]
    fn calendar_overflow_is_a_validation_error() {
        let err = Instance::provision(
            OwnerId::new(),
            OrderId::new(),
            "box",
            OsRngCredentialGenerator.generate(),
            plan(PlanDuration::Months(u32::MAX)),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
