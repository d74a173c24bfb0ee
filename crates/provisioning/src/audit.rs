//! Append-only audit trail attached to instances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rdpstore_core::{InstanceId, LogEntryId};

/// What was attempted on an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Provisioned,
    Shutdown,
    Start,
    Restart,
    UpdateCredentials,
    StatusOverride,
}

impl LogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogAction::Provisioned => "provisioned",
            LogAction::Shutdown => "shutdown",
            LogAction::Start => "start",
            LogAction::Restart => "restart",
            LogAction::UpdateCredentials => "update_credentials",
            LogAction::StatusOverride => "status_override",
        }
    }
}

impl core::fmt::Display for LogAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded for an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogStatus {
    InProgress,
    Completed,
    Failed,
}

/// One attempted action. Never mutated or deleted once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemLogEntry {
    pub id: LogEntryId,
    pub instance_id: InstanceId,
    pub action: LogAction,
    pub status: LogStatus,
    pub details: String,
    pub performed_at: DateTime<Utc>,
}

impl SystemLogEntry {
    pub fn new(
        instance_id: InstanceId,
        action: LogAction,
        status: LogStatus,
        details: impl Into<String>,
        performed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LogEntryId::new(),
            instance_id,
            action,
            status,
            details: details.into(),
            performed_at,
        }
    }

    pub fn completed(instance_id: InstanceId, action: LogAction, details: impl Into<String>) -> Self {
        Self::new(instance_id, action, LogStatus::Completed, details, Utc::now())
    }

    pub fn in_progress(instance_id: InstanceId, action: LogAction, details: impl Into<String>) -> Self {
        Self::new(instance_id, action, LogStatus::InProgress, details, Utc::now())
    }

    pub fn failed(instance_id: InstanceId, action: LogAction, details: impl Into<String>) -> Self {
        Self::new(instance_id, action, LogStatus::Failed, details, Utc::now())
    }
}
