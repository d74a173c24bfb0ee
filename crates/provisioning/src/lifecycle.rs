//! Instance lifecycle transition table.
//!
//! ```text
//! provisioning --provisioned--> active
//! active --shutdown--> offline
//! active --restart--> restarting --settle--> active
//! offline | suspended --start--> active
//! any except expired --override(target)--> target   (admin)
//! expired: terminal here; only renewal (not modelled) leaves it
//! ```
//!
//! Transitions are checked against the *current* status; illegal ones are
//! rejected, never coerced.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::instance::InstanceStatus;

/// A requested status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "target", rename_all = "snake_case")]
pub enum LifecycleAction {
    /// External provisioner reports the machine is built.
    Provisioned,
    Shutdown,
    Start,
    /// First half of a restart: `active → restarting`.
    Restart,
    /// Second half of a restart: `restarting → active`.
    Settle,
    /// Admin override to an explicit status.
    Override(InstanceStatus),
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Provisioned => "provisioned",
            LifecycleAction::Shutdown => "shutdown",
            LifecycleAction::Start => "start",
            LifecycleAction::Restart => "restart",
            LifecycleAction::Settle => "settle",
            LifecycleAction::Override(_) => "override",
        }
    }

    /// Status reached when this action is applied to `from`.
    pub fn apply(self, from: InstanceStatus) -> Result<InstanceStatus, IllegalTransition> {
        use InstanceStatus as S;

        let reject = |reason: &'static str| IllegalTransition {
            action: self,
            from,
            reason,
        };

        if from == S::Expired {
            return Err(reject("instance has expired; only a renewal can reactivate it"));
        }

        match self {
            LifecycleAction::Provisioned => match from {
                S::Provisioning => Ok(S::Active),
                _ => Err(reject("instance is not provisioning")),
            },
            LifecycleAction::Shutdown => match from {
                S::Active => Ok(S::Offline),
                _ => Err(reject("only an active instance can be shut down")),
            },
            LifecycleAction::Start => match from {
                S::Offline | S::Suspended => Ok(S::Active),
                _ => Err(reject("only an offline or suspended instance can be started")),
            },
            LifecycleAction::Restart => match from {
                S::Active => Ok(S::Restarting),
                _ => Err(reject("only an active instance can be restarted")),
            },
            LifecycleAction::Settle => match from {
                S::Restarting => Ok(S::Active),
                _ => Err(reject("instance is not restarting")),
            },
            LifecycleAction::Override(target) => match target {
                S::Active | S::Offline | S::Suspended | S::Expired => Ok(target),
                S::Provisioning | S::Restarting => {
                    Err(reject("override target must be active, offline, suspended or expired"))
                }
            },
        }
    }
}

/// Rejected lifecycle transition.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("cannot {} an instance that is {from}: {reason}", .action.as_str())]
pub struct IllegalTransition {
    pub action: LifecycleAction,
    pub from: InstanceStatus,
    pub reason: &'static str,
}
