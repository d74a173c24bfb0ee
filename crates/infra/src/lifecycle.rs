//! Instance lifecycle manager.
//!
//! Every operation reads the current status, checks the transition table and
//! then writes with a conditional update against the status it read. Every
//! attempt that fails after the instance was found is still written to the
//! audit log with status `failed`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;

use rdpstore_core::{DomainError, InstanceId, OwnerId};
use rdpstore_provisioning::{
    Credentials, IllegalTransition, Instance, InstanceStatus, LifecycleAction, LogAction, LogStatus,
    Password, SystemLogEntry, validate_username,
};

use crate::store::{InstanceUpdate, Persistence, StoreError};

/// Who is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Customer(OwnerId),
    Admin,
    /// Provisioner callbacks and timers.
    System,
}

impl Actor {
    /// The customer an actor acts for, if any.
    pub fn owner(&self) -> Option<OwnerId> {
        match self {
            Actor::Customer(owner) => Some(*owner),
            Actor::Admin | Actor::System => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("instance {0} not found")]
    NotFound(InstanceId),

    #[error("not allowed to {action} instance {instance_id}")]
    Forbidden {
        instance_id: InstanceId,
        action: LogAction,
    },

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    /// The status changed between read and guarded write.
    #[error("instance {instance_id} changed concurrently: expected '{expected}', found '{actual}'")]
    Conflict {
        instance_id: InstanceId,
        expected: InstanceStatus,
        actual: String,
    },

    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("persistence failure: {0}")]
    Store(#[from] StoreError),

    #[error("restart task did not finish: {0}")]
    Interrupted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Time between `restarting` and `active` during a restart.
    pub restart_settle: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            restart_settle: Duration::from_secs(3),
        }
    }
}

/// A restart whose settle step is still running.
#[derive(Debug)]
pub struct RestartHandle {
    /// The instance as written in `restarting`.
    pub instance: Instance,
    join: JoinHandle<Result<Instance, LifecycleError>>,
}

impl RestartHandle {
    /// Wait for the instance to come back `active`.
    pub async fn wait(self) -> Result<Instance, LifecycleError> {
        self.join
            .await
            .map_err(|e| LifecycleError::Interrupted(e.to_string()))?
    }
}

#[derive(Debug, Clone, Copy)]
struct Op {
    action: LifecycleAction,
    log: LogAction,
    admin_only: bool,
}

#[derive(Clone)]
pub struct InstanceLifecycleManager {
    store: Arc<dyn Persistence>,
    settings: LifecycleSettings,
}

impl InstanceLifecycleManager {
    pub fn new(store: Arc<dyn Persistence>, settings: LifecycleSettings) -> Self {
        Self { store, settings }
    }

    /// Read one instance the actor may see.
    pub async fn instance(&self, actor: Actor, id: InstanceId) -> Result<Instance, LifecycleError> {
        let instance = self.load(id).await?;
        match actor {
            Actor::Customer(owner) if !instance.is_owned_by(owner) => Err(LifecycleError::NotFound(id)),
            _ => Ok(instance),
        }
    }

    /// `active → offline`.
    pub async fn shutdown(&self, actor: Actor, id: InstanceId) -> Result<Instance, LifecycleError> {
        let op = Op {
            action: LifecycleAction::Shutdown,
            log: LogAction::Shutdown,
            admin_only: false,
        };
        self.transition(actor, id, op, InstanceUpdate::default(), LogStatus::Completed)
            .await
    }

    /// `offline | suspended → active`.
    pub async fn start(&self, actor: Actor, id: InstanceId) -> Result<Instance, LifecycleError> {
        let op = Op {
            action: LifecycleAction::Start,
            log: LogAction::Start,
            admin_only: false,
        };
        self.transition(actor, id, op, InstanceUpdate::default(), LogStatus::Completed)
            .await
    }

    /// `active → restarting`, then `restarting → active` after the settle delay.
    ///
    /// Returns as soon as `restarting` is written; other readers observe the
    /// intermediate status until the settle task finishes.
    pub async fn restart(&self, actor: Actor, id: InstanceId) -> Result<RestartHandle, LifecycleError> {
        let op = Op {
            action: LifecycleAction::Restart,
            log: LogAction::Restart,
            admin_only: false,
        };
        let instance = self
            .transition(actor, id, op, InstanceUpdate::default(), LogStatus::InProgress)
            .await?;

        let this = self.clone();
        let delay = self.settings.restart_settle;
        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let op = Op {
                action: LifecycleAction::Settle,
                log: LogAction::Restart,
                admin_only: true,
            };
            this.transition(Actor::System, id, op, InstanceUpdate::default(), LogStatus::Completed)
                .await
        });

        Ok(RestartHandle { instance, join })
    }

    /// Replace username and/or password without touching the status.
    pub async fn update_credentials(
        &self,
        actor: Actor,
        id: InstanceId,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Instance, LifecycleError> {
        const ACTION: LogAction = LogAction::UpdateCredentials;

        let instance = self.load_for(id, ACTION).await?;
        self.authorize(actor, &instance, ACTION, false).await?;

        let credentials = match Self::merge_credentials(&instance, username.as_deref(), password) {
            Ok(c) => c,
            Err(err) => {
                self.record_failure(id, ACTION, err.to_string()).await;
                return Err(err.into());
            }
        };

        let mut changed = Vec::new();
        if credentials.username != instance.username {
            changed.push("username");
        }
        if credentials.password != instance.password {
            changed.push("password");
        }

        let updated = self
            .guarded_write(id, instance.status, InstanceUpdate::credentials(credentials), ACTION)
            .await?;

        let details = if changed.is_empty() {
            "credentials unchanged".to_string()
        } else {
            format!("{} updated", changed.join(" and "))
        };
        self.store.append_log(SystemLogEntry::completed(id, ACTION, details)).await?;
        tracing::info!(instance_id = %id, ?actor, "credentials updated");
        Ok(updated)
    }

    /// Admin override to `active | offline | suspended | expired`.
    pub async fn set_status(
        &self,
        actor: Actor,
        id: InstanceId,
        target: InstanceStatus,
    ) -> Result<Instance, LifecycleError> {
        let op = Op {
            action: LifecycleAction::Override(target),
            log: LogAction::StatusOverride,
            admin_only: true,
        };
        self.transition(actor, id, op, InstanceUpdate::default(), LogStatus::Completed)
            .await
    }

    /// Provisioner callback: the machine is up at `ip_address`.
    pub async fn mark_provisioned(&self, id: InstanceId, ip_address: String) -> Result<Instance, LifecycleError> {
        let op = Op {
            action: LifecycleAction::Provisioned,
            log: LogAction::Provisioned,
            admin_only: true,
        };
        let update = InstanceUpdate::default().with_ip_address(ip_address);
        self.transition(Actor::System, id, op, update, LogStatus::Completed)
            .await
    }

    /// Audit trail of one instance, oldest first.
    pub async fn logs(&self, actor: Actor, id: InstanceId) -> Result<Vec<SystemLogEntry>, LifecycleError> {
        self.instance(actor, id).await?;
        Ok(self.store.logs_for_instance(id).await?)
    }

    async fn transition(
        &self,
        actor: Actor,
        id: InstanceId,
        op: Op,
        update: InstanceUpdate,
        on_success: LogStatus,
    ) -> Result<Instance, LifecycleError> {
        let instance = self.load_for(id, op.log).await?;
        self.authorize(actor, &instance, op.log, op.admin_only).await?;

        let from = instance.status;
        let to = match op.action.apply(from) {
            Ok(to) => to,
            Err(illegal) => {
                tracing::warn!(instance_id = %id, ?actor, error = %illegal, "transition rejected");
                self.record_failure(id, op.log, illegal.to_string()).await;
                return Err(illegal.into());
            }
        };

        let update = InstanceUpdate {
            status: Some(to),
            ..update
        };
        let updated = self.guarded_write(id, from, update, op.log).await?;

        self.store
            .append_log(SystemLogEntry::new(id, op.log, on_success, format!("{from} -> {to}"), Utc::now()))
            .await?;
        tracing::info!(instance_id = %id, ?actor, action = op.action.as_str(), %from, %to, "instance status changed");
        Ok(updated)
    }

    async fn guarded_write(
        &self,
        id: InstanceId,
        expected: InstanceStatus,
        update: InstanceUpdate,
        log: LogAction,
    ) -> Result<Instance, LifecycleError> {
        match self.store.compare_and_update(id, expected, update).await {
            Ok(instance) => Ok(instance),
            Err(StoreError::Conflict { actual, .. }) => {
                tracing::warn!(instance_id = %id, %expected, %actual, "conditional write lost");
                self.record_failure(
                    id,
                    log,
                    format!("status changed concurrently: expected {expected}, found {actual}"),
                )
                .await;
                Err(LifecycleError::Conflict {
                    instance_id: id,
                    expected,
                    actual,
                })
            }
            Err(err) => {
                self.record_failure(id, log, format!("persistence failure: {err}")).await;
                Err(err.into())
            }
        }
    }

    async fn load(&self, id: InstanceId) -> Result<Instance, LifecycleError> {
        self.store
            .get_instance(id)
            .await?
            .ok_or(LifecycleError::NotFound(id))
    }

    /// [`Self::load`] for an action: a failed read is recorded against it.
    async fn load_for(&self, id: InstanceId, action: LogAction) -> Result<Instance, LifecycleError> {
        match self.store.get_instance(id).await {
            Ok(Some(instance)) => Ok(instance),
            Ok(None) => Err(LifecycleError::NotFound(id)),
            Err(err) => {
                tracing::error!(instance_id = %id, %action, error = %err, "instance read failed");
                self.record_failure(id, action, format!("persistence failure: {err}")).await;
                Err(err.into())
            }
        }
    }

    async fn authorize(
        &self,
        actor: Actor,
        instance: &Instance,
        action: LogAction,
        admin_only: bool,
    ) -> Result<(), LifecycleError> {
        let allowed = match actor {
            Actor::Customer(owner) => !admin_only && instance.is_owned_by(owner),
            Actor::Admin | Actor::System => true,
        };
        if allowed {
            return Ok(());
        }

        tracing::warn!(instance_id = %instance.id, ?actor, %action, "lifecycle call forbidden");
        self.record_failure(instance.id, action, "caller is not allowed to perform this action")
            .await;
        Err(LifecycleError::Forbidden {
            instance_id: instance.id,
            action,
        })
    }

    /// Append a failed attempt. A failure to log is itself only logged.
    async fn record_failure(&self, id: InstanceId, action: LogAction, details: impl Into<String>) {
        if let Err(err) = self
            .store
            .append_log(SystemLogEntry::failed(id, action, details))
            .await
        {
            tracing::error!(instance_id = %id, %action, error = %err, "failed to record failed attempt");
        }
    }

    fn merge_credentials(
        instance: &Instance,
        username: Option<&str>,
        password: Option<String>,
    ) -> Result<Credentials, DomainError> {
        if username.is_none() && password.is_none() {
            return Err(DomainError::validation("nothing to update: provide a username or a password"));
        }

        let username = match username {
            Some(u) => {
                validate_username(u)?;
                u.to_string()
            }
            None => instance.username.clone(),
        };
        let password = match password {
            Some(p) => Password::parse(p)?,
            None => instance.password.clone(),
        };
        Ok(Credentials { username, password })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rdpstore_catalog::PlanDuration;
    use rdpstore_core::OrderId;
    use rdpstore_provisioning::{CredentialGenerator, OsRngCredentialGenerator};

    use crate::pipeline::tests::{FaultyStore, Faults, plan};
    use crate::store::{InMemoryStore, InstanceStore, LogStore};

    fn manager(store: Arc<InMemoryStore>, settle_ms: u64) -> InstanceLifecycleManager {
        InstanceLifecycleManager::new(
            store,
            LifecycleSettings {
                restart_settle: Duration::from_millis(settle_ms),
            },
        )
    }

    async fn seed(store: &InMemoryStore, owner: OwnerId, status: InstanceStatus) -> Instance {
        let mut instance = Instance::provision(
            owner,
            OrderId::new(),
            "vm #1",
            OsRngCredentialGenerator.generate(),
            plan(PlanDuration::Months(1)),
            Utc::now(),
        )
        .unwrap();
        instance.status = status;
        store.insert_instance(instance).await.unwrap()
    }

    async fn status_of(store: &InMemoryStore, id: InstanceId) -> InstanceStatus {
        store.get_instance(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn shutdown_writes_status_and_completed_log() {
        let store = Arc::new(InMemoryStore::new());
        let owner = OwnerId::new();
        let i = seed(&store, owner, InstanceStatus::Active).await;

        let updated = manager(store.clone(), 0)
            .shutdown(Actor::Customer(owner), i.id)
            .await
            .unwrap();
        assert_eq!(updated.status, InstanceStatus::Offline);

        let logs = store.logs_for_instance(i.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, LogAction::Shutdown);
        assert_eq!(logs[0].status, LogStatus::Completed);
    }

    #[tokio::test]
    async fn restart_on_expired_is_rejected_and_logged() {
        let store = Arc::new(InMemoryStore::new());
        let owner = OwnerId::new();
        let i = seed(&store, owner, InstanceStatus::Expired).await;

        let err = manager(store.clone(), 0)
            .restart(Actor::Customer(owner), i.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::IllegalTransition(t) if t.from == InstanceStatus::Expired));
        assert_eq!(status_of(&store, i.id).await, InstanceStatus::Expired);

        let logs = store.logs_for_instance(i.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, LogAction::Restart);
        assert_eq!(logs[0].status, LogStatus::Failed);
    }

    #[tokio::test]
    async fn start_rejects_expired_but_revives_suspended() {
        let store = Arc::new(InMemoryStore::new());
        let m = manager(store.clone(), 0);
        let owner = OwnerId::new();

        let expired = seed(&store, owner, InstanceStatus::Expired).await;
        assert!(matches!(
            m.start(Actor::Customer(owner), expired.id).await,
            Err(LifecycleError::IllegalTransition(_))
        ));

        let suspended = seed(&store, owner, InstanceStatus::Suspended).await;
        let started = m.start(Actor::Customer(owner), suspended.id).await.unwrap();
        assert_eq!(started.status, InstanceStatus::Active);
    }

    #[tokio::test]
    async fn restart_passes_through_observable_restarting() {
        let store = Arc::new(InMemoryStore::new());
        let owner = OwnerId::new();
        let i = seed(&store, owner, InstanceStatus::Active).await;

        let handle = manager(store.clone(), 50)
            .restart(Actor::Customer(owner), i.id)
            .await
            .unwrap();
        assert_eq!(handle.instance.status, InstanceStatus::Restarting);
        assert_eq!(status_of(&store, i.id).await, InstanceStatus::Restarting);

        let settled = handle.wait().await.unwrap();
        assert_eq!(settled.status, InstanceStatus::Active);

        let logs = store.logs_for_instance(i.id).await.unwrap();
        let statuses: Vec<_> = logs.iter().map(|e| (e.action, e.status)).collect();
        assert_eq!(
            statuses,
            vec![
                (LogAction::Restart, LogStatus::InProgress),
                (LogAction::Restart, LogStatus::Completed),
            ]
        );
    }

    #[tokio::test]
    async fn settle_loses_to_concurrent_override() {
        let store = Arc::new(InMemoryStore::new());
        let m = manager(store.clone(), 50);
        let owner = OwnerId::new();
        let i = seed(&store, owner, InstanceStatus::Active).await;

        let handle = m.restart(Actor::Customer(owner), i.id).await.unwrap();
        m.set_status(Actor::Admin, i.id, InstanceStatus::Suspended).await.unwrap();

        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, LifecycleError::IllegalTransition(_)));
        assert_eq!(status_of(&store, i.id).await, InstanceStatus::Suspended);

        let last = store.recent_logs(1).await.unwrap();
        assert_eq!(last[0].status, LogStatus::Failed);
    }

    #[tokio::test]
    async fn racing_shutdown_and_restart_have_one_winner() {
        let store = Arc::new(InMemoryStore::new());
        let m = manager(store.clone(), 0);
        let owner = OwnerId::new();
        let i = seed(&store, owner, InstanceStatus::Active).await;

        let (a, b) = tokio::join!(
            m.shutdown(Actor::Customer(owner), i.id),
            m.restart(Actor::Customer(owner), i.id)
        );
        assert!(a.is_ok() ^ b.is_ok());

        let failed = store
            .logs_for_instance(i.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.status == LogStatus::Failed)
            .count();
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn customers_cannot_touch_foreign_instances() {
        let store = Arc::new(InMemoryStore::new());
        let m = manager(store.clone(), 0);
        let i = seed(&store, OwnerId::new(), InstanceStatus::Active).await;
        let stranger = Actor::Customer(OwnerId::new());

        assert!(matches!(
            m.shutdown(stranger, i.id).await,
            Err(LifecycleError::Forbidden { .. })
        ));
        assert!(matches!(m.instance(stranger, i.id).await, Err(LifecycleError::NotFound(_))));
        assert_eq!(status_of(&store, i.id).await, InstanceStatus::Active);

        let logs = store.logs_for_instance(i.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, LogStatus::Failed);
    }

    #[tokio::test]
    async fn only_admins_override_status() {
        let store = Arc::new(InMemoryStore::new());
        let m = manager(store.clone(), 0);
        let owner = OwnerId::new();
        let i = seed(&store, owner, InstanceStatus::Active).await;

        assert!(matches!(
            m.set_status(Actor::Customer(owner), i.id, InstanceStatus::Expired).await,
            Err(LifecycleError::Forbidden { .. })
        ));

        let expired = m.set_status(Actor::Admin, i.id, InstanceStatus::Expired).await.unwrap();
        assert_eq!(expired.status, InstanceStatus::Expired);

        // Expired is terminal, even for admins.
        assert!(matches!(
            m.set_status(Actor::Admin, i.id, InstanceStatus::Active).await,
            Err(LifecycleError::IllegalTransition(_))
        ));
    }

    #[tokio::test]
    async fn credential_update_keeps_status_and_logs_without_secret() {
        let store = Arc::new(InMemoryStore::new());
        let m = manager(store.clone(), 0);
        let owner = OwnerId::new();
        let i = seed(&store, owner, InstanceStatus::Offline).await;

        let updated = m
            .update_credentials(
                Actor::Customer(owner),
                i.id,
                Some("ada_admin".to_string()),
                Some("Correct-Horse-9-Battery".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, InstanceStatus::Offline);
        assert_eq!(updated.username, "ada_admin");
        assert_eq!(updated.password.expose(), "Correct-Horse-9-Battery");

        let logs = store.logs_for_instance(i.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, LogAction::UpdateCredentials);
        assert_eq!(logs[0].details, "username and password updated");
        assert!(!logs[0].details.contains("Correct-Horse"));
    }

    #[tokio::test]
    async fn weak_password_is_rejected_and_logged() {
        let store = Arc::new(InMemoryStore::new());
        let m = manager(store.clone(), 0);
        let owner = OwnerId::new();
        let i = seed(&store, owner, InstanceStatus::Active).await;

        let err = m
            .update_credentials(Actor::Customer(owner), i.id, None, Some("short".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));

        let unchanged = store.get_instance(i.id).await.unwrap().unwrap();
        assert_eq!(unchanged.password, i.password);
        let logs = store.logs_for_instance(i.id).await.unwrap();
        assert_eq!(logs[0].status, LogStatus::Failed);
    }

    #[tokio::test]
    async fn provisioner_callback_activates_with_address() {
        let store = Arc::new(InMemoryStore::new());
        let m = manager(store.clone(), 0);
        let i = seed(&store, OwnerId::new(), InstanceStatus::Provisioning).await;

        let active = m.mark_provisioned(i.id, "203.0.113.10".to_string()).await.unwrap();
        assert_eq!(active.status, InstanceStatus::Active);
        assert_eq!(active.ip_address.as_deref(), Some("203.0.113.10"));

        // A second callback is an illegal transition.
        assert!(m.mark_provisioned(i.id, "203.0.113.11".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn unknown_instance_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let err = manager(store, 0)
            .start(Actor::Admin, InstanceId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }

    #[tokio::test]
    async fn failed_instance_read_is_audited_against_the_action() {
        let store = Arc::new(FaultyStore::new(Faults {
            refuse_instance_reads: true,
            ..Faults::default()
        }));
        let m = InstanceLifecycleManager::new(
            store.clone(),
            LifecycleSettings {
                restart_settle: Duration::from_millis(0),
            },
        );
        let id = InstanceId::new();

        let err = m.shutdown(Actor::Admin, id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Store(_)));
        let err = m
            .update_credentials(Actor::Admin, id, Some("operator".to_string()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Store(_)));

        let logs = store.logs_for_instance(id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].action, LogAction::Shutdown);
        assert_eq!(logs[1].action, LogAction::UpdateCredentials);
        assert!(logs.iter().all(|l| l.status == LogStatus::Failed));
        assert!(logs[0].details.contains("persistence failure"));
    }
}
