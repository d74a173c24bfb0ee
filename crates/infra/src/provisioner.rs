//! External machine provisioner capability.
//!
//! The provisioner builds the actual remote-desktop host out of band and
//! reports back through `InstanceLifecycleManager::mark_provisioned`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use rdpstore_core::InstanceId;
use rdpstore_provisioning::Instance;

use crate::lifecycle::InstanceLifecycleManager;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("provisioner unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Request a machine for `instance`. Returns once the request is accepted.
    async fn provision(&self, instance: &Instance) -> Result<(), ProvisionError>;
}

/// Fire a provisioning request on a detached task; failures are logged.
pub fn spawn_provision(provisioner: Arc<dyn Provisioner>, instance: Instance) {
    tokio::spawn(async move {
        if let Err(err) = provisioner.provision(&instance).await {
            tracing::warn!(instance_id = %instance.id, error = %err, "provisioning request failed");
        }
    });
}

/// Development provisioner: "builds" every machine after `delay` and
/// reports it through the lifecycle manager with a private address.
#[derive(Clone)]
pub struct SandboxProvisioner {
    lifecycle: InstanceLifecycleManager,
    delay: Duration,
}

impl SandboxProvisioner {
    pub fn new(lifecycle: InstanceLifecycleManager, delay: Duration) -> Self {
        Self { lifecycle, delay }
    }
}

#[async_trait]
impl Provisioner for SandboxProvisioner {
    async fn provision(&self, instance: &Instance) -> Result<(), ProvisionError> {
        let lifecycle = self.lifecycle.clone();
        let delay = self.delay;
        let id = instance.id;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = lifecycle.mark_provisioned(id, sandbox_address(id)).await {
                tracing::warn!(instance_id = %id, error = %err, "sandbox provisioning callback failed");
            }
        });
        Ok(())
    }
}

/// Deterministic `10.x.y.z` address for an instance id.
fn sandbox_address(id: InstanceId) -> String {
    let b = id.as_uuid().as_bytes();
    format!("10.{}.{}.{}", b[13], b[14], b[15].max(1))
}

/// Provisioner that records requested instance ids.
#[derive(Debug, Default)]
pub struct RecordingProvisioner {
    requested: Mutex<Vec<InstanceId>>,
}

impl RecordingProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(&self) -> Vec<InstanceId> {
        self.requested.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Provisioner for RecordingProvisioner {
    async fn provision(&self, instance: &Instance) -> Result<(), ProvisionError> {
        self.requested
            .lock()
            .map_err(|_| ProvisionError::Unavailable("lock poisoned".to_string()))?
            .push(instance.id);
        Ok(())
    }
}
