//! Service wiring: in-memory persistence plus the sandbox capabilities.

use std::sync::Arc;

use rdpstore_catalog::PriceList;
use rdpstore_infra::{
    AdminOrderControl, AppConfig, CheckoutFlow, FulfillmentPipeline, InMemoryStore, InstanceLifecycleManager,
    LoggingNotifier, Persistence, Reconciler, SandboxAuthorizer, SandboxProvisioner,
};
use rdpstore_provisioning::OsRngCredentialGenerator;

/// Everything handlers need, shared behind one `Arc`.
pub struct AppServices {
    pub store: Arc<dyn Persistence>,
    pub prices: PriceList,
    /// Currency quoted and charged.
    pub currency: String,
    pub checkout: CheckoutFlow,
    pub lifecycle: InstanceLifecycleManager,
    pub admin: AdminOrderControl,
    pub reconciler: Reconciler,
}

pub fn build_services(config: &AppConfig) -> AppServices {
    let store: Arc<dyn Persistence> = Arc::new(InMemoryStore::new());

    let lifecycle = InstanceLifecycleManager::new(Arc::clone(&store), config.lifecycle_settings());
    let provisioner = Arc::new(SandboxProvisioner::new(lifecycle.clone(), config.provision_delay));

    let pipeline = FulfillmentPipeline::new(
        Arc::clone(&store),
        Arc::new(LoggingNotifier),
        provisioner,
        Arc::new(OsRngCredentialGenerator),
        config.pipeline_settings(),
    );

    AppServices {
        checkout: CheckoutFlow::new(Arc::new(SandboxAuthorizer), pipeline.clone()),
        admin: AdminOrderControl::new(Arc::clone(&store), pipeline.clone()),
        reconciler: Reconciler::new(Arc::clone(&store), pipeline, config.reconcile_grace()),
        lifecycle,
        prices: PriceList::default(),
        currency: config.currency.clone(),
        store,
    }
}
