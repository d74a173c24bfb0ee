use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rdpstore_core::{InstanceId, OrderId, OwnerId};
use rdpstore_provisioning::{Instance, InstanceStatus, Order, PaymentStatus, SystemLogEntry};

use super::r#trait::{InstanceStore, InstanceUpdate, LogStore, OrderStore, StoreError};

/// In-memory persistence.
///
/// Intended for tests/dev. Each map sits behind its own lock, so every
/// conditional write is a single critical section.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    orders: RwLock<HashMap<OrderId, Order>>,
    instances: RwLock<HashMap<InstanceId, Instance>>,
    logs: RwLock<Vec<SystemLogEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, order: Order) -> Result<Order, StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;
        if orders.contains_key(&order.id) {
            return Err(StoreError::AlreadyExists {
                entity: "order",
                id: order.id.to_string(),
            });
        }
        orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let orders = self.orders.read().map_err(|_| poisoned())?;
        Ok(orders.get(&id).cloned())
    }

    async fn list_orders_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().map_err(|_| poisoned())?;
        let mut out: Vec<Order> = orders
            .values()
            .filter(|o| o.owner_id == owner_id)
            .cloned()
            .collect();
        out.sort_by_key(|o| (o.created_at, o.id));
        Ok(out)
    }

    async fn list_underprovisioned_orders(&self) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().map_err(|_| poisoned())?;
        let mut out: Vec<Order> = orders
            .values()
            .filter(|o| o.provisioning_claimed && (o.linked_instance_ids.len() as u64) < o.unit_count())
            .cloned()
            .collect();
        out.sort_by_key(|o| (o.created_at, o.id));
        Ok(out)
    }

    async fn compare_and_set_payment_status(
        &self,
        id: OrderId,
        expected: PaymentStatus,
        new: PaymentStatus,
    ) -> Result<Order, StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::order_not_found(id))?;

        if order.payment_status != expected {
            return Err(StoreError::Conflict {
                expected: expected.to_string(),
                actual: order.payment_status.to_string(),
            });
        }

        order.payment_status = new;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn claim_provisioning(&self, id: OrderId) -> Result<bool, StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::order_not_found(id))?;

        if order.is_provisioned() {
            return Ok(false);
        }
        order.provisioning_claimed = true;
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn release_provisioning(&self, id: OrderId) -> Result<bool, StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::order_not_found(id))?;

        if !order.linked_instance_ids.is_empty() {
            return Ok(false);
        }
        order.provisioning_claimed = false;
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn acquire_reconcile_lease(
        &self,
        id: OrderId,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::order_not_found(id))?;

        if order.reconcile_lease_until.is_some_and(|held| held > now) {
            return Ok(false);
        }
        order.reconcile_lease_until = Some(until);
        Ok(true)
    }

    async fn release_reconcile_lease(&self, id: OrderId) -> Result<(), StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::order_not_found(id))?;
        order.reconcile_lease_until = None;
        Ok(())
    }

    async fn link_instance(&self, id: OrderId, instance_id: InstanceId) -> Result<Order, StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::order_not_found(id))?;

        if !order.linked_instance_ids.contains(&instance_id) {
            order.linked_instance_ids.push(instance_id);
            order.updated_at = Utc::now();
        }
        Ok(order.clone())
    }
}

#[async_trait]
impl InstanceStore for InMemoryStore {
    async fn insert_instance(&self, instance: Instance) -> Result<Instance, StoreError> {
        let mut instances = self.instances.write().map_err(|_| poisoned())?;
        if instances.contains_key(&instance.id) {
            return Err(StoreError::AlreadyExists {
                entity: "instance",
                id: instance.id.to_string(),
            });
        }
        instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    async fn get_instance(&self, id: InstanceId) -> Result<Option<Instance>, StoreError> {
        let instances = self.instances.read().map_err(|_| poisoned())?;
        Ok(instances.get(&id).cloned())
    }

    async fn get_instances(&self, ids: &[InstanceId]) -> Result<Vec<Instance>, StoreError> {
        let instances = self.instances.read().map_err(|_| poisoned())?;
        Ok(ids.iter().filter_map(|id| instances.get(id).cloned()).collect())
    }

    async fn list_instances_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Instance>, StoreError> {
        let instances = self.instances.read().map_err(|_| poisoned())?;
        let mut out: Vec<Instance> = instances
            .values()
            .filter(|i| i.owner_id == owner_id)
            .cloned()
            .collect();
        out.sort_by_key(|i| (i.created_at, i.id));
        Ok(out)
    }

    async fn list_instances_created_between(
        &self,
        owner_id: OwnerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Instance>, StoreError> {
        let instances = self.instances.read().map_err(|_| poisoned())?;
        let mut out: Vec<Instance> = instances
            .values()
            .filter(|i| i.owner_id == owner_id && i.created_at >= from && i.created_at <= to)
            .cloned()
            .collect();
        out.sort_by_key(|i| (i.created_at, i.id));
        Ok(out)
    }

    async fn compare_and_update(
        &self,
        id: InstanceId,
        expected: InstanceStatus,
        update: InstanceUpdate,
    ) -> Result<Instance, StoreError> {
        let mut instances = self.instances.write().map_err(|_| poisoned())?;
        let instance = instances
            .get_mut(&id)
            .ok_or_else(|| StoreError::instance_not_found(id))?;

        if instance.status != expected {
            return Err(StoreError::Conflict {
                expected: expected.to_string(),
                actual: instance.status.to_string(),
            });
        }

        if let Some(status) = update.status {
            instance.status = status;
        }
        if let Some(ip) = update.ip_address {
            instance.ip_address = Some(ip);
        }
        if let Some(creds) = update.credentials {
            instance.username = creds.username;
            instance.password = creds.password;
        }
        instance.updated_at = Utc::now();
        Ok(instance.clone())
    }
}

#[async_trait]
impl LogStore for InMemoryStore {
    async fn append_log(&self, entry: SystemLogEntry) -> Result<(), StoreError> {
        let mut logs = self.logs.write().map_err(|_| poisoned())?;
        logs.push(entry);
        Ok(())
    }

    async fn logs_for_instance(&self, id: InstanceId) -> Result<Vec<SystemLogEntry>, StoreError> {
        let logs = self.logs.read().map_err(|_| poisoned())?;
        Ok(logs.iter().filter(|e| e.instance_id == id).cloned().collect())
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<SystemLogEntry>, StoreError> {
        let logs = self.logs.read().map_err(|_| poisoned())?;
        Ok(logs.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rdpstore_catalog::{PlanConfiguration, PlanDuration, PriceList};
    use rdpstore_provisioning::{
        BillingContact, CredentialGenerator, LogAction, OsRngCredentialGenerator,
    };

    fn plan() -> PlanConfiguration {
        PlanConfiguration {
            cpu_cores: 2,
            ram_gb: 4,
            storage_gb: 64,
            os: "ubuntu".to_string(),
            region: "us-east".to_string(),
            addons: vec![],
            duration: PlanDuration::Months(1),
        }
    }

    fn contact() -> BillingContact {
        BillingContact {
            full_name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            address_line1: "1 Analytical St".to_string(),
            address_line2: None,
            city: "London".to_string(),
            postal_code: "N1 9GU".to_string(),
            country: "GB".to_string(),
            phone: None,
        }
    }

    fn order(owner: OwnerId, status: PaymentStatus) -> Order {
        let line = PriceList::default().resolve(&plan()).unwrap().with_quantity(2);
        Order::place(owner, vec![line], "USD", contact(), status, Utc::now()).unwrap()
    }

    fn instance(owner: OwnerId, order_id: OrderId) -> Instance {
        let creds = OsRngCredentialGenerator.generate();
        Instance::provision(owner, order_id, "vm", creds, plan(), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_order_id() {
        let store = InMemoryStore::new();
        let o = order(OwnerId::new(), PaymentStatus::Pending);
        store.insert_order(o.clone()).await.unwrap();
        let err = store.insert_order(o).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { entity: "order", .. }));
    }

    #[tokio::test]
    async fn payment_status_cas_rejects_stale_expectation() {
        let store = InMemoryStore::new();
        let o = store
            .insert_order(order(OwnerId::new(), PaymentStatus::Pending))
            .await
            .unwrap();

        let updated = store
            .compare_and_set_payment_status(o.id, PaymentStatus::Pending, PaymentStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(updated.payment_status, PaymentStatus::Cancelled);

        let err = store
            .compare_and_set_payment_status(o.id, PaymentStatus::Pending, PaymentStatus::Completed)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict {
                expected: "pending".to_string(),
                actual: "cancelled".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn claim_is_granted_once() {
        let store = Arc::new(InMemoryStore::new());
        let o = store
            .insert_order(order(OwnerId::new(), PaymentStatus::Pending))
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move { store.claim_provisioning(o.id).await.unwrap() }));
        }
        let mut granted = 0;
        for t in tasks {
            if t.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn concurrent_links_are_not_lost() {
        let store = Arc::new(InMemoryStore::new());
        let owner = OwnerId::new();
        let o = store.insert_order(order(owner, PaymentStatus::Completed)).await.unwrap();

        let ids: Vec<InstanceId> = (0..16).map(|_| InstanceId::new()).collect();
        let mut tasks = Vec::new();
        for id in ids.clone() {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move { store.link_instance(o.id, id).await }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        // Relinking is a no-op.
        store.link_instance(o.id, ids[0]).await.unwrap();

        let stored = store.get_order(o.id).await.unwrap().unwrap();
        assert_eq!(stored.linked_instance_ids.len(), ids.len());
        for id in ids {
            assert!(stored.linked_instance_ids.contains(&id));
        }
    }

    #[tokio::test]
    async fn instance_cas_applies_fields_only_on_match() {
        let store = InMemoryStore::new();
        let owner = OwnerId::new();
        let i = store.insert_instance(instance(owner, OrderId::new())).await.unwrap();

        let err = store
            .compare_and_update(i.id, InstanceStatus::Active, InstanceUpdate::status(InstanceStatus::Offline))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let updated = store
            .compare_and_update(
                i.id,
                InstanceStatus::Provisioning,
                InstanceUpdate::status(InstanceStatus::Active).with_ip_address("10.0.0.7"),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, InstanceStatus::Active);
        assert_eq!(updated.ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(updated.username, i.username);
    }

    #[tokio::test]
    async fn unknown_rows_surface_not_found() {
        let store = InMemoryStore::new();
        assert!(store.get_order(OrderId::new()).await.unwrap().is_none());
        let err = store.link_instance(OrderId::new(), InstanceId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "order", .. }));
        let err = store
            .compare_and_update(InstanceId::new(), InstanceStatus::Active, InstanceUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "instance", .. }));
    }

    #[tokio::test]
    async fn scans_filter_by_owner_and_window() {
        let store = InMemoryStore::new();
        let owner = OwnerId::new();
        let before = Utc::now();
        let mine = store.insert_instance(instance(owner, OrderId::new())).await.unwrap();
        store.insert_instance(instance(OwnerId::new(), OrderId::new())).await.unwrap();
        let after = Utc::now();

        let found = store
            .list_instances_created_between(owner, before, after)
            .await
            .unwrap();
        assert_eq!(found, vec![mine.clone()]);
        assert_eq!(store.list_instances_by_owner(owner).await.unwrap(), vec![mine]);
    }

    #[tokio::test]
    async fn underprovisioned_scan_only_sees_claimed_orders_missing_links() {
        let store = InMemoryStore::new();
        let owner = OwnerId::new();
        store.insert_order(order(owner, PaymentStatus::Pending)).await.unwrap();
        let claimed = store.insert_order(order(owner, PaymentStatus::Completed)).await.unwrap();
        store.claim_provisioning(claimed.id).await.unwrap();
        store.link_instance(claimed.id, InstanceId::new()).await.unwrap();

        // Two units, one link.
        let under = store.list_underprovisioned_orders().await.unwrap();
        assert_eq!(under.len(), 1);
        assert_eq!(under[0].id, claimed.id);
    }

    #[tokio::test]
    async fn claim_release_is_refused_once_linked() {
        let store = InMemoryStore::new();
        let o = store
            .insert_order(order(OwnerId::new(), PaymentStatus::Pending))
            .await
            .unwrap();

        assert!(store.claim_provisioning(o.id).await.unwrap());
        assert!(store.release_provisioning(o.id).await.unwrap());
        assert!(!store.get_order(o.id).await.unwrap().unwrap().is_provisioned());

        assert!(store.claim_provisioning(o.id).await.unwrap());
        store.link_instance(o.id, InstanceId::new()).await.unwrap();
        assert!(!store.release_provisioning(o.id).await.unwrap());
        assert!(store.get_order(o.id).await.unwrap().unwrap().provisioning_claimed);
    }

    #[tokio::test]
    async fn reconcile_lease_has_one_holder_until_released_or_expired() {
        let store = Arc::new(InMemoryStore::new());
        let o = store
            .insert_order(order(OwnerId::new(), PaymentStatus::Completed))
            .await
            .unwrap();
        let now = Utc::now();
        let until = now + chrono::Duration::seconds(60);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store.acquire_reconcile_lease(o.id, now, until).await.unwrap()
            }));
        }
        let mut granted = 0;
        for t in tasks {
            if t.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);

        // An expired lease can be taken over.
        let later = until + chrono::Duration::seconds(1);
        assert!(store.acquire_reconcile_lease(o.id, later, later).await.unwrap());

        store.release_reconcile_lease(o.id).await.unwrap();
        assert!(store.acquire_reconcile_lease(o.id, now, until).await.unwrap());
    }

    #[tokio::test]
    async fn recent_logs_are_newest_first_and_bounded() {
        let store = InMemoryStore::new();
        let id = InstanceId::new();
        for action in [LogAction::Start, LogAction::Shutdown, LogAction::Restart] {
            store
                .append_log(SystemLogEntry::completed(id, action, "ok"))
                .await
                .unwrap();
        }
        let recent = store.recent_logs(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, LogAction::Restart);
        assert_eq!(recent[1].action, LogAction::Shutdown);
        assert_eq!(store.logs_for_instance(id).await.unwrap()[0].action, LogAction::Start);
    }
}
