//! Recovery for fulfillments that stopped half-way.
//!
//! An order is written before its instances, and each instance before its
//! link, so a crash leaves one of two shapes: a claimed order with fewer
//! linked instances than units, or instances that carry the order's id but
//! were never linked. Both are found by scanning; both are repaired without
//! ever creating more instances than the order has units.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;

use rdpstore_catalog::Fingerprint;
use rdpstore_core::{InstanceId, OrderId};
use rdpstore_provisioning::{Instance, Order};

use crate::pipeline::{FulfillmentError, FulfillmentPipeline, UnitBatch};
use crate::store::{Persistence, StoreError};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("order {0} not found")]
    NotFound(OrderId),

    /// Provisioning never started; completing the order is an admin decision.
    #[error("order {0} was never claimed for provisioning")]
    NotClaimed(OrderId),

    /// The order is younger than the grace period; its fulfillment may still run.
    #[error("order {0} is too recent to reconcile")]
    TooRecent(OrderId),

    /// Another reconciliation run holds the order's lease.
    #[error("reconciliation of order {0} is already in progress")]
    InProgress(OrderId),

    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),

    #[error("persistence failure: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub struct ResumeReport {
    pub order: Order,
    pub relinked: Vec<InstanceId>,
    pub created: Vec<Instance>,
    pub notification: Option<JoinHandle<()>>,
}

/// How long one `resume` may hold an order before others may take over.
const RESUME_LEASE_SECS: i64 = 300;

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn Persistence>,
    pipeline: FulfillmentPipeline,
    grace: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Persistence>, pipeline: FulfillmentPipeline, grace: Duration) -> Self {
        Self { store, pipeline, grace }
    }

    /// Claimed orders older than the grace period that still miss instances.
    pub async fn stalled_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, ReconcileError> {
        let cutoff = now - self.grace;
        Ok(self
            .store
            .list_underprovisioned_orders()
            .await?
            .into_iter()
            .filter(|o| o.created_at <= cutoff)
            .collect())
    }

    /// Instances created for `order` that its link list does not know about.
    pub async fn orphaned_instances(&self, order: &Order) -> Result<Vec<Instance>, ReconcileError> {
        Ok(self
            .created_for(order)
            .await?
            .into_iter()
            .filter(|i| !order.linked_instance_ids.contains(&i.id))
            .collect())
    }

    /// Link every orphan of the order.
    pub async fn relink(&self, id: OrderId) -> Result<(Order, Vec<InstanceId>), ReconcileError> {
        let mut order = self.load(id).await?;
        let mut relinked = Vec::new();
        for orphan in self.orphaned_instances(&order).await? {
            order = self.store.link_instance(id, orphan.id).await?;
            relinked.push(orphan.id);
        }
        if !relinked.is_empty() {
            tracing::info!(order_id = %id, relinked = relinked.len(), "orphaned instances relinked");
        }
        Ok((order, relinked))
    }

    /// Relink orphans, then create whatever units are still missing.
    ///
    /// Refuses orders younger than the grace period. Runs on one order are
    /// serialized through the order's reconciliation lease.
    pub async fn resume(&self, id: OrderId) -> Result<ResumeReport, ReconcileError> {
        self.resume_at(id, Utc::now()).await
    }

    async fn resume_at(&self, id: OrderId, now: DateTime<Utc>) -> Result<ResumeReport, ReconcileError> {
        let order = self.load(id).await?;
        if !order.provisioning_claimed {
            return Err(ReconcileError::NotClaimed(id));
        }
        if order.created_at > now - self.grace {
            return Err(ReconcileError::TooRecent(id));
        }

        let taken_at = Utc::now();
        let until = taken_at + Duration::seconds(RESUME_LEASE_SECS);
        if !self.store.acquire_reconcile_lease(id, taken_at, until).await? {
            tracing::info!(order_id = %id, "reconciliation already running");
            return Err(ReconcileError::InProgress(id));
        }

        let outcome = self.resume_leased(id).await;
        if let Err(err) = self.store.release_reconcile_lease(id).await {
            tracing::warn!(order_id = %id, error = %err, "failed to release reconciliation lease");
        }
        outcome
    }

    /// Body of `resume`; the caller holds the order's lease.
    async fn resume_leased(&self, id: OrderId) -> Result<ResumeReport, ReconcileError> {
        let (order, relinked) = self.relink(id).await?;
        let existing = self.created_for(&order).await?;

        let mut per_line: HashMap<&Fingerprint, u32> = HashMap::new();
        for instance in &existing {
            if let Some(line) = order
                .line_items
                .iter()
                .find(|l| l.configuration == instance.plan_details)
            {
                *per_line.entry(&line.fingerprint).or_default() += 1;
            }
        }

        let batches: Vec<UnitBatch<'_>> = order
            .line_items
            .iter()
            .filter_map(|line| {
                let have = per_line.get(&line.fingerprint).copied().unwrap_or(0);
                (have < line.quantity).then(|| UnitBatch {
                    line,
                    first_unit: have + 1,
                    count: line.quantity - have,
                })
            })
            .collect();

        if batches.is_empty() {
            return Ok(ResumeReport {
                order,
                relinked,
                created: Vec::new(),
                notification: None,
            });
        }

        tracing::info!(
            order_id = %id,
            missing = batches.iter().map(|b| u64::from(b.count)).sum::<u64>(),
            "resuming instance creation"
        );
        let (order, created) = self.pipeline.create_units(&order, &batches).await?;
        let notification = self.pipeline.deliver(&order, &created, existing.is_empty());

        Ok(ResumeReport {
            order,
            relinked,
            created,
            notification: Some(notification),
        })
    }

    /// Resume every stalled order; failures are logged and skipped.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<ResumeReport>, ReconcileError> {
        let mut reports = Vec::new();
        for order in self.stalled_orders(now).await? {
            match self.resume_at(order.id, now).await {
                Ok(report) => reports.push(report),
                Err(err) => tracing::warn!(order_id = %order.id, error = %err, "reconciliation failed"),
            }
        }
        Ok(reports)
    }

    async fn load(&self, id: OrderId) -> Result<Order, ReconcileError> {
        self.store
            .get_order(id)
            .await?
            .ok_or(ReconcileError::NotFound(id))
    }

    /// Instances carrying the order's id, found by the order's creation window.
    async fn created_for(&self, order: &Order) -> Result<Vec<Instance>, ReconcileError> {
        Ok(self
            .store
            .list_instances_created_between(order.owner_id, order.created_at, Utc::now())
            .await?
            .into_iter()
            .filter(|i| i.order_id == order.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rdpstore_catalog::{LineItem, PlanDuration};
    use rdpstore_core::OwnerId;
    use rdpstore_provisioning::{CredentialGenerator, OsRngCredentialGenerator, PaymentStatus};

    use crate::pipeline::tests::{Faults, Harness, contact, faulty_pipeline, harness, plan};
    use crate::store::{InstanceStore, OrderStore};

    fn reconciler(h: &Harness) -> Reconciler {
        Reconciler::new(h.store.clone(), h.pipeline.clone(), Duration::seconds(300))
    }

    /// A claimed order placed `age` ago that has no instances yet.
    async fn claimed_order(store: &dyn Persistence, quantity: u32, age: Duration) -> Order {
        let line = LineItem::new(plan(PlanDuration::Months(1)), 2900).with_quantity(quantity);
        let mut order = Order::place(
            OwnerId::new(),
            vec![line],
            "USD",
            contact(),
            PaymentStatus::Completed,
            Utc::now() - age,
        )
        .unwrap();
        order.provisioning_claimed = true;
        store.insert_order(order).await.unwrap()
    }

    fn past_grace() -> Duration {
        Duration::seconds(600)
    }

    async fn unlinked_instance(h: &Harness, order: &Order) -> Instance {
        let instance = Instance::provision(
            order.owner_id,
            order.id,
            "left behind",
            OsRngCredentialGenerator.generate(),
            order.line_items[0].configuration.clone(),
            Utc::now(),
        )
        .unwrap();
        h.store.insert_instance(instance).await.unwrap()
    }

    #[tokio::test]
    async fn stalled_orders_respect_grace_period() {
        let h = harness();
        let r = reconciler(&h);
        let order = claimed_order(&*h.store, 1, Duration::zero()).await;

        assert!(r.stalled_orders(Utc::now()).await.unwrap().is_empty());

        let later = Utc::now() + Duration::seconds(301);
        let stalled = r.stalled_orders(later).await.unwrap();
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].id, order.id);
    }

    #[tokio::test]
    async fn orphans_are_found_and_relinked() {
        let h = harness();
        let r = reconciler(&h);
        let order = claimed_order(&*h.store, 1, Duration::zero()).await;
        let orphan = unlinked_instance(&h, &order).await;

        let found = r.orphaned_instances(&order).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, orphan.id);

        let (order, relinked) = r.relink(order.id).await.unwrap();
        assert_eq!(relinked, vec![orphan.id]);
        assert_eq!(order.linked_instance_ids, vec![orphan.id]);
        assert!(r.orphaned_instances(&order).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resume_creates_only_missing_units() {
        let h = harness();
        let r = reconciler(&h);
        let order = claimed_order(&*h.store, 3, past_grace()).await;
        let orphan = unlinked_instance(&h, &order).await;

        let report = r.resume(order.id).await.unwrap();
        report.notification.unwrap().await.unwrap();

        assert_eq!(report.relinked, vec![orphan.id]);
        assert_eq!(report.created.len(), 2);
        assert_eq!(report.order.linked_instance_ids.len(), 3);
        assert!(report.created[0].name.ends_with("#2"));
        assert!(report.created[1].name.ends_with("#3"));

        // Credentials for the new instances only; invoice went out with the first batch.
        let sent = h.notifier.deliveries();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].credentials().count(), 2);
        assert!(sent[0].invoice().is_none());

        let again = r.resume(order.id).await.unwrap();
        assert!(again.created.is_empty());
        assert!(again.relinked.is_empty());
        assert_eq!(h.store.list_instances_by_owner(order.owner_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn sweep_repairs_stalled_orders() {
        let h = harness();
        let r = reconciler(&h);
        let order = claimed_order(&*h.store, 2, Duration::zero()).await;

        let reports = r.sweep(Utc::now() + Duration::seconds(301)).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].created.len(), 2);

        let stored = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.linked_instance_ids.len(), 2);
        assert!(r.stalled_orders(Utc::now() + Duration::seconds(301)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resume_refuses_orders_inside_grace_period() {
        let h = harness();
        let order = claimed_order(&*h.store, 2, Duration::zero()).await;

        assert!(matches!(
            reconciler(&h).resume(order.id).await,
            Err(ReconcileError::TooRecent(_))
        ));
        assert!(h.store.list_instances_by_owner(order.owner_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_resumes_create_each_missing_unit_once() {
        let (store, pipeline) = faulty_pipeline(Faults {
            latency: Some(std::time::Duration::from_millis(5)),
            ..Faults::default()
        });
        let r = Reconciler::new(Arc::clone(&store), pipeline, Duration::seconds(300));
        let order = claimed_order(store.as_ref(), 3, past_grace()).await;

        let (a, b) = tokio::join!(r.resume(order.id), r.resume(order.id));
        let (done, lost) = match (a, b) {
            (Ok(done), Err(lost)) | (Err(lost), Ok(done)) => (done, lost),
            (a, b) => panic!("expected one winner, got {a:?} and {b:?}"),
        };
        assert!(matches!(lost, ReconcileError::InProgress(id) if id == order.id));
        assert_eq!(done.created.len(), 3);

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.linked_instance_ids.len(), 3);
        assert!(stored.reconcile_lease_until.is_none());
        assert_eq!(store.list_instances_by_owner(order.owner_id).await.unwrap().len(), 3);

        let again = r.resume(order.id).await.unwrap();
        assert!(again.created.is_empty());
    }

    #[tokio::test]
    async fn failed_resume_releases_its_lease() {
        let (store, pipeline) = faulty_pipeline(Faults {
            refuse_instance_writes: true,
            ..Faults::default()
        });
        let r = Reconciler::new(Arc::clone(&store), pipeline, Duration::seconds(300));
        let order = claimed_order(store.as_ref(), 1, past_grace()).await;

        assert!(matches!(r.resume(order.id).await, Err(ReconcileError::Fulfillment(_))));
        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert!(stored.reconcile_lease_until.is_none());
        assert!(matches!(r.resume(order.id).await, Err(ReconcileError::Fulfillment(_))));
    }

    #[tokio::test]
    async fn unclaimed_orders_are_left_to_admins() {
        let h = harness();
        let order = Order::place(
            OwnerId::new(),
            vec![LineItem::new(plan(PlanDuration::Months(1)), 2900)],
            "USD",
            contact(),
            PaymentStatus::Pending,
            Utc::now(),
        )
        .unwrap();
        let order = h.store.insert_order(order).await.unwrap();

        assert!(matches!(
            reconciler(&h).resume(order.id).await,
            Err(ReconcileError::NotClaimed(_))
        ));
    }
}
