//! Region-grant reconciliation.
//!
//! The desired region set is edited as a whole, while the server only knows
//! how to add or remove one grant at a time. `plan` computes the smallest
//! set of single-grant operations; `RegionGrantReconciler` applies them one
//! by one, removals first, so that at every intermediate step the granted
//! set stays within `current ∪ desired`.
//!
//! There is no transaction. A failed operation stops the run and leaves the
//! grants applied so far in place; running again with the same desired set
//! fetches the new state and issues only what is still missing.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use hivegate_core::{RegionId, UserId};

use crate::error::GatewayError;
use crate::grants::RegionGrantStore;
use crate::records::AllowedRegion;

/// Operations needed to move from the current grants to the desired set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcilePlan {
    /// Grant records to revoke, ascending by region.
    pub to_remove: Vec<AllowedRegion>,
    /// Regions to grant, ascending.
    pub to_add: Vec<RegionId>,
}

impl ReconcilePlan {
    pub fn len(&self) -> usize {
        self.to_remove.len() + self.to_add.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pure diff between held grants and the desired region set.
///
/// Grants for undesired regions are removed. When the server holds more
/// than one grant for a desired region, the surplus copies are removed too
/// and the lowest-id grant is kept.
pub fn plan(current: &[AllowedRegion], desired: &BTreeSet<RegionId>) -> ReconcilePlan {
    let mut held: Vec<&AllowedRegion> = current.iter().collect();
    held.sort_by_key(|grant| (grant.region_id, grant.id));

    let mut kept = BTreeSet::new();
    let mut to_remove = Vec::new();
    for grant in held {
        if desired.contains(&grant.region_id) && kept.insert(grant.region_id) {
            continue;
        }
        to_remove.push(grant.clone());
    }

    let to_add = desired.difference(&kept).copied().collect();
    ReconcilePlan { to_remove, to_add }
}

/// One step of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOp {
    FetchCurrent,
    Revoke(RegionId),
    Grant(RegionId),
}

impl fmt::Display for GrantOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantOp::FetchCurrent => f.write_str("fetch current grants"),
            GrantOp::Revoke(region) => write!(f, "revoke region {region}"),
            GrantOp::Grant(region) => write!(f, "grant region {region}"),
        }
    }
}

/// What a run changed on the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    pub removed: Vec<RegionId>,
    pub added: Vec<RegionId>,
}

impl ReconcileReport {
    pub fn operations(&self) -> usize {
        self.removed.len() + self.added.len()
    }
}

/// A run stopped part-way. `applied` lists what did reach the server.
#[derive(Debug, Error)]
#[error("region grant reconciliation failed to {failed}: {source}")]
pub struct ReconcileError {
    pub applied: ReconcileReport,
    pub failed: GrantOp,
    #[source]
    pub source: GatewayError,
}

pub struct RegionGrantReconciler<S> {
    store: S,
}

impl<S: RegionGrantStore> RegionGrantReconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Converge `user`'s grants on `desired`.
    ///
    /// Operations run sequentially. Nothing is retried.
    pub async fn reconcile<I>(&self, user: UserId, desired: I) -> Result<ReconcileReport, ReconcileError>
    where
        I: IntoIterator<Item = RegionId>,
    {
        let desired: BTreeSet<RegionId> = desired.into_iter().collect();
        let mut report = ReconcileReport::default();

        let current = self.store.granted(user).await.map_err(|source| ReconcileError {
            applied: ReconcileReport::default(),
            failed: GrantOp::FetchCurrent,
            source,
        })?;

        let plan = plan(&current, &desired);
        tracing::info!(
            user_id = %user,
            current = current.len(),
            desired = desired.len(),
            to_remove = plan.to_remove.len(),
            to_add = plan.to_add.len(),
            "reconciling region grants"
        );

        for grant in &plan.to_remove {
            let op = GrantOp::Revoke(grant.region_id);
            if let Err(source) = self.store.revoke(grant).await {
                return Err(self.stopped(user, report, op, source));
            }
            report.removed.push(grant.region_id);
        }

        for region in &plan.to_add {
            let op = GrantOp::Grant(*region);
            if let Err(source) = self.store.grant(user, *region).await {
                return Err(self.stopped(user, report, op, source));
            }
            report.added.push(*region);
        }

        tracing::info!(
            user_id = %user,
            removed = report.removed.len(),
            added = report.added.len(),
            "region grants reconciled"
        );
        Ok(report)
    }

    fn stopped(
        &self,
        user: UserId,
        applied: ReconcileReport,
        failed: GrantOp,
        source: GatewayError,
    ) -> ReconcileError {
        tracing::warn!(
            user_id = %user,
            operation = %failed,
            applied = applied.operations(),
            error = %source,
            "region grant reconciliation stopped"
        );
        ReconcileError {
            applied,
            failed,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hivegate_core::GrantId;
    use proptest::prelude::*;
    use std::sync::Mutex;

    /// Server double: keeps grants in memory, logs every mutation and can be
    /// told to fail once a number of mutations went through.
    #[derive(Default)]
    struct FakeGrants {
        grants: Mutex<Vec<AllowedRegion>>,
        next_id: Mutex<i64>,
        log: Mutex<Vec<GrantOp>>,
        snapshots: Mutex<Vec<BTreeSet<RegionId>>>,
        fail_after: Mutex<Option<usize>>,
    }

    impl FakeGrants {
        fn with_regions(user: UserId, regions: &[i64]) -> Self {
            let fake = FakeGrants::default();
            for region in regions {
                fake.insert(user, region_id(*region));
            }
            fake
        }

        fn insert(&self, user: UserId, region: RegionId) -> AllowedRegion {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            let grant = AllowedRegion {
                id: Some(GrantId::new(*next).unwrap()),
                user_id: user,
                region_id: region,
                region: None,
            };
            self.grants.lock().unwrap().push(grant.clone());
            grant
        }

        fn regions(&self) -> BTreeSet<RegionId> {
            self.grants.lock().unwrap().iter().map(|g| g.region_id).collect()
        }

        fn mutations(&self) -> Vec<GrantOp> {
            self.log.lock().unwrap().clone()
        }

        fn fail_after(&self, n: Option<usize>) {
            *self.fail_after.lock().unwrap() = n;
        }

        fn admit(&self, op: GrantOp) -> Result<(), GatewayError> {
            let done = self.log.lock().unwrap().len();
            if matches!(*self.fail_after.lock().unwrap(), Some(limit) if done >= limit) {
                return Err(GatewayError::RequestFailed {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            self.log.lock().unwrap().push(op);
            Ok(())
        }

        fn snapshot(&self) {
            let regions = self.regions();
            self.snapshots.lock().unwrap().push(regions);
        }
    }

    #[async_trait]
    impl RegionGrantStore for FakeGrants {
        async fn granted(&self, user: UserId) -> Result<Vec<AllowedRegion>, GatewayError> {
            let grants = self.grants.lock().unwrap();
            Ok(grants.iter().filter(|g| g.user_id == user).cloned().collect())
        }

        async fn grant(&self, user: UserId, region: RegionId) -> Result<AllowedRegion, GatewayError> {
            self.admit(GrantOp::Grant(region))?;
            let grant = self.insert(user, region);
            self.snapshot();
            Ok(grant)
        }

        async fn revoke(&self, grant: &AllowedRegion) -> Result<(), GatewayError> {
            self.admit(GrantOp::Revoke(grant.region_id))?;
            self.grants.lock().unwrap().retain(|g| g.id != grant.id);
            self.snapshot();
            Ok(())
        }
    }

    fn user() -> UserId {
        UserId::new(42).unwrap()
    }

    fn region_id(id: i64) -> RegionId {
        RegionId::new(id).unwrap()
    }

    fn set(ids: &[i64]) -> BTreeSet<RegionId> {
        ids.iter().map(|id| region_id(*id)).collect()
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[tokio::test]
    async fn swaps_one_region_with_two_calls() {
        let store = FakeGrants::with_regions(user(), &[1, 2, 3]);
        let reconciler = RegionGrantReconciler::new(store);

        let report = reconciler.reconcile(user(), set(&[2, 3, 4])).await.unwrap();

        assert_eq!(report.removed, vec![region_id(1)]);
        assert_eq!(report.added, vec![region_id(4)]);
        assert_eq!(
            reconciler.store().mutations(),
            vec![GrantOp::Revoke(region_id(1)), GrantOp::Grant(region_id(4))]
        );
        assert_eq!(reconciler.store().regions(), set(&[2, 3, 4]));
    }

    #[tokio::test]
    async fn already_converged_issues_nothing() {
        let store = FakeGrants::with_regions(user(), &[5, 6]);
        let reconciler = RegionGrantReconciler::new(store);

        let report = reconciler.reconcile(user(), set(&[6, 5])).await.unwrap();
        assert_eq!(report.operations(), 0);
        assert!(reconciler.store().mutations().is_empty());
    }

    #[tokio::test]
    async fn partial_failure_resumes_with_the_remaining_diff() {
        let store = FakeGrants::with_regions(user(), &[1, 2]);
        store.fail_after(Some(2));
        let reconciler = RegionGrantReconciler::new(store);

        let err = reconciler.reconcile(user(), set(&[3, 4])).await.unwrap_err();
        assert_eq!(err.applied.removed, vec![region_id(1), region_id(2)]);
        assert!(err.applied.added.is_empty());
        assert_eq!(err.failed, GrantOp::Grant(region_id(3)));
        assert_eq!(err.source.status(), Some(503));

        reconciler.store().fail_after(None);
        let report = reconciler.reconcile(user(), set(&[3, 4])).await.unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(report.added, vec![region_id(3), region_id(4)]);
        assert_eq!(reconciler.store().mutations().len(), 4);
        assert_eq!(reconciler.store().regions(), set(&[3, 4]));
    }

    #[test]
    fn duplicate_grants_are_collapsed() {
        let store = FakeGrants::with_regions(user(), &[7, 7, 8]);
        let current = block_on(store.granted(user())).unwrap();

        let plan = plan(&current, &set(&[7]));
        let removed: Vec<(RegionId, Option<GrantId>)> =
            plan.to_remove.iter().map(|g| (g.region_id, g.id)).collect();
        assert_eq!(
            removed,
            vec![
                (region_id(7), Some(GrantId::new(2).unwrap())),
                (region_id(8), Some(GrantId::new(3).unwrap())),
            ]
        );
        assert!(plan.to_add.is_empty());
    }

    fn region_sets() -> impl Strategy<Value = BTreeSet<i64>> {
        proptest::collection::btree_set(1i64..16, 0..10)
    }

    proptest! {
        #[test]
        fn converges_with_minimal_operations(current in region_sets(), desired in region_sets()) {
            let current_ids: Vec<i64> = current.iter().copied().collect();
            let desired_set: BTreeSet<RegionId> = desired.iter().map(|id| region_id(*id)).collect();
            let current_set: BTreeSet<RegionId> = current.iter().map(|id| region_id(*id)).collect();

            let store = FakeGrants::with_regions(user(), &current_ids);
            let reconciler = RegionGrantReconciler::new(store);
            let report = block_on(reconciler.reconcile(user(), desired_set.clone())).unwrap();

            let expected_ops = current_set.difference(&desired_set).count()
                + desired_set.difference(&current_set).count();
            prop_assert_eq!(reconciler.store().regions(), desired_set.clone());
            prop_assert_eq!(report.operations(), expected_ops);
            prop_assert_eq!(reconciler.store().mutations().len(), expected_ops);

            let bound: BTreeSet<RegionId> = current_set.union(&desired_set).copied().collect();
            for state in reconciler.store().snapshots.lock().unwrap().iter() {
                prop_assert!(state.is_subset(&bound));
            }
        }

        #[test]
        fn rerun_after_failure_issues_only_the_remainder(
            current in region_sets(),
            desired in region_sets(),
            cut in 1usize..8,
        ) {
            let current_ids: Vec<i64> = current.iter().copied().collect();
            let desired_set: BTreeSet<RegionId> = desired.iter().map(|id| region_id(*id)).collect();
            let current_set: BTreeSet<RegionId> = current.iter().map(|id| region_id(*id)).collect();
            let total = current_set.symmetric_difference(&desired_set).count();
            prop_assume!(cut < total);

            let store = FakeGrants::with_regions(user(), &current_ids);
            store.fail_after(Some(cut));
            let reconciler = RegionGrantReconciler::new(store);

            let err = block_on(reconciler.reconcile(user(), desired_set.clone())).unwrap_err();
            prop_assert_eq!(err.applied.operations(), cut);

            reconciler.store().fail_after(None);
            let report = block_on(reconciler.reconcile(user(), desired_set.clone())).unwrap();
            prop_assert_eq!(report.operations(), total - cut);
            prop_assert_eq!(reconciler.store().mutations().len(), total);
            prop_assert_eq!(reconciler.store().regions(), desired_set);
        }
    }
}
