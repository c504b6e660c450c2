//! Per-cluster mutual exclusion.
//!
//! Every read-modify-write of a cluster's ledger and deployments runs
//! while holding that cluster's lock. Clusters never share a lock, so
//! scheduling on one cluster never waits on another.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use capgrid_state::{ClusterId, StateStore};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use crate::error::{SchedulerError, SchedulerResult};

#[derive(Clone, Default)]
pub struct ClusterLocks {
    locks: Arc<Mutex<HashMap<ClusterId, Arc<Mutex<()>>>>>,
}

impl ClusterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `timeout` for the cluster's lock.
    ///
    /// Times out with [`SchedulerError::Unavailable`].
    pub async fn acquire(
        &self,
        cluster_id: ClusterId,
        timeout: Duration,
    ) -> SchedulerResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(cluster_id).or_default())
        };

        tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                warn!(cluster = cluster_id, ?timeout, "timed out waiting for cluster lock");
                SchedulerError::Unavailable(format!(
                    "cluster {cluster_id} is busy, retry later"
                ))
            })
    }

    /// Drop the lock entry for a deleted cluster.
    pub async fn forget(&self, cluster_id: ClusterId) {
        self.locks.lock().await.remove(&cluster_id);
    }

    /// Drop the entry once the cluster's row is gone.
    ///
    /// Entries of live clusters stay put: a waiter may still hold the
    /// old mutex, and a fresh one would let a second caller in.
    pub async fn forget_if_gone(&self, state: &StateStore, cluster_id: ClusterId) {
        match state.get_cluster(cluster_id) {
            Ok(None) => self.forget(cluster_id).await,
            Ok(Some(_)) => {}
            Err(e) => warn!(cluster = cluster_id, error = %e, "could not check cluster for lock cleanup"),
        }
    }

    /// Number of clusters with a lock entry (for diagnostics).
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
