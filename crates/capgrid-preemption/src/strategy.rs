//! The preemption strategy contract and the walk every strategy shares.
//!
//! All strategies first try the fast path: if the cluster's available
//! capacity covers the demand in every dimension, nothing is preempted.
//! Otherwise the strategy orders the running deployments by its own
//! criterion and hands them to [`greedy_single_candidate`], which picks
//! the first deployment whose release alone would make room.

use capgrid_core::{EPSILON, ResourceVector};
use capgrid_state::{Cluster, Deployment, DeploymentStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// An incoming deployment as the strategies see it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub demand: ResourceVector,
    /// Carried for strategies that want it; not an admission criterion.
    pub priority: i32,
}

/// What a strategy decided for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulePlan {
    /// Deployments to transition to `Preempted`. Empty on the fast path.
    pub preempted: Vec<Deployment>,
    /// Cluster availability once the preemptions are released and the
    /// request is reserved.
    pub remaining: ResourceVector,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("insufficient resources: requested {requested}, available {available}")]
    InsufficientResources {
        requested: ResourceVector,
        available: ResourceVector,
    },
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Computes a schedule for one request against one cluster.
///
/// `running` holds the cluster's deployments as read in the caller's
/// transaction. Implementations must be pure: same inputs, same plan.
pub trait PreemptionStrategy: Send + Sync {
    /// Key the strategy is registered under.
    fn name(&self) -> &'static str;

    fn compute_schedule(
        &self,
        cluster: &Cluster,
        running: &[Deployment],
        request: &ScheduleRequest,
    ) -> ScheduleResult<SchedulePlan>;
}

/// Admit without preemption when availability already covers the demand
/// (within [`EPSILON`], the same residue the ledger settles).
pub fn fast_path(cluster: &Cluster, request: &ScheduleRequest) -> Option<SchedulePlan> {
    let available = cluster.available();
    available
        .covers_within(&request.demand, EPSILON)
        .then(|| SchedulePlan {
            preempted: Vec::new(),
            remaining: available.saturating_sub(&request.demand),
        })
}

/// Candidates a strategy may order: running deployments on this cluster.
pub(crate) fn preemptible<'a>(cluster: &Cluster, running: &'a [Deployment]) -> Vec<&'a Deployment> {
    running
        .iter()
        .filter(|d| d.cluster_id == cluster.id && d.status == DeploymentStatus::Running)
        .collect()
}

/// Walk `ordered` and pick the first candidate whose release alone makes
/// the request fit (within [`EPSILON`]). Candidates are tested one at a
/// time against the current availability, never in combination.
pub(crate) fn greedy_single_candidate(
    strategy: &str,
    cluster: &Cluster,
    ordered: &[&Deployment],
    request: &ScheduleRequest,
) -> ScheduleResult<SchedulePlan> {
    let available = cluster.available();

    for candidate in ordered {
        let would_be_available = available + candidate.demand;
        if would_be_available.covers_within(&request.demand, EPSILON) {
            info!(
                strategy,
                cluster = cluster.id,
                victim = candidate.id,
                victim_priority = candidate.priority,
                "selected deployment for preemption"
            );
            return Ok(SchedulePlan {
                preempted: vec![(*candidate).clone()],
                remaining: would_be_available.saturating_sub(&request.demand),
            });
        }
        debug!(
            strategy,
            cluster = cluster.id,
            candidate = candidate.id,
            "releasing candidate would not make room"
        );
    }

    warn!(
        strategy,
        cluster = cluster.id,
        requested = %request.demand,
        %available,
        candidates = ordered.len(),
        "no single preemption satisfies request"
    );
    Err(ScheduleError::InsufficientResources {
        requested: request.demand,
        available,
    })
}
