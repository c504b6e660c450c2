//! DeploymentScheduler — admission, preemption and lifecycle transitions.
//!
//! Every call runs to completion synchronously: take the cluster's lock,
//! then do the whole read-modify-write inside one store transaction.
//! Either every mutation of a call lands (preemptions, the new row and
//! the reservation) or none of them does.

use std::sync::Arc;
use std::time::Duration;

use capgrid_core::{ResourceVector, epoch_secs};
use capgrid_core::config::SchedulerSettings;
use capgrid_preemption::{SchedulePlan, ScheduleRequest, StrategySelector};
use capgrid_state::tables::DEPLOYMENTS;
use capgrid_state::*;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::error::{SchedulerError, SchedulerResult};
use crate::locks::ClusterLocks;

const NO_CLUSTERS: &str = "No clusters found for the user's organization.";
const NO_DEPLOYMENTS: &str = "No deployments found for the user's organization.";

/// Tunables for a [`DeploymentScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Strategy used when a request names none.
    pub default_strategy: String,
    /// How long to wait for a busy cluster before giving up.
    pub lock_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&SchedulerSettings::default())
    }
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            default_strategy: settings.default_strategy.clone(),
            lock_timeout: Duration::from_millis(settings.lock_timeout_ms),
        }
    }
}

/// A workload a user asks to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub name: String,
    pub docker_image: String,
    pub cpu_required: f64,
    pub ram_required: f64,
    pub gpu_required: f64,
    #[serde(default)]
    pub priority: i32,
}

impl DeploymentRequest {
    pub fn demand(&self) -> ResourceVector {
        ResourceVector::new(self.cpu_required, self.ram_required, self.gpu_required)
    }

    fn validate(&self) -> SchedulerResult<()> {
        if self.name.trim().is_empty() {
            return Err(SchedulerError::InvalidRequest("name must not be empty".into()));
        }
        if self.docker_image.trim().is_empty() {
            return Err(SchedulerError::InvalidRequest(
                "docker_image must not be empty".into(),
            ));
        }
        let demand = self.demand();
        if !demand.is_valid_amount() {
            return Err(SchedulerError::InvalidRequest(format!(
                "resource demand must be finite and non-negative, got {demand}"
            )));
        }
        Ok(())
    }
}

/// Orchestrates scheduling against the state store.
///
/// Cheap to clone; clones share the store, the strategies and the
/// per-cluster locks.
#[derive(Clone)]
pub struct DeploymentScheduler {
    state: StateStore,
    selector: Arc<StrategySelector>,
    locks: ClusterLocks,
    config: SchedulerConfig,
}

impl DeploymentScheduler {
    pub fn new(state: StateStore, selector: StrategySelector, config: SchedulerConfig) -> Self {
        Self {
            state,
            selector: Arc::new(selector),
            locks: ClusterLocks::new(),
            config,
        }
    }

    /// Builtin strategies and default tunables.
    pub fn with_defaults(state: StateStore) -> Self {
        Self::new(state, StrategySelector::with_builtin(), SchedulerConfig::default())
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub(crate) fn locks(&self) -> &ClusterLocks {
        &self.locks
    }

    pub(crate) fn lock_timeout(&self) -> Duration {
        self.config.lock_timeout
    }

    // ── Admission ──────────────────────────────────────────────────

    /// Admit `request` onto `cluster_id`, preempting at most one running
    /// deployment to make room.
    ///
    /// Returns the new deployment in `Pending`.
    pub async fn handle_deployment(
        &self,
        request: &DeploymentRequest,
        strategy: Option<&str>,
        cluster_id: ClusterId,
        user: &User,
    ) -> SchedulerResult<Deployment> {
        request.validate()?;
        // Unknown ids never get a lock entry.
        if self.state.get_cluster(cluster_id)?.is_none() {
            return Err(cluster_not_found(cluster_id));
        }

        let strategy = self
            .selector
            .select(strategy.unwrap_or(&self.config.default_strategy));
        let schedule_request = ScheduleRequest {
            demand: request.demand(),
            priority: request.priority,
        };

        let guard = self.locks.acquire(cluster_id, self.config.lock_timeout).await?;

        let outcome = self.state.transact(|txn| {
            let mut cluster = txn
                .get_cluster(cluster_id)?
                .ok_or_else(|| cluster_not_found(cluster_id))?;
            authorize(&cluster, user)?;

            let running = txn.list_running_deployments(cluster_id)?;
            let plan = strategy.compute_schedule(&cluster, &running, &schedule_request)?;

            let now = epoch_secs();
            apply_preemptions(txn, &mut cluster, &plan, now)?;

            let deployment = Deployment {
                id: txn.next_id(DEPLOYMENTS)?,
                name: request.name.trim().to_string(),
                cluster_id,
                docker_image: request.docker_image.trim().to_string(),
                demand: schedule_request.demand,
                priority: request.priority,
                status: DeploymentStatus::Pending,
                created_at: now,
                started_at: None,
                updated_at: now,
            };
            txn.put_deployment(&deployment)?;

            cluster.reserve(&deployment.demand)?;
            txn.put_cluster(&cluster)?;

            Ok::<_, SchedulerError>((deployment, plan))
        });
        let (deployment, plan) = self.settle(guard, cluster_id, outcome).await?;

        let preempted: Vec<DeploymentId> = plan.preempted.iter().map(|d| d.id).collect();
        info!(
            deployment = deployment.id,
            cluster = cluster_id,
            strategy = strategy.name(),
            priority = deployment.priority,
            demand = %deployment.demand,
            ?preempted,
            remaining = %plan.remaining,
            "deployment admitted"
        );
        Ok(deployment)
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Every deployment on the organization's clusters, in id order.
    pub fn list_deployments(&self, organization_id: OrganizationId) -> SchedulerResult<Vec<Deployment>> {
        let clusters = self.state.list_clusters_for_organization(organization_id)?;
        if clusters.is_empty() {
            return Err(SchedulerError::NotFound(NO_CLUSTERS.to_string()));
        }

        let ids: Vec<ClusterId> = clusters.iter().map(|c| c.id).collect();
        let deployments = self.state.list_deployments_for_clusters(&ids)?;
        if deployments.is_empty() {
            return Err(SchedulerError::NotFound(NO_DEPLOYMENTS.to_string()));
        }
        Ok(deployments)
    }

    /// Deployments visible to `user`.
    pub fn list_deployments_for_user(&self, user: &User) -> SchedulerResult<Vec<Deployment>> {
        match user.organization_id {
            Some(org) => self.list_deployments(org),
            None => Err(SchedulerError::NotFound(NO_CLUSTERS.to_string())),
        }
    }

    pub fn get_deployment(&self, id: DeploymentId, user: &User) -> SchedulerResult<Deployment> {
        let deployment = self
            .state
            .get_deployment(id)?
            .ok_or_else(|| deployment_not_found(id))?;
        let cluster = self
            .state
            .get_cluster(deployment.cluster_id)?
            .ok_or_else(|| cluster_not_found(deployment.cluster_id))?;
        authorize(&cluster, user)?;
        Ok(deployment)
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Move a deployment along its lifecycle.
    ///
    /// `Completed` and `Failed` hand the deployment's demand back to the
    /// cluster. `Preempted` is only reachable through admission.
    pub async fn transition_deployment(
        &self,
        id: DeploymentId,
        target: DeploymentStatus,
        user: &User,
    ) -> SchedulerResult<Deployment> {
        if target == DeploymentStatus::Preempted {
            return Err(SchedulerError::InvalidRequest(
                "deployments are only preempted by the scheduler".into(),
            ));
        }

        let cluster_id = self
            .state
            .get_deployment(id)?
            .ok_or_else(|| deployment_not_found(id))?
            .cluster_id;

        let guard = self.locks.acquire(cluster_id, self.config.lock_timeout).await?;

        let outcome = self.state.transact(|txn| {
            let mut deployment = txn
                .get_deployment(id)?
                .ok_or_else(|| deployment_not_found(id))?;
            let mut cluster = txn
                .get_cluster(cluster_id)?
                .ok_or_else(|| cluster_not_found(cluster_id))?;
            authorize(&cluster, user)?;

            let from = deployment.status;
            if !from.can_transition_to(target) {
                return Err(SchedulerError::Conflict(format!(
                    "deployment {id} cannot move from {from:?} to {target:?}"
                )));
            }

            let now = epoch_secs();
            deployment.status = target;
            deployment.updated_at = now;
            if target == DeploymentStatus::Running {
                deployment.started_at = Some(now);
            }
            if !target.holds_resources() {
                cluster.release(&deployment.demand)?;
                txn.put_cluster(&cluster)?;
            }
            txn.put_deployment(&deployment)?;

            Ok::<_, SchedulerError>((deployment, from))
        });
        let (deployment, from) = self.settle(guard, cluster_id, outcome).await?;

        info!(
            deployment = id,
            cluster = cluster_id,
            from = ?from,
            to = ?deployment.status,
            "deployment transitioned"
        );
        Ok(deployment)
    }

    /// Release the cluster lock after a locked call. A cluster deleted
    /// while this call waited leaves no lock entry behind.
    async fn settle<T>(
        &self,
        guard: OwnedMutexGuard<()>,
        cluster_id: ClusterId,
        outcome: SchedulerResult<T>,
    ) -> SchedulerResult<T> {
        drop(guard);
        if matches!(outcome, Err(SchedulerError::NotFound(_))) {
            self.locks.forget_if_gone(&self.state, cluster_id).await;
        }
        outcome
    }
}

// ── Helpers ───────────────────────────────────────────────────────

/// Mark every planned victim `Preempted` and return its demand to the
/// cluster. Victims are re-read so a stale plan can't double-release.
fn apply_preemptions(
    txn: &StateTxn,
    cluster: &mut Cluster,
    plan: &SchedulePlan,
    now: u64,
) -> SchedulerResult<()> {
    for planned in &plan.preempted {
        let mut victim = txn
            .get_deployment(planned.id)?
            .ok_or_else(|| deployment_not_found(planned.id))?;
        if victim.cluster_id != cluster.id
            || !victim.status.can_transition_to(DeploymentStatus::Preempted)
        {
            warn!(
                deployment = victim.id,
                status = ?victim.status,
                "planned victim is no longer preemptible"
            );
            return Err(SchedulerError::Conflict(format!(
                "deployment {} is no longer running",
                victim.id
            )));
        }

        cluster.release(&victim.demand)?;
        victim.status = DeploymentStatus::Preempted;
        victim.updated_at = now;
        txn.put_deployment(&victim)?;
        debug!(deployment = victim.id, cluster = cluster.id, "deployment preempted");
    }
    Ok(())
}

pub(crate) fn authorize(cluster: &Cluster, user: &User) -> SchedulerResult<()> {
    if user.belongs_to(cluster.organization_id) {
        Ok(())
    } else {
        Err(SchedulerError::Forbidden(format!(
            "user {} is not a member of the organization owning cluster {}",
            user.id, cluster.id
        )))
    }
}

pub(crate) fn cluster_not_found(id: ClusterId) -> SchedulerError {
    SchedulerError::NotFound(format!("cluster {id} not found"))
}

fn deployment_not_found(id: DeploymentId) -> SchedulerError {
    SchedulerError::NotFound(format!("deployment {id} not found"))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use capgrid_state::tables::{CLUSTERS, ORGANIZATIONS, USERS};

    pub struct Fixture {
        pub scheduler: DeploymentScheduler,
        pub user: User,
        pub outsider: User,
        pub cluster: ClusterId,
    }

    /// One organization with one member and one (30, 40, 40) cluster,
    /// plus a user in a second organization.
    pub fn fixture() -> Fixture {
        let state = StateStore::open_in_memory().unwrap();
        let (user, outsider, cluster) = state
            .transact(|txn| {
                let org = Organization {
                    id: txn.next_id(ORGANIZATIONS)?,
                    name: "acme".into(),
                    invite_code: "aaaa".into(),
                    created_at: 0,
                };
                txn.put_organization(&org)?;
                let other = Organization {
                    id: txn.next_id(ORGANIZATIONS)?,
                    name: "globex".into(),
                    invite_code: "bbbb".into(),
                    created_at: 0,
                };
                txn.put_organization(&other)?;

                let user = User {
                    id: txn.next_id(USERS)?,
                    username: "alice".into(),
                    email: "alice@acme.test".into(),
                    organization_id: Some(org.id),
                    created_at: 0,
                };
                txn.put_user(&user)?;
                let outsider = User {
                    id: txn.next_id(USERS)?,
                    username: "mallory".into(),
                    email: "mallory@globex.test".into(),
                    organization_id: Some(other.id),
                    created_at: 0,
                };
                txn.put_user(&outsider)?;

                let cluster = Cluster::new(
                    txn.next_id(CLUSTERS)?,
                    "main",
                    org.id,
                    ResourceVector::new(30.0, 40.0, 40.0),
                    0,
                );
                txn.put_cluster(&cluster)?;
                Ok::<_, StateError>((user, outsider, cluster.id))
            })
            .unwrap();

        Fixture {
            scheduler: DeploymentScheduler::with_defaults(state),
            user,
            outsider,
            cluster,
        }
    }

    pub fn request(cpu: f64, ram: f64, gpu: f64, priority: i32) -> DeploymentRequest {
        DeploymentRequest {
            name: "job".into(),
            docker_image: "registry.test/job:1".into(),
            cpu_required: cpu,
            ram_required: ram,
            gpu_required: gpu,
            priority,
        }
    }

    impl Fixture {
        pub fn available(&self) -> ResourceVector {
            self.scheduler
                .state()
                .get_cluster(self.cluster)
                .unwrap()
                .unwrap()
                .available()
        }

        /// Admit and start a deployment.
        pub async fn run(&self, cpu: f64, ram: f64, gpu: f64, priority: i32) -> Deployment {
            let d = self
                .scheduler
                .handle_deployment(&request(cpu, ram, gpu, priority), None, self.cluster, &self.user)
                .await
                .unwrap();
            self.scheduler
                .transition_deployment(d.id, DeploymentStatus::Running, &self.user)
                .await
                .unwrap()
        }

        pub fn status_of(&self, id: DeploymentId) -> DeploymentStatus {
            self.scheduler
                .state()
                .get_deployment(id)
                .unwrap()
                .unwrap()
                .status
        }

        /// available + every active demand, per dimension.
        pub fn conserved_total(&self) -> ResourceVector {
            let active = self
                .scheduler
                .state()
                .list_deployments_for_cluster(self.cluster)
                .unwrap()
                .into_iter()
                .filter(|d| d.status.holds_resources())
                .fold(ResourceVector::ZERO, |acc, d| acc + d.demand);
            self.available() + active
        }
    }
}
