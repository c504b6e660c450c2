//! Tenancy — users, organizations and clusters.
//!
//! Membership is set once: a user joins exactly one organization through
//! its invite code and every cluster/deployment check afterwards is a
//! comparison against that organization id.

use std::time::Duration;

use capgrid_core::{ResourceVector, epoch_secs};
use capgrid_state::tables::{CLUSTERS, ORGANIZATIONS, USERS};
use capgrid_state::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{SchedulerError, SchedulerResult};
use crate::locks::ClusterLocks;
use crate::scheduler::{DeploymentScheduler, authorize, cluster_not_found};

/// Random bytes per invite code; hex doubles it to 16 characters.
const INVITE_CODE_BYTES: usize = 8;
const INVITE_CODE_ATTEMPTS: usize = 4;

/// Capacity ceiling for a new cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRequest {
    pub name: String,
    pub cpu_limit: f64,
    pub ram_limit: f64,
    pub gpu_limit: f64,
}

impl ClusterRequest {
    pub fn limit(&self) -> ResourceVector {
        ResourceVector::new(self.cpu_limit, self.ram_limit, self.gpu_limit)
    }
}

/// Tenancy operations. Shares the scheduler's store and cluster locks.
#[derive(Clone)]
pub struct Tenancy {
    state: StateStore,
    locks: ClusterLocks,
    lock_timeout: Duration,
}

impl DeploymentScheduler {
    pub fn tenancy(&self) -> Tenancy {
        Tenancy {
            state: self.state().clone(),
            locks: self.locks().clone(),
            lock_timeout: self.lock_timeout(),
        }
    }
}

impl Tenancy {
    // ── Users ──────────────────────────────────────────────────────

    pub fn register_user(&self, username: &str, email: &str) -> SchedulerResult<User> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() {
            return Err(SchedulerError::InvalidRequest("username must not be empty".into()));
        }
        if !email.contains('@') {
            return Err(SchedulerError::InvalidRequest(format!(
                "'{email}' is not an email address"
            )));
        }

        let user = self.state.transact(|txn| {
            if txn.find_user_by_username_or_email(username, email)?.is_some() {
                return Err(SchedulerError::Conflict(
                    "username or email already registered".into(),
                ));
            }
            let user = User {
                id: txn.next_id(USERS)?,
                username: username.to_string(),
                email: email.to_string(),
                organization_id: None,
                created_at: epoch_secs(),
            };
            txn.put_user(&user)?;
            Ok::<_, SchedulerError>(user)
        })?;

        info!(user = user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Look up the caller.
    pub fn get_user(&self, id: UserId) -> SchedulerResult<User> {
        self.state
            .get_user(id)?
            .ok_or_else(|| SchedulerError::NotFound(format!("user {id} not found")))
    }

    // ── Organizations ──────────────────────────────────────────────

    pub fn create_organization(&self, name: &str) -> SchedulerResult<Organization> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SchedulerError::InvalidRequest(
                "organization name must not be empty".into(),
            ));
        }

        let org = self.state.transact(|txn| {
            if txn.find_organization_by_name(name)?.is_some() {
                return Err(SchedulerError::Conflict(format!(
                    "organization '{name}' already exists"
                )));
            }
            let invite_code = unused_invite_code(txn)?;
            let org = Organization {
                id: txn.next_id(ORGANIZATIONS)?,
                name: name.to_string(),
                invite_code,
                created_at: epoch_secs(),
            };
            txn.put_organization(&org)?;
            Ok::<_, SchedulerError>(org)
        })?;

        info!(organization = org.id, name = %org.name, "organization created");
        Ok(org)
    }

    /// Put `user` into the organization behind `invite_code`.
    pub fn join_organization(&self, invite_code: &str, user: &User) -> SchedulerResult<Organization> {
        let (org, joined) = self.state.transact(|txn| {
            let org = txn
                .find_organization_by_invite_code(invite_code.trim())?
                .ok_or_else(|| SchedulerError::NotFound("invalid invite code".into()))?;
            let mut joined = txn
                .get_user(user.id)?
                .ok_or_else(|| SchedulerError::NotFound(format!("user {} not found", user.id)))?;
            if joined.organization_id.is_some() {
                return Err(SchedulerError::Conflict(
                    "user already belongs to an organization".into(),
                ));
            }
            joined.organization_id = Some(org.id);
            txn.put_user(&joined)?;
            Ok::<_, SchedulerError>((org, joined))
        })?;

        info!(organization = org.id, user = joined.id, "user joined organization");
        Ok(org)
    }

    // ── Clusters ───────────────────────────────────────────────────

    pub fn create_cluster(&self, request: &ClusterRequest, user: &User) -> SchedulerResult<Cluster> {
        let organization_id = member_of(user)?;
        let name = request.name.trim();
        if name.is_empty() {
            return Err(SchedulerError::InvalidRequest("cluster name must not be empty".into()));
        }
        let limit = request.limit();
        if !limit.is_valid_amount() {
            return Err(SchedulerError::InvalidRequest(format!(
                "cluster limits must be finite and non-negative, got {limit}"
            )));
        }

        let cluster = self.state.transact(|txn| {
            let cluster = Cluster::new(
                txn.next_id(CLUSTERS)?,
                name,
                organization_id,
                limit,
                epoch_secs(),
            );
            txn.put_cluster(&cluster)?;
            Ok::<_, SchedulerError>(cluster)
        })?;

        info!(
            cluster = cluster.id,
            organization = organization_id,
            %limit,
            "cluster created"
        );
        Ok(cluster)
    }

    /// Clusters of the user's organization, in id order.
    pub fn list_clusters(&self, user: &User) -> SchedulerResult<Vec<Cluster>> {
        let organization_id = member_of(user)?;
        Ok(self.state.list_clusters_for_organization(organization_id)?)
    }

    pub fn get_cluster(&self, id: ClusterId, user: &User) -> SchedulerResult<Cluster> {
        let cluster = self
            .state
            .get_cluster(id)?
            .ok_or_else(|| cluster_not_found(id))?;
        authorize(&cluster, user)?;
        Ok(cluster)
    }

    /// Delete a cluster that has nothing pending or running.
    ///
    /// Finished deployment records go with it.
    pub async fn delete_cluster(&self, id: ClusterId, user: &User) -> SchedulerResult<()> {
        if self.state.get_cluster(id)?.is_none() {
            return Err(cluster_not_found(id));
        }

        let guard = self.locks.acquire(id, self.lock_timeout).await?;

        let removed = self.state.transact(|txn| {
            let cluster = txn.get_cluster(id)?.ok_or_else(|| cluster_not_found(id))?;
            authorize(&cluster, user)?;

            let deployments = txn.list_deployments_for_cluster(id)?;
            let active = deployments
                .iter()
                .filter(|d| d.status.holds_resources())
                .count();
            if active > 0 {
                return Err(SchedulerError::Conflict(format!(
                    "cluster {id} still has {active} active deployment(s)"
                )));
            }

            for deployment in &deployments {
                txn.delete_deployment(deployment.id)?;
            }
            txn.delete_cluster(id)?;
            Ok::<_, SchedulerError>(deployments.len())
        });

        drop(guard);
        if matches!(removed, Ok(_) | Err(SchedulerError::NotFound(_))) {
            self.locks.forget_if_gone(&self.state, id).await;
        }
        let removed = removed?;

        info!(cluster = id, removed_deployments = removed, "cluster deleted");
        Ok(())
    }
}

fn member_of(user: &User) -> SchedulerResult<OrganizationId> {
    user.organization_id.ok_or_else(|| {
        SchedulerError::InvalidRequest(format!(
            "user {} does not belong to an organization",
            user.id
        ))
    })
}

fn invite_code() -> SchedulerResult<String> {
    let mut bytes = [0u8; INVITE_CODE_BYTES];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| SchedulerError::Internal(format!("entropy source failed: {e}")))?;
    Ok(hex::encode(bytes))
}

fn unused_invite_code(txn: &StateTxn) -> SchedulerResult<String> {
    for _ in 0..INVITE_CODE_ATTEMPTS {
        let code = invite_code()?;
        if txn.find_organization_by_invite_code(&code)?.is_none() {
            return Ok(code);
        }
    }
    Err(SchedulerError::Internal("could not allocate a unique invite code".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::DeploymentRequest;

    fn tenancy() -> (DeploymentScheduler, Tenancy) {
        let scheduler = DeploymentScheduler::with_defaults(StateStore::open_in_memory().unwrap());
        let tenancy = scheduler.tenancy();
        (scheduler, tenancy)
    }

    fn member(tenancy: &Tenancy, username: &str, org: &Organization) -> User {
        let user = tenancy
            .register_user(username, &format!("{username}@example.test"))
            .unwrap();
        tenancy.join_organization(&org.invite_code, &user).unwrap();
        tenancy.get_user(user.id).unwrap()
    }

    fn cluster_request(cpu: f64, ram: f64, gpu: f64) -> ClusterRequest {
        ClusterRequest {
            name: "main".into(),
            cpu_limit: cpu,
            ram_limit: ram,
            gpu_limit: gpu,
        }
    }

    #[test]
    fn register_rejects_duplicates() {
        let (_, t) = tenancy();
        let alice = t.register_user("alice", "alice@example.test").unwrap();
        assert_eq!(alice.organization_id, None);

        assert!(matches!(
            t.register_user("alice", "other@example.test"),
            Err(SchedulerError::Conflict(_))
        ));
        assert!(matches!(
            t.register_user("bob", "alice@example.test"),
            Err(SchedulerError::Conflict(_))
        ));
        assert!(matches!(
            t.register_user("carol", "not-an-email"),
            Err(SchedulerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn organization_gets_hex_invite_code() {
        let (_, t) = tenancy();
        let org = t.create_organization("acme").unwrap();

        assert_eq!(org.invite_code.len(), 16);
        assert!(org.invite_code.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(matches!(
            t.create_organization("acme"),
            Err(SchedulerError::Conflict(_))
        ));
    }

    #[test]
    fn join_is_set_once() {
        let (_, t) = tenancy();
        let acme = t.create_organization("acme").unwrap();
        let globex = t.create_organization("globex").unwrap();
        let alice = member(&t, "alice", &acme);
        assert!(alice.belongs_to(acme.id));

        assert!(matches!(
            t.join_organization(&globex.invite_code, &alice),
            Err(SchedulerError::Conflict(_))
        ));
        assert!(matches!(
            t.join_organization("0000000000000000", &alice),
            Err(SchedulerError::NotFound(_))
        ));
        assert!(t.get_user(alice.id).unwrap().belongs_to(acme.id));
    }

    #[test]
    fn clusters_need_an_organization() {
        let (_, t) = tenancy();
        let loner = t.register_user("loner", "loner@example.test").unwrap();

        assert!(matches!(
            t.create_cluster(&cluster_request(1.0, 1.0, 1.0), &loner),
            Err(SchedulerError::InvalidRequest(_))
        ));
        assert!(matches!(
            t.list_clusters(&loner),
            Err(SchedulerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn cluster_starts_fully_available() {
        let (_, t) = tenancy();
        let acme = t.create_organization("acme").unwrap();
        let alice = member(&t, "alice", &acme);

        let cluster = t.create_cluster(&cluster_request(30.0, 40.0, 40.0), &alice).unwrap();
        assert_eq!(cluster.limit(), ResourceVector::new(30.0, 40.0, 40.0));
        assert_eq!(cluster.available(), cluster.limit());
        assert_eq!(cluster.organization_id, acme.id);

        let listed = t.list_clusters(&alice).unwrap();
        assert_eq!(listed, vec![cluster]);

        assert!(matches!(
            t.create_cluster(&cluster_request(-1.0, 1.0, 1.0), &alice),
            Err(SchedulerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn clusters_are_private_to_their_organization() {
        let (_, t) = tenancy();
        let acme = t.create_organization("acme").unwrap();
        let globex = t.create_organization("globex").unwrap();
        let alice = member(&t, "alice", &acme);
        let mallory = member(&t, "mallory", &globex);

        let cluster = t.create_cluster(&cluster_request(1.0, 1.0, 1.0), &alice).unwrap();
        assert!(t.list_clusters(&mallory).unwrap().is_empty());
        assert!(matches!(
            t.get_cluster(cluster.id, &mallory),
            Err(SchedulerError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn delete_blocked_while_active() {
        let (scheduler, t) = tenancy();
        let acme = t.create_organization("acme").unwrap();
        let alice = member(&t, "alice", &acme);
        let cluster = t.create_cluster(&cluster_request(4.0, 4.0, 4.0), &alice).unwrap();

        let request = DeploymentRequest {
            name: "job".into(),
            docker_image: "img".into(),
            cpu_required: 1.0,
            ram_required: 1.0,
            gpu_required: 1.0,
            priority: 0,
        };
        let d = scheduler
            .handle_deployment(&request, None, cluster.id, &alice)
            .await
            .unwrap();

        assert!(matches!(
            t.delete_cluster(cluster.id, &alice).await,
            Err(SchedulerError::Conflict(_))
        ));

        scheduler
            .transition_deployment(d.id, DeploymentStatus::Running, &alice)
            .await
            .unwrap();
        scheduler
            .transition_deployment(d.id, DeploymentStatus::Completed, &alice)
            .await
            .unwrap();

        t.delete_cluster(cluster.id, &alice).await.unwrap();
        assert!(scheduler.state().get_cluster(cluster.id).unwrap().is_none());
        assert!(scheduler.state().get_deployment(d.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_checks_organization() {
        let (_, t) = tenancy();
        let acme = t.create_organization("acme").unwrap();
        let globex = t.create_organization("globex").unwrap();
        let alice = member(&t, "alice", &acme);
        let mallory = member(&t, "mallory", &globex);
        let cluster = t.create_cluster(&cluster_request(1.0, 1.0, 1.0), &alice).unwrap();

        assert!(matches!(
            t.delete_cluster(cluster.id, &mallory).await,
            Err(SchedulerError::Forbidden(_))
        ));
        assert!(matches!(
            t.delete_cluster(cluster.id + 100, &alice).await,
            Err(SchedulerError::NotFound(_))
        ));
        assert!(t.get_cluster(cluster.id, &alice).is_ok());
    }
}
