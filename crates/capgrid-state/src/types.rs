//! Domain types for the capgrid state store.
//!
//! These types represent the persisted state of organizations, users,
//! clusters and deployments. All types are serializable to/from JSON for
//! storage in redb tables.

use capgrid_core::ResourceVector;
use serde::{Deserialize, Serialize};

pub type OrganizationId = u64;
pub type UserId = u64;
pub type ClusterId = u64;
pub type DeploymentId = u64;

// ── Organization ─────────────────────────────────────────────────

/// A tenant. Owns zero or more clusters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub id: OrganizationId,
    /// Unique across all organizations.
    pub name: String,
    /// Unique code users present to join.
    pub invite_code: String,
    pub created_at: u64,
}

// ── User ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// Set once, through the join flow.
    pub organization_id: Option<OrganizationId>,
    pub created_at: u64,
}

impl User {
    /// Whether this user may act on resources owned by `organization_id`.
    pub fn belongs_to(&self, organization_id: OrganizationId) -> bool {
        self.organization_id == Some(organization_id)
    }
}

// ── Cluster ──────────────────────────────────────────────────────

/// A scheduling domain with a fixed resource ceiling.
///
/// `limit` is fixed at creation. `available` is only reachable for
/// writes through the ledger operations in [`crate::ledger`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    pub id: ClusterId,
    pub name: String,
    pub organization_id: OrganizationId,
    pub(crate) limit: ResourceVector,
    pub(crate) available: ResourceVector,
    pub created_at: u64,
}

impl Cluster {
    /// A fresh cluster with all of its capacity available.
    pub fn new(
        id: ClusterId,
        name: impl Into<String>,
        organization_id: OrganizationId,
        limit: ResourceVector,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            organization_id,
            limit,
            available: limit,
            created_at,
        }
    }

    pub fn limit(&self) -> ResourceVector {
        self.limit
    }

    pub fn available(&self) -> ResourceVector {
        self.available
    }
}

// ── Deployment ───────────────────────────────────────────────────

/// A workload request admitted onto a cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deployment {
    pub id: DeploymentId,
    pub name: String,
    /// Immutable after creation.
    pub cluster_id: ClusterId,
    /// Opaque image reference.
    pub docker_image: String,
    /// Resources reserved for this deployment while it is active.
    pub demand: ResourceVector,
    /// Lower value = lower priority = preempted first.
    pub priority: i32,
    pub status: DeploymentStatus,
    pub created_at: u64,
    /// Set when the deployment enters `Running`.
    pub started_at: Option<u64>,
    pub updated_at: u64,
}

/// Lifecycle of a deployment.
///
/// ```text
/// Pending ──► Running ──► Completed
///                │   └──► Failed
///                └──────► Preempted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Preempted,
}

impl DeploymentStatus {
    pub fn can_transition_to(self, next: DeploymentStatus) -> bool {
        use DeploymentStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Running, Completed) | (Running, Failed) | (Running, Preempted)
        )
    }

    /// Pending and running deployments hold a reservation in the ledger.
    pub fn holds_resources(self) -> bool {
        matches!(self, DeploymentStatus::Pending | DeploymentStatus::Running)
    }
}
