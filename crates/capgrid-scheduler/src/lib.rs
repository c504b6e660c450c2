//! capgrid-scheduler — orchestration on top of the state store.
//!
//! Turns a deployment request into a committed schedule: resolve the
//! cluster, authorize the caller, ask a preemption strategy for a plan
//! and apply it to the ledger, all under the cluster's lock and inside
//! one store transaction.
//!
//! # Components
//!
//! - **`scheduler`** — `DeploymentScheduler`: admission, listing and
//!   lifecycle transitions
//! - **`tenancy`** — users, organizations and cluster CRUD
//! - **`locks`** — per-cluster mutual exclusion with a bounded wait

pub mod error;
pub mod locks;
pub mod scheduler;
pub mod tenancy;

pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{DeploymentRequest, DeploymentScheduler, SchedulerConfig};
pub use tenancy::{ClusterRequest, Tenancy};
