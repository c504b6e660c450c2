//! Scheduler error types.

use capgrid_core::ResourceVector;
use capgrid_preemption::ScheduleError;
use capgrid_state::{LedgerError, StateError};
use thiserror::Error;

/// Errors surfaced by scheduling and tenancy operations.
///
/// None of these are retried internally.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("insufficient resources: requested {requested}, available {available}")]
    InsufficientResources {
        requested: ResourceVector,
        available: ResourceVector,
    },

    /// A ledger write would have left `available` outside `[0, limit]`.
    #[error(transparent)]
    ResourceInvariantViolation(LedgerError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Conflict(String),

    /// Try again later; nothing was applied.
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("state store error: {0}")]
    State(StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl From<StateError> for SchedulerError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::Ledger(err) => SchedulerError::ResourceInvariantViolation(err),
            other => SchedulerError::State(other),
        }
    }
}

impl From<LedgerError> for SchedulerError {
    fn from(e: LedgerError) -> Self {
        SchedulerError::ResourceInvariantViolation(e)
    }
}

impl From<ScheduleError> for SchedulerError {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::InsufficientResources {
                requested,
                available,
            } => SchedulerError::InsufficientResources {
                requested,
                available,
            },
        }
    }
}
