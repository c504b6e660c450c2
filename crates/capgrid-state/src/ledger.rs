//! Cluster resource ledger.
//!
//! `reserve` and `release` are the only ways to change a cluster's
//! `available` vector. Both compute the next vector for all three
//! dimensions, check `0 <= available <= limit` on each, and only then
//! assign. A failing check leaves the cluster untouched.
//!
//! Differences smaller than [`EPSILON`] past either bound are rounding
//! residue from summing `f64` demands and settle onto the bound; anything
//! larger is a [`LedgerError::ResourceInvariantViolation`].

use capgrid_core::{EPSILON, ResourceDimension, ResourceVector};
use thiserror::Error;

use crate::types::{Cluster, ClusterId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error(
        "resource invariant violated on cluster {cluster_id}: {dimension} available would be {attempted} (limit {limit})"
    )]
    ResourceInvariantViolation {
        cluster_id: ClusterId,
        dimension: ResourceDimension,
        attempted: f64,
        limit: f64,
    },

    #[error("invalid {dimension} amount {amount} for cluster {cluster_id}")]
    InvalidAmount {
        cluster_id: ClusterId,
        dimension: ResourceDimension,
        amount: f64,
    },
}

impl Cluster {
    /// Take `demand` out of the available capacity.
    pub fn reserve(&mut self, demand: &ResourceVector) -> Result<(), LedgerError> {
        self.check_amount(demand)?;
        self.set_available(self.available - *demand)
    }

    /// Return `demand` to the available capacity.
    pub fn release(&mut self, demand: &ResourceVector) -> Result<(), LedgerError> {
        self.check_amount(demand)?;
        self.set_available(self.available + *demand)
    }

    fn check_amount(&self, amount: &ResourceVector) -> Result<(), LedgerError> {
        for dim in ResourceDimension::ALL {
            let value = amount.get(dim);
            if !value.is_finite() || value < 0.0 {
                return Err(LedgerError::InvalidAmount {
                    cluster_id: self.id,
                    dimension: dim,
                    amount: value,
                });
            }
        }
        Ok(())
    }

    fn set_available(&mut self, next: ResourceVector) -> Result<(), LedgerError> {
        let mut settled = next;
        for dim in ResourceDimension::ALL {
            let attempted = next.get(dim);
            let limit = self.limit.get(dim);
            if !attempted.is_finite() || attempted < -EPSILON || attempted > limit + EPSILON {
                return Err(LedgerError::ResourceInvariantViolation {
                    cluster_id: self.id,
                    dimension: dim,
                    attempted,
                    limit,
                });
            }
            settled.set(dim, attempted.clamp(0.0, limit));
        }
        self.available = settled;
        Ok(())
    }
}
