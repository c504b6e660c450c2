//! Resource vectors shared by the store, the preemption strategies and
//! the scheduler.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Tolerance absorbed when comparing summed floating-point amounts.
pub const EPSILON: f64 = 1e-6;

/// One schedulable resource dimension of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceDimension {
    Cpu,
    Ram,
    Gpu,
}

impl ResourceDimension {
    pub const ALL: [ResourceDimension; 3] = [Self::Cpu, Self::Ram, Self::Gpu];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Ram => "ram",
            Self::Gpu => "gpu",
        }
    }
}

impl fmt::Display for ResourceDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An amount of CPU, RAM and GPU. Used both for demands and for
/// capacity (limit / available) bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceVector {
    pub cpu: f64,
    pub ram: f64,
    pub gpu: f64,
}

impl ResourceVector {
    pub const ZERO: ResourceVector = ResourceVector {
        cpu: 0.0,
        ram: 0.0,
        gpu: 0.0,
    };

    pub fn new(cpu: f64, ram: f64, gpu: f64) -> Self {
        Self { cpu, ram, gpu }
    }

    /// Amount along a single dimension.
    pub fn get(&self, dim: ResourceDimension) -> f64 {
        match dim {
            ResourceDimension::Cpu => self.cpu,
            ResourceDimension::Ram => self.ram,
            ResourceDimension::Gpu => self.gpu,
        }
    }

    pub fn set(&mut self, dim: ResourceDimension, value: f64) {
        match dim {
            ResourceDimension::Cpu => self.cpu = value,
            ResourceDimension::Ram => self.ram = value,
            ResourceDimension::Gpu => self.gpu = value,
        }
    }

    /// True when every dimension is at least the demanded amount, less
    /// a shortfall of up to `epsilon`.
    pub fn covers_within(&self, demand: &ResourceVector, epsilon: f64) -> bool {
        ResourceDimension::ALL
            .iter()
            .all(|&d| self.get(d) + epsilon >= demand.get(d))
    }

    /// `self - demand`, with anything below zero settled to zero.
    pub fn saturating_sub(&self, demand: &ResourceVector) -> ResourceVector {
        let mut out = *self - *demand;
        for dim in ResourceDimension::ALL {
            out.set(dim, out.get(dim).max(0.0));
        }
        out
    }

    /// True when all amounts are finite and non-negative.
    pub fn is_valid_amount(&self) -> bool {
        ResourceDimension::ALL.iter().all(|&d| {
            let v = self.get(d);
            v.is_finite() && v >= 0.0
        })
    }

    /// Sum of this vector's per-dimension share of `limit`.
    ///
    /// Dimensions with a zero limit contribute nothing.
    pub fn share_of(&self, limit: &ResourceVector) -> f64 {
        ResourceDimension::ALL
            .iter()
            .filter(|&&d| limit.get(d) > 0.0)
            .map(|&d| self.get(d) / limit.get(d))
            .sum()
    }
}

impl Add for ResourceVector {
    type Output = ResourceVector;

    fn add(self, rhs: ResourceVector) -> ResourceVector {
        ResourceVector {
            cpu: self.cpu + rhs.cpu,
            ram: self.ram + rhs.ram,
            gpu: self.gpu + rhs.gpu,
        }
    }
}

impl Sub for ResourceVector {
    type Output = ResourceVector;

    fn sub(self, rhs: ResourceVector) -> ResourceVector {
        ResourceVector {
            cpu: self.cpu - rhs.cpu,
            ram: self.ram - rhs.ram,
            gpu: self.gpu - rhs.gpu,
        }
    }
}

impl fmt::Display for ResourceVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu={} ram={} gpu={}", self.cpu, self.ram, self.gpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_requires_every_dimension() {
        let avail = ResourceVector::new(10.0, 10.0, 1.0);
        assert!(avail.covers_within(&ResourceVector::new(10.0, 5.0, 1.0), EPSILON));
        assert!(!avail.covers_within(&ResourceVector::new(10.0, 5.0, 2.0), EPSILON));
    }

    #[test]
    fn covers_within_absorbs_rounding() {
        let avail = ResourceVector::new(0.1 + 0.2, 1.0, 1.0);
        let demand = ResourceVector::new(0.3000001, 1.0, 1.0);
        assert!(!avail.covers_within(&demand, 0.0));
        assert!(avail.covers_within(&demand, EPSILON));
        assert!(!avail.covers_within(&ResourceVector::new(0.31, 1.0, 1.0), EPSILON));
    }

    #[test]
    fn arithmetic_is_per_dimension() {
        let a = ResourceVector::new(5.0, 6.0, 7.0);
        let b = ResourceVector::new(1.0, 2.0, 3.0);
        assert_eq!(a + b, ResourceVector::new(6.0, 8.0, 10.0));
        assert_eq!(a - b, ResourceVector::new(4.0, 4.0, 4.0));
    }

    #[test]
    fn saturating_sub_settles_residue_at_zero() {
        let avail = ResourceVector::new(0.7 - 0.4, 5.0, 1.0);
        let left = avail.saturating_sub(&ResourceVector::new(0.3, 2.0, 1.0));
        assert_eq!(left, ResourceVector::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn rejects_negative_and_non_finite_amounts() {
        assert!(ResourceVector::new(0.0, 1.5, 2.0).is_valid_amount());
        assert!(!ResourceVector::new(-1.0, 1.0, 1.0).is_valid_amount());
        assert!(!ResourceVector::new(f64::NAN, 1.0, 1.0).is_valid_amount());
        assert!(!ResourceVector::new(1.0, f64::INFINITY, 1.0).is_valid_amount());
    }

    #[test]
    fn share_skips_zero_limits() {
        let limit = ResourceVector::new(10.0, 20.0, 0.0);
        let demand = ResourceVector::new(5.0, 5.0, 3.0);
        assert!((demand.share_of(&limit) - 0.75).abs() < EPSILON);
    }

    #[test]
    fn dimension_serializes_snake_case() {
        let json = serde_json::to_string(&ResourceDimension::Gpu).unwrap();
        assert_eq!(json, "\"gpu\"");
    }
}
