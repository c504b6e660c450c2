//! Priority-based preemption: the lowest-priority running deployment
//! that would make room is preempted.

use capgrid_state::{Cluster, Deployment};

use crate::strategy::{
    PreemptionStrategy, SchedulePlan, ScheduleRequest, ScheduleResult, fast_path,
    greedy_single_candidate, preemptible,
};

/// Orders candidates by ascending priority, ties by ascending id.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityPreemption;

impl PriorityPreemption {
    pub const NAME: &'static str = "priority";
}

impl PreemptionStrategy for PriorityPreemption {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn compute_schedule(
        &self,
        cluster: &Cluster,
        running: &[Deployment],
        request: &ScheduleRequest,
    ) -> ScheduleResult<SchedulePlan> {
        if let Some(plan) = fast_path(cluster, request) {
            return Ok(plan);
        }

        let mut candidates = preemptible(cluster, running);
        candidates.sort_by_key(|d| (d.priority, d.id));
        greedy_single_candidate(Self::NAME, cluster, &candidates, request)
    }
}

#[cfg(test)]
mod tests {
    use capgrid_core::ResourceVector;

    use super::*;
    use crate::strategy::ScheduleError;
    use crate::strategy::fixtures::*;

    #[test]
    fn empty_cluster_admits_on_fast_path() {
        let cluster = cluster_with(ResourceVector::new(30.0, 40.0, 40.0));
        let plan = PriorityPreemption
            .compute_schedule(&cluster, &[], &request(8.0, 16.0, 2.0))
            .unwrap();

        assert!(plan.preempted.is_empty());
        assert_eq!(plan.remaining, ResourceVector::new(22.0, 24.0, 38.0));
    }

    #[test]
    fn fast_path_ignores_running_deployments() {
        let cluster = cluster_with(ResourceVector::new(20.0, 30.0, 30.0));
        let running = vec![running(1, -5, ResourceVector::new(10.0, 10.0, 10.0))];

        let plan = PriorityPreemption
            .compute_schedule(&cluster, &running, &request(1.0, 1.0, 1.0))
            .unwrap();
        assert!(plan.preempted.is_empty());
    }

    #[test]
    fn fast_path_is_repeatable() {
        let cluster = cluster_with(ResourceVector::new(10.0, 10.0, 10.0));
        let req = request(4.0, 4.0, 4.0);

        let first = PriorityPreemption.compute_schedule(&cluster, &[], &req).unwrap();
        let second = PriorityPreemption.compute_schedule(&cluster, &[], &req).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn preempts_single_running_deployment_when_needed() {
        let cluster = cluster_with(ResourceVector::new(5.0, 5.0, 5.0));
        let running = vec![running(1, 0, ResourceVector::new(10.0, 10.0, 10.0))];

        let plan = PriorityPreemption
            .compute_schedule(&cluster, &running, &request(8.0, 8.0, 8.0))
            .unwrap();

        assert_eq!(plan.preempted.len(), 1);
        assert_eq!(plan.preempted[0].id, 1);
        assert_eq!(plan.remaining, ResourceVector::new(7.0, 7.0, 7.0));
    }

    #[test]
    fn prefers_lowest_priority_candidate() {
        let cluster = cluster_with(ResourceVector::new(2.0, 2.0, 2.0));
        // Store order deliberately not priority order.
        let running = vec![
            running(2, 2, ResourceVector::new(5.0, 5.0, 5.0)),
            running(1, 1, ResourceVector::new(5.0, 5.0, 5.0)),
        ];

        let plan = PriorityPreemption
            .compute_schedule(&cluster, &running, &request(6.0, 6.0, 6.0))
            .unwrap();

        assert_eq!(plan.preempted.len(), 1);
        assert_eq!(plan.preempted[0].id, 1);
        assert_eq!(plan.remaining, ResourceVector::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn skips_too_small_low_priority_candidate() {
        let cluster = cluster_with(ResourceVector::new(2.0, 2.0, 2.0));
        let running = vec![
            running(1, 0, ResourceVector::new(1.0, 1.0, 1.0)),
            running(2, 3, ResourceVector::new(8.0, 8.0, 8.0)),
            running(3, 9, ResourceVector::new(20.0, 20.0, 20.0)),
        ];

        let plan = PriorityPreemption
            .compute_schedule(&cluster, &running, &request(6.0, 6.0, 6.0))
            .unwrap();

        assert_eq!(plan.preempted[0].id, 2);
    }

    #[test]
    fn equal_priority_ties_break_on_id() {
        let cluster = cluster_with(ResourceVector::ZERO);
        let running = vec![
            running(7, 1, ResourceVector::new(5.0, 5.0, 5.0)),
            running(4, 1, ResourceVector::new(5.0, 5.0, 5.0)),
        ];

        let plan = PriorityPreemption
            .compute_schedule(&cluster, &running, &request(5.0, 5.0, 5.0))
            .unwrap();
        assert_eq!(plan.preempted[0].id, 4);
    }

    #[test]
    fn request_priority_does_not_gate_preemption() {
        let cluster = cluster_with(ResourceVector::ZERO);
        let running = vec![running(1, 100, ResourceVector::new(5.0, 5.0, 5.0))];
        let mut req = request(5.0, 5.0, 5.0);
        req.priority = -100;

        let plan = PriorityPreemption.compute_schedule(&cluster, &running, &req).unwrap();
        assert_eq!(plan.preempted[0].id, 1);
    }

    #[test]
    fn oversized_request_with_nothing_running_is_rejected() {
        let cluster = cluster_with(ResourceVector::new(30.0, 40.0, 40.0));
        let err = PriorityPreemption
            .compute_schedule(&cluster, &[], &request(60.0, 32.0, 4.0))
            .unwrap_err();

        assert_eq!(
            err,
            ScheduleError::InsufficientResources {
                requested: ResourceVector::new(60.0, 32.0, 4.0),
                available: ResourceVector::new(30.0, 40.0, 40.0),
            }
        );
    }

    #[test]
    fn epsilon_absorbs_rounding_on_preemption_path() {
        let cluster = cluster_with(ResourceVector::new(0.1, 0.0, 0.0));
        let running = vec![running(1, 0, ResourceVector::new(0.2, 1.0, 1.0))];

        // A demand a hair above the freed total still fits.
        let plan = PriorityPreemption
            .compute_schedule(&cluster, &running, &request(0.3000000001, 1.0, 1.0))
            .unwrap();
        assert_eq!(plan.preempted.len(), 1);
    }
}
