//! Resource-based preemption: the biggest consumer that would make room
//! is preempted, so one eviction frees as much headroom as possible.

use capgrid_state::{Cluster, Deployment};

use crate::strategy::{
    PreemptionStrategy, SchedulePlan, ScheduleRequest, ScheduleResult, fast_path,
    greedy_single_candidate, preemptible,
};

/// Orders candidates by descending share of the cluster limit (summed
/// over CPU, RAM and GPU), ties by ascending priority then id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourcePreemption;

impl ResourcePreemption {
    pub const NAME: &'static str = "resource";
}

impl PreemptionStrategy for ResourcePreemption {
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

        let limit = cluster.limit();
        let mut candidates = preemptible(cluster, running);
        candidates.sort_by(|a, b| {
            b.demand
                .share_of(&limit)
                .total_cmp(&a.demand.share_of(&limit))
                .then(a.priority.cmp(&b.priority))
                .then(a.id.cmp(&b.id))
        });
        greedy_single_candidate(Self::NAME, cluster, &candidates, request)
    }
}
