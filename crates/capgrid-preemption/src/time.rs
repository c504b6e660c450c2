//! Time-based preemption: the longest-running deployment that would make
//! room is preempted.

use capgrid_state::{Cluster, Deployment};

use crate::strategy::{
    PreemptionStrategy, SchedulePlan, ScheduleRequest, ScheduleResult, fast_path,
    greedy_single_candidate, preemptible,
};

/// Orders candidates by ascending `started_at`, ties by id. Deployments
/// without a recorded start time sort last.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimePreemption;

impl TimePreemption {
    pub const NAME: &'static str = "time";
}

impl PreemptionStrategy for TimePreemption {
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
        candidates.sort_by_key(|d| (d.started_at.unwrap_or(u64::MAX), d.id));
        greedy_single_candidate(Self::NAME, cluster, &candidates, request)
    }
}

#[cfg(test)]
mod tests {
    use capgrid_core::ResourceVector;

    use super::*;
    use crate::strategy::fixtures::*;

    #[test]
    fn preempts_oldest_running_first() {
        let cluster = cluster_with(ResourceVector::ZERO);
        let mut newer = running(1, 0, ResourceVector::new(5.0, 5.0, 5.0));
        newer.started_at = Some(5000);
        let mut older = running(2, 10, ResourceVector::new(5.0, 5.0, 5.0));
        older.started_at = Some(2000);

        let plan = TimePreemption
            .compute_schedule(&cluster, &[newer, older], &request(5.0, 5.0, 5.0))
            .unwrap();
        assert_eq!(plan.preempted[0].id, 2);
    }

    #[test]
    fn unknown_start_time_sorts_last() {
        let cluster = cluster_with(ResourceVector::ZERO);
        let mut unknown = running(1, 0, ResourceVector::new(5.0, 5.0, 5.0));
        unknown.started_at = None;
        let mut known = running(2, 0, ResourceVector::new(5.0, 5.0, 5.0));
        known.started_at = Some(9000);

        let plan = TimePreemption
            .compute_schedule(&cluster, &[unknown, known], &request(5.0, 5.0, 5.0))
            .unwrap();
        assert_eq!(plan.preempted[0].id, 2);
    }
}
