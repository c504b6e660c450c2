//! capgrid admission and preemption — pure schedule computation.
//!
//! Given a cluster, its running deployments and an incoming request, a
//! [`PreemptionStrategy`] decides whether the request fits as-is (fast
//! path), fits after preempting exactly one running deployment, or does
//! not fit at all. Strategies never touch the store; the orchestrator in
//! `capgrid-scheduler` applies the resulting [`SchedulePlan`].
//!
//! # Components
//!
//! - **`strategy`** — The strategy trait, plan/request types and the shared
//!   fast-path + single-candidate greedy walk
//! - **`priority`** — Lowest priority first (the default)
//! - **`resource`** — Largest consumer first
//! - **`time`** — Oldest running first
//! - **`selector`** — Name → strategy lookup with priority fallback

pub mod priority;
pub mod resource;
pub mod selector;
pub mod strategy;
pub mod time;

pub use priority::PriorityPreemption;
pub use resource::ResourcePreemption;
pub use selector::StrategySelector;
pub use strategy::{
    PreemptionStrategy, ScheduleError, SchedulePlan, ScheduleRequest, ScheduleResult,
};
pub use time::TimePreemption;
