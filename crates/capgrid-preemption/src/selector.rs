//! Strategy selection by name.
//!
//! The selector is built once and then only read. Unknown names resolve
//! to the priority strategy rather than failing, so callers can pass
//! user-supplied strategy names straight through.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::priority::PriorityPreemption;
use crate::resource::ResourcePreemption;
use crate::strategy::PreemptionStrategy;
use crate::time::TimePreemption;

/// Maps strategy names to strategy instances.
#[derive(Clone)]
pub struct StrategySelector {
    strategies: HashMap<&'static str, Arc<dyn PreemptionStrategy>>,
    fallback: Arc<dyn PreemptionStrategy>,
}

impl StrategySelector {
    /// A selector that only knows the priority strategy.
    pub fn new() -> Self {
        let fallback: Arc<dyn PreemptionStrategy> = Arc::new(PriorityPreemption);
        let mut strategies = HashMap::new();
        strategies.insert(fallback.name(), Arc::clone(&fallback));
        Self {
            strategies,
            fallback,
        }
    }

    /// Priority, resource and time strategies.
    pub fn with_builtin() -> Self {
        Self::new()
            .with(Arc::new(ResourcePreemption))
            .with(Arc::new(TimePreemption))
    }

    /// Register a strategy under its own name, replacing any existing one.
    pub fn with(mut self, strategy: Arc<dyn PreemptionStrategy>) -> Self {
        self.strategies.insert(strategy.name(), strategy);
        self
    }

    /// Look up a strategy; unknown names get the priority strategy.
    pub fn select(&self, name: &str) -> Arc<dyn PreemptionStrategy> {
        let key = name.trim().to_ascii_lowercase();
        match self.strategies.get(key.as_str()) {
            Some(strategy) => Arc::clone(strategy),
            None => {
                debug!(requested = name, fallback = self.fallback.name(), "unknown strategy");
                Arc::clone(&self.fallback)
            }
        }
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.strategies.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::with_builtin()
    }
}
