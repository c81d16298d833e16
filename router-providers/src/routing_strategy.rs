//! # Routing Strategy Primitives
//!
//! The strategy enum the Router decision engine dispatches on. This
//! module only defines the *shape* of a strategy; provider selection given
//! a strategy lives in the gateway's `router` module, which has access to
//! health and capability state this crate does not own.

use serde::{Deserialize, Serialize};

/// How the router should pick a provider among eligible candidates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Route to one named provider; error if it is not eligible.
    Specific { provider: String },
    /// Among eligible candidates, pick the one with the lowest estimated
    /// cost for this request.
    CostOptimized,
    /// Among eligible candidates, pick the one with the lowest recorded
    /// average latency.
    Performance,
    /// Cycle through eligible candidates in order, one per call.
    RoundRobin,
}

impl Default for RoutingStrategy {
    fn default() -> Self {
        RoutingStrategy::CostOptimized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_strategy_is_cost_optimized() {
        assert_eq!(RoutingStrategy::default(), RoutingStrategy::CostOptimized);
    }

    #[test]
    fn specific_strategy_round_trips_through_json() {
        let s = RoutingStrategy::Specific {
            provider: "openai".to_string(),
        };
        let json = serde_json::to_string(&s).unwrap();
        let back: RoutingStrategy = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
