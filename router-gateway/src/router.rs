//! # Router — Strategy + Decision
//!
//! Picks a provider for a request given its strategy, capability
//! requirements, and the current health snapshot. Does not perform the
//! call itself — that is the execution engine's job (`engine.rs`), which
//! consumes the [`Decision`] this module produces.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use router_providers::{ChatRequest, Provider, RoutingStrategy};

use crate::gateway_error::GatewayError;
use crate::health::HealthMonitor;

#[derive(Debug, Clone)]
pub struct Decision {
    pub selected_provider: String,
    pub reasoning: Vec<String>,
    pub estimated_cost: f64,
    pub estimated_latency_ms: u64,
    pub fallback_chain: Vec<String>,
}

pub struct Router {
    providers: HashMap<String, Arc<dyn Provider>>,
    health: Arc<HealthMonitor>,
    strategy: RoutingStrategy,
    round_robin_index: AtomicU64,
}

fn static_latency_heuristic(name: &str) -> u64 {
    match name {
        "openai" => 800,
        "anthropic" => 1200,
        _ => 1000,
    }
}

fn model_affinity(model: &str) -> Option<&'static str> {
    if model.starts_with("gpt-") {
        Some("openai")
    } else if model.starts_with("claude-") {
        Some("anthropic")
    } else {
        None
    }
}

impl Router {
    pub fn new(
        providers: HashMap<String, Arc<dyn Provider>>,
        health: Arc<HealthMonitor>,
        strategy: RoutingStrategy,
    ) -> Self {
        Self {
            providers,
            health,
            strategy,
            round_robin_index: AtomicU64::new(0),
        }
    }

    pub fn providers(&self) -> &HashMap<String, Arc<dyn Provider>> {
        &self.providers
    }

    /// Periodic health-probe trigger; cheap to call on every route, a
    /// no-op most of the time.
    pub fn maybe_trigger_health_cycle(self: &Arc<Self>) {
        let providers: Vec<_> = self.providers.values().cloned().collect();
        self.health.maybe_trigger_cycle(providers);
    }

    fn eligible_candidates(&self, request: &ChatRequest) -> Vec<String> {
        let required = required_features(request);
        let mut names: Vec<String> = self
            .providers
            .iter()
            .filter(|(name, provider)| {
                self.health.is_eligible(name) && provider.capabilities().satisfies(&required)
            })
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Produces a routing [`Decision`] for `request`. Does not mutate
    /// health or provider state; pure given the current snapshot.
    pub fn route(&self, request: &ChatRequest) -> Result<Decision, GatewayError> {
        let strategy = self.effective_strategy(request);

        match strategy {
            RoutingStrategy::Specific { provider } => self.route_specific(&provider, request),
            RoutingStrategy::CostOptimized => self.route_cost_optimized(request),
            RoutingStrategy::Performance => self.route_performance(request),
            RoutingStrategy::RoundRobin => self.route_round_robin(request),
        }
    }

    fn effective_strategy(&self, request: &ChatRequest) -> RoutingStrategy {
        if let Some(name) = model_affinity(&request.model) {
            if self.providers.contains_key(name) {
                return RoutingStrategy::Specific {
                    provider: name.to_string(),
                };
            }
        }

        match request.optimize_for {
            Some(router_providers::OptimizeFor::Performance) => RoutingStrategy::Performance,
            Some(router_providers::OptimizeFor::RoundRobin) => RoutingStrategy::RoundRobin,
            Some(router_providers::OptimizeFor::Cost)
            | Some(router_providers::OptimizeFor::Quality)
            | None => RoutingStrategy::CostOptimized,
        }
    }

    fn route_specific(&self, name: &str, request: &ChatRequest) -> Result<Decision, GatewayError> {
        let provider = self.providers.get(name).ok_or_else(|| GatewayError::NoCapableProvider {
            message: format!("provider '{name}' is not registered"),
        })?;
        if !self.health.is_eligible(name) {
            return Err(GatewayError::NoCapableProvider {
                message: format!("provider '{name}' is not healthy"),
            });
        }

        let estimated_cost = estimate_cost(provider.as_ref(), request);
        let fallback_chain = self
            .eligible_candidates(request)
            .into_iter()
            .filter(|n| n != name)
            .collect();

        Ok(Decision {
            selected_provider: name.to_string(),
            reasoning: vec![format!("Routed to '{name}' by model-prefix affinity")],
            estimated_cost,
            estimated_latency_ms: static_latency_heuristic(name),
            fallback_chain,
        })
    }

    fn route_cost_optimized(&self, request: &ChatRequest) -> Result<Decision, GatewayError> {
        let candidates = self.eligible_candidates(request);
        if candidates.is_empty() {
            return Err(no_capable_provider());
        }

        let mut costed: Vec<(String, f64)> = candidates
            .iter()
            .map(|name| {
                let provider = &self.providers[name];
                (name.clone(), estimate_cost(provider.as_ref(), request))
            })
            .collect();
        costed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));

        let (selected, selected_cost) = costed[0].clone();
        let mut reasoning = vec![format!("Selected '{selected}' for lowest estimated cost")];
        if let Some((runner_up, runner_up_cost)) = costed.get(1) {
            if *runner_up_cost > selected_cost {
                reasoning.push(format!(
                    "Saves ${:.4} vs {runner_up}",
                    runner_up_cost - selected_cost
                ));
            }
        }

        Ok(Decision {
            selected_provider: selected.clone(),
            reasoning,
            estimated_cost: selected_cost,
            estimated_latency_ms: static_latency_heuristic(&selected),
            fallback_chain: candidates.into_iter().filter(|n| n != &selected).collect(),
        })
    }

    fn route_performance(&self, request: &ChatRequest) -> Result<Decision, GatewayError> {
        let candidates = self.eligible_candidates(request);
        if candidates.is_empty() {
            return Err(no_capable_provider());
        }

        let selected = candidates
            .iter()
            .min_by_key(|name| static_latency_heuristic(name))
            .cloned()
            .unwrap();

        let provider = &self.providers[&selected];
        Ok(Decision {
            selected_provider: selected.clone(),
            reasoning: vec![format!("Selected '{selected}' for lowest estimated latency")],
            estimated_cost: estimate_cost(provider.as_ref(), request),
            estimated_latency_ms: static_latency_heuristic(&selected),
            fallback_chain: candidates.into_iter().filter(|n| *n != selected).collect(),
        })
    }

    fn route_round_robin(&self, request: &ChatRequest) -> Result<Decision, GatewayError> {
        let candidates = self.eligible_candidates(request);
        if candidates.is_empty() {
            return Err(no_capable_provider());
        }

        let index = self.round_robin_index.fetch_add(1, Ordering::SeqCst) as usize;
        let selected = candidates[index % candidates.len()].clone();
        let provider = &self.providers[&selected];

        Ok(Decision {
            selected_provider: selected.clone(),
            reasoning: vec![format!("Selected '{selected}' by round robin")],
            estimated_cost: estimate_cost(provider.as_ref(), request),
            estimated_latency_ms: static_latency_heuristic(&selected),
            fallback_chain: candidates.into_iter().filter(|n| *n != selected).collect(),
        })
    }
}

/// Feature set a request demands of its provider, derived from explicit
/// `required_features` plus whatever the request shape itself implies
/// (tool calls, vision content, streaming, structured output). Shared
/// with the execution engine's fallback-candidate filter.
pub(crate) fn required_features(request: &ChatRequest) -> Vec<String> {
    let mut features = request.required_features.clone().unwrap_or_default();
    if request.requests_tools() {
        features.push("tools".to_string());
    }
    if request.requests_vision() {
        features.push("vision".to_string());
    }
    if request.wants_streaming() {
        features.push("streaming".to_string());
    }
    if request.response_format.is_some() {
        features.push("structured_output".to_string());
    }
    features
}

fn no_capable_provider() -> GatewayError {
    GatewayError::NoCapableProvider {
        message: "no eligible provider satisfies the request's capability requirements".to_string(),
    }
}

/// Token counts are approximations: completion tokens default to
/// `max_tokens` when set, else 100; prompt tokens use a character-to-token
/// ratio of 4, close enough across adapters for routing purposes (each
/// adapter refines this in its own `estimate_cost`).
fn estimate_cost(provider: &dyn Provider, request: &ChatRequest) -> f64 {
    let prompt_chars: usize = request.messages.iter().map(|m| m.content.as_text().len()).sum();
    let prompt_tokens = (prompt_chars / 4).max(1) as u32;
    let completion_tokens = request.max_tokens.unwrap_or(100);
    provider.estimate_cost(&request.model, prompt_tokens, completion_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use router_providers::{
        CostEstimate, ModelInfo, ProviderCapabilities, ProviderError, RequestContext, StreamResult,
    };

    struct FakeProvider {
        name: &'static str,
        cost_per_million: f64,
        caps: ProviderCapabilities,
    }

    impl FakeProvider {
        fn new(name: &'static str, cost_per_million: f64) -> Self {
            Self {
                name,
                cost_per_million,
                caps: ProviderCapabilities {
                    streaming: true,
                    function_calling: true,
                    parallel_functions: false,
                    vision: false,
                    structured_output: false,
                    assistants: false,
                    batch: false,
                    max_context_tokens: 128_000,
                    supported_image_formats: vec![],
                    models: vec![ModelInfo {
                        name: "default".to_string(),
                        cost: CostEstimate {
                            prompt_cost_per_million: cost_per_million,
                            completion_cost_per_million: cost_per_million,
                            currency: "USD",
                        },
                    }],
                },
            }
        }
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }
        fn capabilities(&self) -> &ProviderCapabilities {
            &self.caps
        }
        async fn chat(
            &self,
            _request: &router_providers::ChatRequest,
            _ctx: &RequestContext,
        ) -> Result<router_providers::ChatResponse, ProviderError> {
            unimplemented!()
        }
        async fn stream(
            &self,
            _request: &router_providers::ChatRequest,
            _ctx: &RequestContext,
        ) -> Result<StreamResult, ProviderError> {
            unimplemented!()
        }
        fn estimate_cost(&self, _model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
            self.caps.models[0].cost.estimate(prompt_tokens, completion_tokens)
        }
        async fn probe(&self) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn router_with(providers: Vec<(&'static str, f64)>) -> Arc<Router> {
        let mut map: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        for (name, cost) in providers {
            map.insert(name.to_string(), Arc::new(FakeProvider::new(name, cost)));
        }
        Arc::new(Router::new(
            map,
            Arc::new(HealthMonitor::new(std::time::Duration::from_secs(30))),
            RoutingStrategy::CostOptimized,
        ))
    }

    #[test]
    fn cost_optimized_picks_the_cheaper_provider() {
        let router = router_with(vec![("openai", 20.0), ("anthropic", 5.0)]);
        let request = ChatRequest {
            model: "some-model".to_string(),
            messages: vec![router_providers::Message::user("hello")],
            ..Default::default()
        };
        let decision = router.route(&request).unwrap();
        assert_eq!(decision.selected_provider, "anthropic");
        assert!(decision.reasoning.iter().any(|r| r.starts_with("Saves $")));
    }

    #[test]
    fn model_prefix_affinity_overrides_strategy() {
        let router = router_with(vec![("openai", 20.0), ("anthropic", 5.0)]);
        let request = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![router_providers::Message::user("hello")],
            ..Default::default()
        };
        let decision = router.route(&request).unwrap();
        assert_eq!(decision.selected_provider, "openai");
    }

    #[test]
    fn no_eligible_candidates_fails_with_no_capable_provider() {
        let router = router_with(vec![]);
        let request = ChatRequest::default();
        assert!(router.route(&request).is_err());
    }

    #[test]
    fn round_robin_cycles_through_candidates() {
        let router = router_with(vec![("openai", 20.0), ("anthropic", 5.0)]);
        let mut request = ChatRequest {
            model: "some-model".to_string(),
            messages: vec![router_providers::Message::user("hi")],
            ..Default::default()
        };
        request.optimize_for = Some(router_providers::OptimizeFor::RoundRobin);

        let first = router.route(&request).unwrap().selected_provider;
        let second = router.route(&request).unwrap().selected_provider;
        assert_ne!(first, second);
    }

    #[test]
    fn unhealthy_provider_is_excluded_from_candidates() {
        let router = router_with(vec![("openai", 20.0), ("anthropic", 5.0)]);
        router.health.record("anthropic", false, 10.0);
        let request = ChatRequest {
            model: "some-model".to_string(),
            messages: vec![router_providers::Message::user("hi")],
            ..Default::default()
        };
        let decision = router.route(&request).unwrap();
        assert_eq!(decision.selected_provider, "openai");
    }
}
