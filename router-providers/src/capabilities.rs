//! # Provider Capabilities
//!
//! Static description of what a provider adapter can do, used by the
//! gateway's router to filter candidates against a request's
//! `required_features` without making a network call.

use serde::{Deserialize, Serialize};

/// What a provider adapter supports, independent of any single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub streaming: bool,
    pub function_calling: bool,
    /// Whether the provider can execute more than one tool call per turn.
    /// Only meaningful when `function_calling` is also true; gates whether
    /// adapters forward parallel-tool-call requests at all.
    pub parallel_functions: bool,
    pub vision: bool,
    pub structured_output: bool,
    pub assistants: bool,
    pub batch: bool,
    pub max_context_tokens: u32,
    /// Image MIME types accepted in `image_url` parts, e.g. `"image/png"`.
    pub supported_image_formats: Vec<String>,
    pub models: Vec<ModelInfo>,
}

impl ProviderCapabilities {
    /// Whether every name in `required` is one this provider advertises.
    pub fn satisfies(&self, required: &[String]) -> bool {
        required.iter().all(|feature| match feature.as_str() {
            "streaming" => self.streaming,
            "function_calling" | "tools" => self.function_calling,
            "parallel_functions" => self.parallel_functions,
            "vision" => self.vision,
            "structured_output" => self.structured_output,
            "assistants" => self.assistants,
            "batch" => self.batch,
            _ => false,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub cost: CostEstimate,
}

/// Per-million-token pricing used by the router's cost-optimized strategy
/// and the fallback chain's cost gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostEstimate {
    pub prompt_cost_per_million: f64,
    pub completion_cost_per_million: f64,
    #[serde(default = "CostEstimate::default_currency", skip_deserializing)]
    pub currency: &'static str,
}

impl CostEstimate {
    fn default_currency() -> &'static str {
        "USD"
    }

    pub fn estimate(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (prompt_tokens as f64 / 1_000_000.0) * self.prompt_cost_per_million
            + (completion_tokens as f64 / 1_000_000.0) * self.completion_cost_per_million
    }
}

/// Health state a provider can be reported in by the Health Monitor.
/// `Unknown` is treated as eligible alongside `Healthy`; `Unhealthy`
/// providers are excluded from routing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthState {
    pub fn is_eligible(&self) -> bool {
        matches!(self, HealthState::Healthy | HealthState::Unknown | HealthState::Degraded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            function_calling: false,
            parallel_functions: false,
            vision: true,
            structured_output: false,
            assistants: false,
            batch: false,
            max_context_tokens: 128_000,
            supported_image_formats: vec!["image/png".to_string(), "image/jpeg".to_string()],
            models: vec![],
        }
    }

    #[test]
    fn satisfies_checks_every_required_feature() {
        let c = caps();
        assert!(c.satisfies(&["streaming".to_string(), "vision".to_string()]));
        assert!(!c.satisfies(&["function_calling".to_string()]));
        assert!(!c.satisfies(&["parallel_functions".to_string()]));
    }

    #[test]
    fn unknown_health_is_eligible_but_unhealthy_is_not() {
        assert!(HealthState::Unknown.is_eligible());
        assert!(HealthState::Healthy.is_eligible());
        assert!(!HealthState::Unhealthy.is_eligible());
    }
}
