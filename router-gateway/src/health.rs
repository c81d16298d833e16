//! # Health Monitor
//!
//! Tracks each provider's liveness in three states — `healthy`, `unhealthy`,
//! `unknown` — used by the router's eligibility filter (`healthy` and
//! `unknown` route, `unhealthy` does not). A probe cycle is not a
//! background interval task: it is triggered from [`maybe_trigger_cycle`],
//! called once per routing decision, which checks how long it has been
//! since the last cycle started and, if the interval has elapsed, resets
//! the clock *before* spawning the cycle so a burst of concurrent requests
//! cannot launch the cycle twice. Each probe runs on its own
//! request-detached context, unrelated to whatever request triggered it.

use dashmap::DashMap;
use router_providers::{HealthState, Provider};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct ProviderHealth {
    state: HealthState,
    consecutive_failures: u32,
    last_checked: Option<Instant>,
    average_latency_ms: f64,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            state: HealthState::Unknown,
            consecutive_failures: 0,
            last_checked: None,
            average_latency_ms: 0.0,
        }
    }
}

pub struct HealthMonitor {
    states: DashMap<String, ProviderHealth>,
    check_interval: Duration,
    cycle_epoch: Instant,
    last_cycle_started_ms: AtomicU64,
}

impl HealthMonitor {
    pub fn new(check_interval: Duration) -> Self {
        Self {
            states: DashMap::new(),
            check_interval,
            cycle_epoch: Instant::now(),
            last_cycle_started_ms: AtomicU64::new(0),
        }
    }

    pub fn state_of(&self, name: &str) -> HealthState {
        self.states
            .get(name)
            .map(|e| e.state)
            .unwrap_or(HealthState::Unknown)
    }

    pub fn is_eligible(&self, name: &str) -> bool {
        matches!(self.state_of(name), HealthState::Healthy | HealthState::Unknown)
    }

    pub fn snapshot(&self) -> Vec<(String, HealthState)> {
        self.states
            .iter()
            .map(|e| (e.key().clone(), e.value().state))
            .collect()
    }

    /// If the check interval has elapsed since the last cycle started,
    /// reset the clock and spawn a detached probe cycle over `providers`.
    /// Safe to call on every routing decision; a no-op most of the time.
    pub fn maybe_trigger_cycle(self: &Arc<Self>, providers: Vec<Arc<dyn Provider>>) {
        let now_ms = self.cycle_epoch.elapsed().as_millis() as u64;
        let last = self.last_cycle_started_ms.load(Ordering::SeqCst);
        if now_ms.saturating_sub(last) < self.check_interval.as_millis() as u64 {
            return;
        }
        // Reset before spawning: a second caller racing in right behind us
        // must see the updated timestamp and bail out above.
        if self
            .last_cycle_started_ms
            .compare_exchange(last, now_ms, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_cycle(providers).await;
        });
    }

    async fn run_cycle(&self, providers: Vec<Arc<dyn Provider>>) {
        for provider in providers {
            let started = Instant::now();
            let result = provider.probe().await;
            let latency_ms = started.elapsed().as_millis() as f64;
            self.record(provider.name(), result.is_ok(), latency_ms);
        }
    }

    pub(crate) fn record(&self, name: &str, healthy: bool, latency_ms: f64) {
        let mut entry = self.states.entry(name.to_string()).or_default();
        entry.last_checked = Some(Instant::now());
        // Exponential moving average smoothing for latency.
        entry.average_latency_ms = if entry.average_latency_ms == 0.0 {
            latency_ms
        } else {
            0.8 * entry.average_latency_ms + 0.2 * latency_ms
        };

        if healthy {
            entry.consecutive_failures = 0;
            entry.state = HealthState::Healthy;
        } else {
            entry.consecutive_failures += 1;
            entry.state = HealthState::Unhealthy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_until_first_probe_and_eligible() {
        let monitor = HealthMonitor::new(Duration::from_secs(30));
        assert_eq!(monitor.state_of("openai"), HealthState::Unknown);
        assert!(monitor.is_eligible("openai"));
    }

    #[test]
    fn failed_probe_marks_unhealthy_and_ineligible() {
        let monitor = HealthMonitor::new(Duration::from_secs(30));
        monitor.record("openai", false, 10.0);
        assert_eq!(monitor.state_of("openai"), HealthState::Unhealthy);
        assert!(!monitor.is_eligible("openai"));
    }

    #[test]
    fn successful_probe_after_failure_recovers_eligibility() {
        let monitor = HealthMonitor::new(Duration::from_secs(30));
        monitor.record("openai", false, 10.0);
        monitor.record("openai", true, 10.0);
        assert_eq!(monitor.state_of("openai"), HealthState::Healthy);
        assert!(monitor.is_eligible("openai"));
    }

    #[tokio::test]
    async fn trigger_is_a_no_op_before_the_interval_elapses() {
        let monitor = Arc::new(HealthMonitor::new(Duration::from_secs(3600)));
        monitor.maybe_trigger_cycle(Vec::new());
        // Second call within the interval must not reset the clock again;
        // there is nothing directly observable here beyond "it doesn't panic"
        // since triggering a second cycle with no providers is harmless,
        // but the CAS guard is what prevents a concurrent double-spawn.
        monitor.maybe_trigger_cycle(Vec::new());
    }
}
