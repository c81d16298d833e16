//! # Metrics Collector
//!
//! Real atomic counters at the instrumentation points that matter
//! (request count, latency, per-provider success/failure, rate-limit
//! rejections), plus a bounded ring buffer of recent requests for
//! percentile latency and a Prometheus text exporter. Held as one
//! instance in `AppState`, not a process-global singleton.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub timestamp: SystemTime,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub latency_ms: u64,
    pub provider: Option<String>,
    pub model: Option<String>,
}

pub struct RequestRecordBuilder {
    method: String,
    path: String,
    status_code: u16,
    latency: Duration,
    provider: Option<String>,
    model: Option<String>,
}

impl RequestRecordBuilder {
    pub fn new(method: impl Into<String>, path: impl Into<String>, status_code: u16, latency: Duration) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            status_code,
            latency,
            provider: None,
            model: None,
        }
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn build(self) -> RequestRecord {
        RequestRecord {
            timestamp: SystemTime::now(),
            method: self.method,
            path: self.path,
            status_code: self.status_code,
            latency_ms: self.latency.as_millis() as u64,
            provider: self.provider,
            model: self.model,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProviderStats {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AggregatedMetrics {
    pub total_requests: u64,
    pub error_count: u64,
    pub average_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub rate_limit_rejections: u64,
    pub by_provider: HashMap<String, ProviderStats>,
}

pub struct MetricsCollector {
    records: RwLock<VecDeque<RequestRecord>>,
    max_requests: usize,
    retention: Duration,
    total_requests: AtomicU64,
    error_count: AtomicU64,
    rate_limit_rejections: AtomicU64,
}

impl MetricsCollector {
    pub fn new(max_requests: usize, retention: Duration) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(max_requests.min(1024))),
            max_requests,
            retention,
            total_requests: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            rate_limit_rejections: AtomicU64::new(0),
        }
    }

    pub async fn record(&self, record: RequestRecord) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if record.status_code >= 400 {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }

        let mut records = self.records.write().await;
        records.push_back(record);
        while records.len() > self.max_requests {
            records.pop_front();
        }
        let cutoff = SystemTime::now() - self.retention;
        while records.front().is_some_and(|r| r.timestamp < cutoff) {
            records.pop_front();
        }
    }

    pub fn record_rate_limit_rejection(&self) {
        self.rate_limit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn snapshot(&self) -> AggregatedMetrics {
        let records = self.records.read().await;

        let mut latencies: Vec<u64> = records.iter().map(|r| r.latency_ms).collect();
        latencies.sort_unstable();

        let average_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<u64>() as f64 / latencies.len() as f64
        };

        let mut by_provider: HashMap<String, ProviderStats> = HashMap::new();
        for record in records.iter() {
            if let Some(provider) = &record.provider {
                let stats = by_provider.entry(provider.clone()).or_default();
                stats.requests += 1;
                if record.status_code < 400 {
                    stats.successes += 1;
                } else {
                    stats.failures += 1;
                }
            }
        }

        AggregatedMetrics {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            average_latency_ms,
            p95_latency_ms: percentile(&latencies, 0.95),
            p99_latency_ms: percentile(&latencies, 0.99),
            rate_limit_rejections: self.rate_limit_rejections.load(Ordering::Relaxed),
            by_provider,
        }
    }

    pub async fn prometheus_text(&self) -> String {
        let snapshot = self.snapshot().await;
        let mut out = String::new();

        out.push_str("# HELP gateway_requests_total Total requests handled.\n");
        out.push_str("# TYPE gateway_requests_total counter\n");
        out.push_str(&format!("gateway_requests_total {}\n", snapshot.total_requests));

        out.push_str("# HELP gateway_errors_total Requests with a 4xx/5xx status.\n");
        out.push_str("# TYPE gateway_errors_total counter\n");
        out.push_str(&format!("gateway_errors_total {}\n", snapshot.error_count));

        out.push_str("# HELP gateway_rate_limit_rejections_total Requests rejected by the rate limiter.\n");
        out.push_str("# TYPE gateway_rate_limit_rejections_total counter\n");
        out.push_str(&format!(
            "gateway_rate_limit_rejections_total {}\n",
            snapshot.rate_limit_rejections
        ));

        out.push_str("# HELP gateway_request_latency_ms Recent request latency in milliseconds.\n");
        out.push_str("# TYPE gateway_request_latency_ms summary\n");
        out.push_str(&format!(
            "gateway_request_latency_ms{{quantile=\"0.5\"}} {:.2}\n",
            snapshot.average_latency_ms
        ));
        out.push_str(&format!(
            "gateway_request_latency_ms{{quantile=\"0.95\"}} {:.2}\n",
            snapshot.p95_latency_ms
        ));
        out.push_str(&format!(
            "gateway_request_latency_ms{{quantile=\"0.99\"}} {:.2}\n",
            snapshot.p99_latency_ms
        ));

        out.push_str("# HELP gateway_provider_requests_total Requests per provider.\n");
        out.push_str("# TYPE gateway_provider_requests_total counter\n");
        for (provider, stats) in &snapshot.by_provider {
            out.push_str(&format!(
                "gateway_provider_requests_total{{provider=\"{provider}\"}} {}\n",
                stats.requests
            ));
            out.push_str(&format!(
                "gateway_provider_failures_total{{provider=\"{provider}\"}} {}\n",
                stats.failures
            ));
        }

        out
    }
}

fn percentile(sorted: &[u64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)] as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_accumulate_into_a_snapshot() {
        let collector = MetricsCollector::new(100, Duration::from_secs(3600));
        collector
            .record(
                RequestRecordBuilder::new("POST", "/v1/chat/completions", 200, Duration::from_millis(50))
                    .provider("openai")
                    .build(),
            )
            .await;
        collector
            .record(
                RequestRecordBuilder::new("POST", "/v1/chat/completions", 500, Duration::from_millis(200))
                    .provider("openai")
                    .build(),
            )
            .await;

        let snapshot = collector.snapshot().await;
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.by_provider["openai"].requests, 2);
        assert_eq!(snapshot.by_provider["openai"].failures, 1);
    }

    #[tokio::test]
    async fn ring_buffer_evicts_oldest_beyond_capacity() {
        let collector = MetricsCollector::new(2, Duration::from_secs(3600));
        for i in 0..5 {
            collector
                .record(RequestRecordBuilder::new("GET", "/health", 200, Duration::from_millis(i)).build())
                .await;
        }
        let records = collector.records.read().await;
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn prometheus_text_includes_counters() {
        let collector = MetricsCollector::new(100, Duration::from_secs(3600));
        collector
            .record(RequestRecordBuilder::new("GET", "/health", 200, Duration::from_millis(5)).build())
            .await;
        let text = collector.prometheus_text().await;
        assert!(text.contains("gateway_requests_total 1"));
    }
}
