//! # Audit Logger
//!
//! A bounded multi-producer single-consumer channel feeding one background
//! drainer. Producers never block: a full channel drops the newest event
//! and logs a warning once per overflow burst rather than per drop. The
//! drainer flushes on batch-full (`batch_size`) or `flush_interval`,
//! whichever comes first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

const SENSITIVE_MARKERS: &[&str] = &[
    "password",
    "token",
    "secret",
    "key",
    "auth",
    "credential",
    "authorization",
    "api-key",
    "bearer",
];
const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditEventType {
    AuthenticationSuccess,
    AuthenticationFailure,
    AuthorizationFailure,
    RateLimitExceeded,
    ValidationFailure,
    SuspiciousActivity,
    SecurityViolation,
    ApiKeyUsage,
}

impl AuditEventType {
    fn severity(self) -> Severity {
        use AuditEventType::*;
        match self {
            SecurityViolation => Severity::Critical,
            AuthenticationFailure | AuthorizationFailure | SuspiciousActivity => Severity::High,
            RateLimitExceeded | ValidationFailure => Severity::Medium,
            AuthenticationSuccess | ApiKeyUsage => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub id: String,
    pub event_type: AuditEventType,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub user_id: Option<String>,
    pub client_ip: Option<String>,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub details: HashMap<String, Value>,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        request_id: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        status: u16,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            severity: event_type.severity(),
            timestamp: Utc::now(),
            request_id: request_id.into(),
            user_id: None,
            client_ip: None,
            method: method.into(),
            path: path.into(),
            status,
            details: HashMap::new(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    /// Redacts against the hardcoded marker set only; call
    /// [`AuditLogger::record`] to additionally apply the config-supplied
    /// `sensitive_fields` list before the event is written.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        redact(&mut self.details, &[]);
        self
    }
}

/// Replaces any details entry whose key contains a sensitive marker,
/// case-insensitively, with a fixed redaction token. `extra_markers` is
/// the config-supplied `sensitive_fields` list, merged with the hardcoded
/// set.
fn redact(details: &mut HashMap<String, Value>, extra_markers: &[String]) {
    for (key, value) in details.iter_mut() {
        let lowered = key.to_lowercase();
        let matches_hardcoded = SENSITIVE_MARKERS.iter().any(|marker| lowered.contains(marker));
        let matches_extra = extra_markers
            .iter()
            .any(|marker| lowered.contains(&marker.to_lowercase()));
        if matches_hardcoded || matches_extra {
            *value = Value::String(REDACTED.to_string());
        }
    }
}

pub struct AuditLogger {
    sender: mpsc::Sender<AuditEvent>,
    dropped_warning_emitted: Arc<AtomicBool>,
    sensitive_fields: Vec<String>,
}

impl AuditLogger {
    /// Spawns the background drainer and returns a handle plus its join
    /// future, so callers can await a clean shutdown. `sensitive_fields` is
    /// the config-supplied redaction list, merged with `SENSITIVE_MARKERS`
    /// on every recorded event.
    pub fn start(
        buffer_size: usize,
        batch_size: usize,
        flush_interval: std::time::Duration,
        sensitive_fields: Vec<String>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let handle = tokio::spawn(drain(receiver, batch_size, flush_interval));
        (
            Self {
                sender,
                dropped_warning_emitted: Arc::new(AtomicBool::new(false)),
                sensitive_fields,
            },
            handle,
        )
    }

    /// Never blocks. On a full channel the event is dropped and a warning
    /// is logged once until a subsequent successful send resets the flag.
    pub fn record(&self, mut event: AuditEvent) {
        redact(&mut event.details, &self.sensitive_fields);
        match self.sender.try_send(event) {
            Ok(()) => {
                self.dropped_warning_emitted.store(false, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                if !self.dropped_warning_emitted.swap(true, Ordering::Relaxed) {
                    tracing::warn!("audit buffer full; dropping events until it drains");
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

async fn drain(
    mut receiver: mpsc::Receiver<AuditEvent>,
    batch_size: usize,
    flush_interval: std::time::Duration,
) {
    let mut batch = Vec::with_capacity(batch_size);
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = receiver.recv() => {
                match received {
                    Some(event) => {
                        batch.push(event);
                        if batch.len() >= batch_size {
                            flush(&mut batch);
                        }
                    }
                    None => {
                        flush(&mut batch);
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                flush(&mut batch);
            }
        }
    }
}

fn flush(batch: &mut Vec<AuditEvent>) {
    if batch.is_empty() {
        return;
    }
    for event in batch.drain(..) {
        tracing::info!(
            audit_id = %event.id,
            event_type = ?event.event_type,
            severity = ?event.severity,
            request_id = %event.request_id,
            status = event.status,
            "audit event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn sensitive_keys_are_redacted() {
        let event = AuditEvent::new(AuditEventType::ApiKeyUsage, "r1", "GET", "/v1/providers", 200)
            .with_detail("Authorization", "Bearer sk-abc")
            .with_detail("user_agent", "curl/8.0");
        assert_eq!(
            event.details.get("Authorization").unwrap(),
            &Value::String(REDACTED.to_string())
        );
        assert_eq!(
            event.details.get("user_agent").unwrap(),
            &Value::String("curl/8.0".to_string())
        );
    }

    #[test]
    fn severity_follows_event_type_mapping() {
        assert_eq!(AuditEventType::SecurityViolation.severity(), Severity::Critical);
        assert_eq!(AuditEventType::AuthenticationFailure.severity(), Severity::High);
        assert_eq!(AuditEventType::RateLimitExceeded.severity(), Severity::Medium);
        assert_eq!(AuditEventType::AuthenticationSuccess.severity(), Severity::Low);
    }

    #[test]
    fn config_supplied_sensitive_fields_are_merged_with_hardcoded_markers() {
        let mut details = HashMap::new();
        details.insert("org_id".to_string(), Value::String("org-123".to_string()));
        details.insert("user_agent".to_string(), Value::String("curl/8.0".to_string()));
        redact(&mut details, &["org_id".to_string()]);
        assert_eq!(details.get("org_id").unwrap(), &Value::String(REDACTED.to_string()));
        assert_eq!(details.get("user_agent").unwrap(), &Value::String("curl/8.0".to_string()));
    }

    #[tokio::test]
    async fn events_are_flushed_on_batch_full() {
        let (logger, handle) = AuditLogger::start(10, 2, Duration::from_secs(3600), Vec::new());
        logger.record(AuditEvent::new(
            AuditEventType::AuthenticationSuccess,
            "r1",
            "POST",
            "/v1/chat/completions",
            200,
        ));
        logger.record(AuditEvent::new(
            AuditEventType::AuthenticationSuccess,
            "r2",
            "POST",
            "/v1/chat/completions",
            200,
        ));
        drop(logger);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("drainer should exit once the channel closes")
            .unwrap();
    }

    #[tokio::test]
    async fn overflow_does_not_block_the_producer() {
        let (logger, _handle) = AuditLogger::start(1, 100, Duration::from_secs(3600), Vec::new());
        for i in 0..5 {
            logger.record(AuditEvent::new(
                AuditEventType::RateLimitExceeded,
                format!("r{i}"),
                "POST",
                "/v1/chat/completions",
                429,
            ));
        }
    }
}
