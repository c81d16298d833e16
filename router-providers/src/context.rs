//! # Request Context
//!
//! A per-request handle threaded through the router and execution engine,
//! carrying the identifiers needed for logging/audit correlation and a
//! cancellation flag the gateway can trip when a client disconnects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation flag shared between the HTTP handler (owner) and whatever
/// is currently awaiting a provider call. Kept as a plain atomic rather
/// than pulling in `tokio_util::sync::CancellationToken` for this alone.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-request metadata that flows from the HTTP surface through the
/// router and execution engine. Not serialized; lives only for the
/// duration of one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub client_id: Option<String>,
    pub application: Option<String>,
    pub cancellation: CancellationFlag,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            client_id: None,
            application: None,
            cancellation: CancellationFlag::new(),
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = Some(application.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_flag_starts_false_and_sticks_once_set() {
        let flag = CancellationFlag::new();
        assert!(!flag.is_cancelled());
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
