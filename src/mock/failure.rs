//! Failure injection for the mock service
//!
//! Failures are queued per request path and consumed one call at a time, so
//! a test can make exactly the Nth call to an endpoint fail.

use std::collections::{HashMap, VecDeque};

use crate::host::TransportError;

/// A failure the mock service can return instead of handling a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    ConnectionFailed,
    /// Non-2xx HTTP status
    Http(u16),
    /// Top-level `error` in an otherwise successful response
    Service(String),
}

impl MockFailure {
    pub fn into_error(self, path: &str) -> TransportError {
        match self {
            MockFailure::Timeout => TransportError::Timeout(format!("{} timed out", path)),
            MockFailure::ConnectionFailed => {
                TransportError::ConnectionFailed(format!("connection to {} refused", path))
            }
            MockFailure::Http(status) => TransportError::Http {
                status,
                message: format!("injected failure for {}", path),
            },
            MockFailure::Service(message) => TransportError::Service(message),
        }
    }
}

/// Per-path failure queues
#[derive(Debug, Default)]
pub struct FailureInjector {
    queued: HashMap<String, VecDeque<MockFailure>>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call to `path`
    pub fn inject(&mut self, path: impl Into<String>, failure: MockFailure) {
        self.queued.entry(path.into()).or_default().push_back(failure);
    }

    /// Take the next queued failure for `path`, if any
    pub fn check(&mut self, path: &str) -> Option<MockFailure> {
        let queue = self.queued.get_mut(path)?;
        let failure = queue.pop_front();
        if queue.is_empty() {
            self.queued.remove(path);
        }
        failure
    }

    pub fn clear(&mut self) {
        self.queued.clear();
    }
}
