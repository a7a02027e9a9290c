//! Job lifecycle events and log lines.
//!
//! Both lists are append-only on the service side; clients only ever observe
//! a growing prefix.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::timestamp::Timestamp;

/// Type of a lifecycle event.
///
/// The service may introduce new event types at any time, so unknown values
/// are kept verbatim in [`EventType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    JobQueued,
    JobRegistered,
    JobInit,
    /// The job finished.
    JobEnded,
    /// The job failed.
    JobFailed,
    Other(String),
}

impl EventType {
    /// Returns true if this event ends the job's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventType::JobEnded | EventType::JobFailed)
    }

    /// Wire name of the event type.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::JobQueued => "JOB_QUEUED",
            EventType::JobRegistered => "JOB_REGISTERED",
            EventType::JobInit => "JOB_INIT",
            EventType::JobEnded => "JOB_ENDED",
            EventType::JobFailed => "JOB_FAILED",
            EventType::Other(s) => s,
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "JOB_QUEUED" => EventType::JobQueued,
            "JOB_REGISTERED" => EventType::JobRegistered,
            "JOB_INIT" => EventType::JobInit,
            "JOB_ENDED" => EventType::JobEnded,
            "JOB_FAILED" => EventType::JobFailed,
            _ => EventType::Other(value),
        }
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        EventType::from(value.to_string())
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        match value {
            EventType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event reported by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(event_type: impl Into<EventType>, message: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            message: message.into(),
            created_at: Some(Timestamp::now()),
        }
    }

    /// Returns true if this event ends the job's lifecycle.
    pub fn is_terminal(&self) -> bool {
        self.event_type.is_terminal()
    }
}

/// A single log line produced by the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

impl LogEntry {
    /// Create a log line stamped with the current time.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            created_at: Some(Timestamp::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_event_types_parse() {
        let event: Event = serde_json::from_value(json!({
            "type": "JOB_ENDED",
            "message": "done",
            "createdAt": "2024-03-01T12:00:00Z"
        }))
        .unwrap();

        assert_eq!(event.event_type, EventType::JobEnded);
        assert!(event.is_terminal());
        assert!(matches!(event.created_at, Some(Timestamp::Parsed(_))));
    }

    #[test]
    fn test_unknown_event_type_preserved() {
        let event: Event = serde_json::from_value(json!({
            "type": "SLURM_UPLOAD",
            "message": "uploading"
        }))
        .unwrap();

        assert_eq!(event.event_type, EventType::Other("SLURM_UPLOAD".to_string()));
        assert!(!event.is_terminal());

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["type"], "SLURM_UPLOAD");
    }

    #[test]
    fn test_failed_is_terminal() {
        assert!(EventType::from("JOB_FAILED").is_terminal());
        assert!(!EventType::from("JOB_INIT").is_terminal());
        assert!(!EventType::from("job_ended").is_terminal());
    }

    #[test]
    fn test_log_entry_defaults() {
        let entry: LogEntry = serde_json::from_value(json!({"message": "hello"})).unwrap();
        assert_eq!(entry.message, "hello");
        assert!(entry.created_at.is_none());
    }
}
