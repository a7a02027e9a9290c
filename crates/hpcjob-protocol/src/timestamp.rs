//! Creation timestamps as reported by the service.
//!
//! The service stamps jobs, events and log lines with `createdAt`. Most
//! deployments send RFC 3339 strings, but epoch numbers and zone-less strings
//! also occur. A value that does not parse is kept as-is so a single odd
//! stamp never fails a whole status snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Parsed(DateTime<Utc>),
    /// Anything that is not an RFC 3339 string, verbatim.
    Raw(Value),
}

impl Timestamp {
    pub fn now() -> Self {
        Timestamp::Parsed(Utc::now())
    }

    /// The parsed time, if the service sent RFC 3339.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Parsed(t) => Some(*t),
            Timestamp::Raw(_) => None,
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Timestamp::Parsed(value)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Parsed(t) => f.write_str(&t.to_rfc3339()),
            Timestamp::Raw(Value::String(s)) => f.write_str(s),
            Timestamp::Raw(other) => write!(f, "{}", other),
        }
    }
}
