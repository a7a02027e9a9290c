//! Job records and status snapshots.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::event::{Event, LogEntry};
use crate::timestamp::Timestamp;

/// The service's authoritative view of a job's configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    #[serde(default)]
    pub maintainer: String,
    #[serde(default)]
    pub hpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_folder: Option<String>,
    /// Result locator, present once the service has produced output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_folder: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub param: BTreeMap<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub env: BTreeMap<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub slurm: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

/// A full status snapshot: the job record plus its events and logs.
///
/// Snapshots are never cached by clients; every observation fetches a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(flatten)]
    pub record: JobRecord,
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<Event>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub logs: Vec<LogEntry>,
}

impl JobStatus {
    /// Returns true if any event in the snapshot is terminal.
    pub fn is_terminal(&self) -> bool {
        self.events.iter().any(Event::is_terminal)
    }

    /// The first terminal event, if the job has finished.
    pub fn terminal_event(&self) -> Option<&Event> {
        self.events.iter().find(|e| e.is_terminal())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
