//! Mock service state
//!
//! Jobs, uploads, stored results and the call log of the mock service.

use std::collections::{BTreeMap, HashMap, VecDeque};

use hpcjob_protocol::{Announcement, Event, JobRecord, JobStatus, LogEntry, Timestamp};
use serde_json::Value;

use crate::host::Method;

/// Which transport primitive a call came through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Request,
    Upload,
    Download,
}

/// One call received by the mock service
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub method: Method,
    pub path: String,
    pub params: Value,
}

/// Events and logs returned by one status poll
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusFrame {
    pub events: Vec<Event>,
    pub logs: Vec<LogEntry>,
}

/// A job known to the mock service
#[derive(Debug, Clone)]
pub struct MockJob {
    pub record: JobRecord,
    pub secret: String,
    pub submitted: bool,
    /// Snapshots not yet served, oldest first
    pub frames: VecDeque<StatusFrame>,
    /// Last snapshot served; repeated once `frames` runs dry
    pub current: StatusFrame,
    /// Task id of a requested federated transfer
    pub transfer_task: Option<String>,
}

impl MockJob {
    pub fn new(id: String, secret: String, maintainer: String, hpc: String) -> Self {
        Self {
            record: JobRecord {
                id,
                maintainer,
                hpc,
                created_at: Some(Timestamp::now()),
                ..Default::default()
            },
            secret,
            submitted: false,
            frames: VecDeque::new(),
            current: StatusFrame::default(),
            transfer_task: None,
        }
    }

    /// Advance to the next scripted frame and return the snapshot
    pub fn poll(&mut self) -> JobStatus {
        if let Some(frame) = self.frames.pop_front() {
            self.current = frame;
        }
        JobStatus {
            record: self.record.clone(),
            events: self.current.events.clone(),
            logs: self.current.logs.clone(),
        }
    }

    /// Apply the configuration fields of a `PUT /job/<id>` body
    pub fn apply_config(&mut self, params: &Value) {
        fn map(value: Option<&Value>) -> Option<BTreeMap<String, Value>> {
            value
                .and_then(Value::as_object)
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        }
        fn text(value: Option<&Value>) -> Option<String> {
            value.and_then(Value::as_str).map(str::to_string)
        }

        if let Some(param) = map(params.get("param")) {
            self.record.param = param;
        }
        if let Some(env) = map(params.get("env")) {
            self.record.env = env;
        }
        if let Some(slurm) = map(params.get("slurm")) {
            self.record.slurm = slurm;
        }
        if let Some(folder) = text(params.get("executableFolder")) {
            self.record.executable_folder = Some(folder);
        }
        if let Some(folder) = text(params.get("dataFolder")) {
            self.record.data_folder = Some(folder);
        }
        if let Some(folder) = text(params.get("resultFolder")) {
            self.record.result_folder = Some(folder);
        }
    }
}

/// All mutable state of the mock service
#[derive(Debug, Default)]
pub struct MockState {
    pub jobs: HashMap<String, MockJob>,
    /// Uploaded archives by file reference
    pub uploads: BTreeMap<String, Vec<u8>>,
    /// Downloadable result trees by locator identifier
    pub results: HashMap<String, Vec<(String, Vec<u8>)>>,
    pub announcements: Vec<Announcement>,
    pub calls: Vec<RecordedCall>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> MockJob {
        MockJob::new("j1".into(), "s".into(), "hello_world".into(), "keeling_community".into())
    }

    #[test]
    fn test_poll_repeats_last_frame() {
        let mut job = job();
        job.frames.push_back(StatusFrame::default());
        job.frames.push_back(StatusFrame {
            events: vec![Event::new("JOB_QUEUED", "queued")],
            logs: vec![],
        });

        assert!(job.poll().events.is_empty());
        assert_eq!(job.poll().events.len(), 1);
        assert_eq!(job.poll().events.len(), 1);
    }

    #[test]
    fn test_apply_config() {
        let mut job = job();
        job.apply_config(&json!({
            "accessToken": "t",
            "param": {"n": 1},
            "env": {},
            "executableFolder": "local://e"
        }));

        assert_eq!(job.record.param["n"], 1);
        assert!(job.record.env.is_empty());
        assert_eq!(job.record.executable_folder.as_deref(), Some("local://e"));
        assert!(job.record.result_folder.is_none());
    }
}
