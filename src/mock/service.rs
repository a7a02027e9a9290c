//! Mock orchestration service
//!
//! In-process fake of the job service implementing [`Transport`]. Every call
//! is recorded; access tokens are checked against the issued secrets.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use hpcjob_protocol::{Announcement, Event, JobRecord, LogEntry, ResultLocator, ResultScheme};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::host::{Method, Transport, TransportError};
use crate::token::{AccessTokenClaims, DigestAlgorithm};

use super::failure::{FailureInjector, MockFailure};
use super::state::{CallKind, MockJob, MockState, RecordedCall, StatusFrame};

/// HPC assigned when registration names none
pub const DEFAULT_HPC: &str = "keeling_community";

const SECRET_LEN: usize = 32;

/// Fake job service for tests
#[derive(Debug, Default)]
pub struct MockService {
    state: Mutex<MockState>,
    failures: Mutex<FailureInjector>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_found(what: &str) -> TransportError {
    TransportError::Http {
        status: 404,
        message: format!("{} not found", what),
    }
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next call to `path`
    pub fn fail_next(&self, path: impl Into<String>, failure: MockFailure) {
        lock(&self.failures).inject(path, failure);
    }

    /// Queue a status snapshot for a job; snapshots are served in order and
    /// the last one repeats
    pub fn push_status(&self, job_id: &str, events: Vec<Event>, logs: Vec<LogEntry>) {
        if let Some(job) = lock(&self.state).jobs.get_mut(job_id) {
            job.frames.push_back(StatusFrame { events, logs });
        }
    }

    /// Set the result locator reported by status
    pub fn set_result_folder(&self, job_id: &str, locator: impl Into<String>) {
        if let Some(job) = lock(&self.state).jobs.get_mut(job_id) {
            job.record.result_folder = Some(locator.into());
        }
    }

    /// Store a downloadable result tree under a `local://` identifier
    pub fn put_result_files(&self, identifier: &str, files: &[(&str, &[u8])]) {
        let files = files
            .iter()
            .map(|(path, data)| (path.to_string(), data.to_vec()))
            .collect();
        lock(&self.state).results.insert(identifier.to_string(), files);
    }

    pub fn add_announcement(&self, announcement: Announcement) {
        lock(&self.state).announcements.push(announcement);
    }

    /// Archive uploaded under a file reference
    pub fn uploaded(&self, reference: &str) -> Option<Vec<u8>> {
        lock(&self.state).uploads.get(reference).cloned()
    }

    /// Service-side record of a job
    pub fn job_record(&self, job_id: &str) -> Option<JobRecord> {
        lock(&self.state).jobs.get(job_id).map(|j| j.record.clone())
    }

    pub fn is_submitted(&self, job_id: &str) -> bool {
        lock(&self.state)
            .jobs
            .get(job_id)
            .map_or(false, |j| j.submitted)
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.state).calls.clone()
    }

    /// Number of calls received for `(method, path)`
    pub fn call_count(&self, method: Method, path: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Record the call and apply any injected failure
    fn begin(
        &self,
        kind: CallKind,
        method: Method,
        path: &str,
        params: &Value,
    ) -> Result<(), TransportError> {
        lock(&self.state).calls.push(RecordedCall {
            kind,
            method,
            path: path.to_string(),
            params: params.clone(),
        });
        match lock(&self.failures).check(path) {
            Some(failure) => Err(failure.into_error(path)),
            None => Ok(()),
        }
    }

    fn create_job(state: &mut MockState, params: &Value) -> Result<Value, TransportError> {
        let maintainer = params
            .get("maintainer")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| TransportError::Service("maintainer is required".to_string()))?;
        let hpc = params
            .get("hpc")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_HPC);

        let id = Uuid::new_v4().simple().to_string();
        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SECRET_LEN)
            .map(char::from)
            .collect();

        state.jobs.insert(
            id.clone(),
            MockJob::new(id.clone(), secret.clone(), maintainer.to_string(), hpc.to_string()),
        );
        Ok(json!({
            "id": id,
            "hpc": hpc,
            "maintainer": maintainer,
            "secretToken": secret,
        }))
    }

    fn route(state: &mut MockState, method: Method, path: &str, params: &Value) -> Result<Value, TransportError> {
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match (method, segments.as_slice()) {
            (Method::Post, ["job"]) => Self::create_job(state, params),
            (Method::Put, ["job", id]) => {
                let job = authorize(state, params, Some(*id))?;
                job.apply_config(params);
                record_value(&job.record)
            }
            (Method::Post, ["job", id, "submit"]) => {
                let job = authorize(state, params, Some(*id))?;
                if job.submitted {
                    return Err(TransportError::Service("job already submitted".to_string()));
                }
                job.submitted = true;
                record_value(&job.record)
            }
            (Method::Get, ["job", id]) => {
                let job = authorize(state, params, Some(*id))?;
                serde_json::to_value(job.poll()).map_err(TransportError::from)
            }
            (Method::Get, ["file"]) => {
                let job = authorize(state, params, None)?;
                let locator = file_url(params)?;
                if locator.scheme() != &ResultScheme::Globus {
                    return Err(TransportError::Service(format!(
                        "{} cannot be transferred",
                        locator
                    )));
                }
                let task_id = Uuid::new_v4().to_string();
                job.transfer_task = Some(task_id.clone());
                Ok(json!({ "taskId": task_id, "fileUrl": locator.to_string() }))
            }
            (Method::Get, ["file", id, "globus_task_status"]) => {
                let job = authorize(state, params, Some(*id))?;
                match &job.transfer_task {
                    Some(task_id) => Ok(json!({ "taskId": task_id, "status": "SUCCEEDED" })),
                    None => Err(TransportError::Service("no transfer requested".to_string())),
                }
            }
            (Method::Get, ["announcement"]) => {
                Ok(json!({ "announcements": state.announcements.clone() }))
            }
            _ => Err(not_found(path)),
        }
    }
}

fn record_value(record: &JobRecord) -> Result<Value, TransportError> {
    serde_json::to_value(record).map_err(TransportError::from)
}

fn file_url(params: &Value) -> Result<ResultLocator, TransportError> {
    let raw = params
        .get("fileUrl")
        .and_then(Value::as_str)
        .ok_or_else(|| TransportError::Service("fileUrl is required".to_string()))?;
    ResultLocator::parse(raw).map_err(|e| TransportError::Service(e.to_string()))
}

/// Check the request's access token and return its job
fn authorize<'a>(
    state: &'a mut MockState,
    params: &Value,
    expected_id: Option<&str>,
) -> Result<&'a mut MockJob, TransportError> {
    let invalid = || TransportError::Service("invalid access token".to_string());

    let token = params
        .get("accessToken")
        .and_then(Value::as_str)
        .ok_or_else(|| TransportError::Service("accessToken is required".to_string()))?;
    let claims = AccessTokenClaims::decode(token).map_err(|_| invalid())?;
    let algorithm: DigestAlgorithm = claims.alg.parse().map_err(|_| invalid())?;

    let id = claims.payload.decoded.id.clone();
    if expected_id.map_or(false, |expected| expected != id) {
        return Err(invalid());
    }
    let job = state.jobs.get_mut(&id).ok_or_else(|| not_found("job"))?;
    if !claims.verify(&algorithm, &job.secret) {
        return Err(invalid());
    }
    Ok(job)
}

impl Transport for MockService {
    fn request(&self, method: Method, path: &str, params: &Value) -> Result<Value, TransportError> {
        self.begin(CallKind::Request, method, path, params)?;
        let mut state = lock(&self.state);
        Self::route(&mut state, method, path, params)
    }

    fn upload(&self, path: &str, params: &Value, content: &[u8]) -> Result<Value, TransportError> {
        self.begin(CallKind::Upload, Method::Post, path, params)?;
        if path != hpcjob_protocol::FILE_PATH {
            return Err(not_found(path));
        }
        let mut state = lock(&self.state);
        authorize(&mut state, params, None)?;

        let reference = format!("local://{}", Uuid::new_v4().simple());
        state.uploads.insert(reference.clone(), content.to_vec());
        Ok(json!({ "file": reference }))
    }

    fn download(
        &self,
        method: Method,
        path: &str,
        params: &Value,
        dest: &Path,
    ) -> Result<PathBuf, TransportError> {
        self.begin(CallKind::Download, method, path, params)?;
        if path != hpcjob_protocol::FILE_PATH {
            return Err(not_found(path));
        }
        let files = {
            let mut state = lock(&self.state);
            authorize(&mut state, params, None)?;
            let locator = file_url(params)?;
            state
                .results
                .get(locator.identifier())
                .cloned()
                .ok_or_else(|| not_found(locator.identifier()))?
        };

        fs::create_dir_all(dest)?;
        for (relative, data) in files {
            let target = dest.join(&relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, data)?;
        }
        Ok(dest.to_path_buf())
    }
}
