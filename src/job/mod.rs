//! Job lifecycle client
//!
//! Owns one job's identity and configuration and performs every operation
//! on it: registration or restoration, configuration, executable upload,
//! submission, status/event/log observation and result retrieval.
//!
//! Lifecycle: UNINITIALIZED → (register/restore) → CONFIGURED → (submit) →
//! SUBMITTED → (poll) → RUNNING → TERMINAL(ENDED | FAILED)

mod config;
mod identity;
mod watch;

pub use config::{JobConfigUpdate, JobConfiguration, ParamMap};
pub use identity::{validate_job_id, IdentityError, IdentityStore, JobIdentity};
pub use watch::{EventWatch, JobHeader, LogWatch};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hpcjob_protocol::{
    job_path, submit_path, transfer_status_path, AnnouncementList, Announcement,
    CreateJobRequest, CreateJobResponse, Event, JobRecord, JobStatus, LocatorError, LogEntry,
    ResultLocator, ResultScheme, UploadResponse, ANNOUNCEMENT_PATH, FILE_PATH, JOB_PATH,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bundle::{normalize_path, Archiver, BundleError};
use crate::config::ClientConfig;
use crate::host::{HttpTransport, Method, Transport, TransportError};
use crate::signal::{CancelToken, EXIT_CODE_CANCELLED};
use crate::token::{AccessTokenManager, DigestAlgorithm, TokenError, DEFAULT_FRESHNESS_SECS};

/// Errors raised by the job lifecycle client
#[derive(Debug, Error)]
pub enum JobError {
    #[error("missing job ID, register or restore the job first")]
    MissingIdentity,

    #[error("job ID {id} provided but constructor file {} not found", path.display())]
    MissingConstructorFile { id: String, path: PathBuf },

    #[error("maintainer is required to register a job")]
    InvalidMaintainer,

    #[error("result folder is not ready")]
    ResultNotReady,

    #[error("invalid result folder format: {0:?}")]
    InvalidResultLocatorFormat(String),

    #[error("unsupported result folder scheme: {0}")]
    UnsupportedResultScheme(String),

    #[error("watch cancelled")]
    Cancelled,

    #[error("unexpected service response: {0}")]
    Protocol(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to package executable folder: {0}")]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl From<LocatorError> for JobError {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::InvalidFormat(raw) => JobError::InvalidResultLocatorFormat(raw),
        }
    }
}

/// Failure kind for exit code mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Caller misuse: missing identity, maintainer or constructor file
    Precondition = 2,
    /// Bad or not-yet-available data from the service
    Data = 3,
    /// Transport or service failures
    Transport = 20,
    /// Executable folder packaging failures
    Bundle = 92,
    /// Watch cancelled by the caller
    Cancelled = EXIT_CODE_CANCELLED as isize,
}

impl JobError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            JobError::MissingIdentity
            | JobError::MissingConstructorFile { .. }
            | JobError::InvalidMaintainer
            | JobError::Identity(_)
            | JobError::Token(_) => FailureKind::Precondition,
            JobError::ResultNotReady
            | JobError::InvalidResultLocatorFormat(_)
            | JobError::UnsupportedResultScheme(_)
            | JobError::Protocol(_) => FailureKind::Data,
            JobError::Transport(_) => FailureKind::Transport,
            JobError::Bundle(_) => FailureKind::Bundle,
            JobError::Cancelled => FailureKind::Cancelled,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        self.failure_kind() as i32
    }

    /// Whether the same call may succeed later
    pub fn is_retryable(&self) -> bool {
        match self {
            JobError::ResultNotReady => true,
            JobError::Transport(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Token derivation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSettings {
    pub algorithm: DigestAlgorithm,
    pub freshness_secs: u64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            algorithm: DigestAlgorithm::default(),
            freshness_secs: DEFAULT_FRESHNESS_SECS,
        }
    }
}

/// Inputs for a fresh registration
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    pub maintainer: Option<String>,
    pub hpc: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl RegisterOptions {
    pub fn new(maintainer: impl Into<String>) -> Self {
        Self {
            maintainer: Some(maintainer.into()),
            ..Default::default()
        }
    }

    pub fn hpc(mut self, hpc: impl Into<String>) -> Self {
        self.hpc = Some(hpc.into());
        self
    }
}

/// Result of retrieving a job's result folder
#[derive(Debug, Clone, PartialEq)]
pub enum ResultRetrieval {
    /// Files were downloaded to this local path
    Local(PathBuf),
    /// The service arranged a federated transfer; its description
    Transfer(Value),
}

/// Entry point: creates and re-attaches jobs against one service
#[derive(Clone)]
pub struct JobClient {
    transport: Arc<dyn Transport>,
    store: IdentityStore,
    token: TokenSettings,
    max_bundle_bytes: u64,
}

impl JobClient {
    pub fn new(transport: Arc<dyn Transport>, store: IdentityStore) -> Self {
        Self {
            transport,
            store,
            token: TokenSettings::default(),
            max_bundle_bytes: 0,
        }
    }

    /// HTTP-backed client from resolved configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self, JobError> {
        let transport = HttpTransport::new(config.http_config())?;
        Ok(Self::new(Arc::new(transport), IdentityStore::new(&config.identity_dir))
            .with_token_settings(config.token_settings())
            .with_max_bundle_bytes(config.max_bundle_bytes))
    }

    pub fn with_token_settings(mut self, token: TokenSettings) -> Self {
        self.token = token;
        self
    }

    /// Limit the executable archive size (0 = no limit)
    pub fn with_max_bundle_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bundle_bytes = max_bytes;
        self
    }

    pub fn store(&self) -> &IdentityStore {
        &self.store
    }

    /// Register a new job with the service and persist its identity
    pub fn register(&self, options: RegisterOptions) -> Result<Job, JobError> {
        let maintainer = options
            .maintainer
            .filter(|m| !m.trim().is_empty())
            .ok_or(JobError::InvalidMaintainer)?;

        let mut request = CreateJobRequest {
            maintainer: maintainer.clone(),
            hpc: options.hpc,
            ..Default::default()
        };
        // Legacy credentials only travel together
        if options.user.is_some() {
            request.user = options.user;
            request.password = options.password.clone();
        }

        let body = serde_json::to_value(&request).map_err(TransportError::from)?;
        let response = self.transport.request(Method::Post, JOB_PATH, &body)?;
        let created: CreateJobResponse = decode(response, "create job")?;
        // The id becomes a file name; reject unsafe ones before the store sees them
        if validate_job_id(&created.id).is_err() {
            return Err(JobError::Protocol(format!(
                "service returned invalid job id {:?}",
                created.id
            )));
        }

        let identity = JobIdentity {
            secret_token: created.secret_token,
            id: created.id,
            hpc: created.hpc,
            maintainer,
        };
        let path = self.store.save(&identity)?;
        info!(
            job_id = %identity.id,
            path = %path.display(),
            "created constructor file"
        );

        if options.password.is_some() {
            warn!(
                job_id = %identity.id,
                "password input detected: distributing code with login credentials is not safe; \
                 share constructor file {} and re-attach by job ID instead",
                IdentityStore::file_name(&identity.id)
            );
        }

        Ok(self.attach(identity))
    }

    /// Re-attach to a job from its persisted identity file
    pub fn restore(&self, id: &str) -> Result<Job, JobError> {
        match self.store.load(id)? {
            Some(identity) => {
                debug!(job_id = %identity.id, "restored job identity");
                Ok(self.attach(identity))
            }
            None => Err(JobError::MissingConstructorFile {
                id: id.to_string(),
                path: self.store.path_for(id)?,
            }),
        }
    }

    /// A client with no identity; every job-scoped operation fails with
    /// `MissingIdentity`
    pub fn detached(&self) -> Job {
        Job {
            identity: None,
            transport: Arc::clone(&self.transport),
            tokens: AccessTokenManager::new(self.token.freshness_secs),
            config: JobConfiguration::default(),
            max_bundle_bytes: self.max_bundle_bytes,
        }
    }

    /// Service-wide announcements
    pub fn announcements(&self) -> Result<Vec<Announcement>, JobError> {
        let response = self
            .transport
            .request(Method::Get, ANNOUNCEMENT_PATH, &json!({}))?;
        let list: AnnouncementList = decode(response, "announcements")?;
        Ok(list.announcements)
    }

    fn attach(&self, identity: JobIdentity) -> Job {
        let mut tokens = AccessTokenManager::new(self.token.freshness_secs);
        tokens.initialize(self.token.algorithm, &identity.id, &identity.secret_token);
        Job {
            identity: Some(identity),
            transport: Arc::clone(&self.transport),
            tokens,
            config: JobConfiguration::default(),
            max_bundle_bytes: self.max_bundle_bytes,
        }
    }
}

/// One job's client-side state
pub struct Job {
    identity: Option<JobIdentity>,
    transport: Arc<dyn Transport>,
    tokens: AccessTokenManager,
    config: JobConfiguration,
    max_bundle_bytes: u64,
}

impl Job {
    pub fn id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.id.as_str())
    }

    pub fn identity(&self) -> Option<&JobIdentity> {
        self.identity.as_ref()
    }

    /// Header for live displays
    pub fn header(&self) -> Option<JobHeader> {
        self.identity.as_ref().map(|i| JobHeader {
            id: i.id.clone(),
            hpc: i.hpc.clone(),
            maintainer: i.maintainer.clone(),
        })
    }

    pub fn configuration(&self) -> &JobConfiguration {
        &self.config
    }

    /// Merge a partial update into the configuration
    pub fn configure(&mut self, update: JobConfigUpdate) -> &JobConfiguration {
        self.config.merge(update);
        debug!(job_id = ?self.id(), config = ?self.config, "job configuration");
        &self.config
    }

    /// Package `dir` and upload it as the job's executable folder
    ///
    /// Returns the raw upload response.
    pub fn upload_executable_folder(&mut self, dir: &Path) -> Result<Value, JobError> {
        let token = self.access_token()?;

        let mut archiver = Archiver::new().with_max_bytes(self.max_bundle_bytes);
        archiver.append_dir(dir)?;
        let bytes = archiver.read()?;
        info!(
            dir = %dir.display(),
            files = archiver.len(),
            bytes = bytes.len(),
            "uploading executable folder"
        );

        let response = self
            .transport
            .upload(FILE_PATH, &json!({ "accessToken": token }), &bytes)?;
        let upload: UploadResponse = decode(response.clone(), "upload")?;
        self.config.executable_folder = Some(upload.file);
        Ok(response)
    }

    /// Send the configuration snapshot and submit the job
    pub fn submit(&self) -> Result<JobRecord, JobError> {
        let id = self.require_id()?;

        let body = self
            .config
            .to_request_body(&self.access_token()?)
            .map_err(TransportError::from)?;
        self.transport.request(Method::Put, &job_path(id), &body)?;

        let response = self.transport.request(
            Method::Post,
            &submit_path(id),
            &json!({ "accessToken": self.access_token()? }),
        )?;
        let record: JobRecord = decode(response, "submit")?;
        info!(job_id = %record.id, hpc = %record.hpc, "job submitted");
        Ok(record)
    }

    /// Fetch a fresh status snapshot
    pub fn status(&self) -> Result<JobStatus, JobError> {
        let id = self.require_id()?;
        let response = self.transport.request(
            Method::Get,
            &job_path(id),
            &json!({ "accessToken": self.access_token()? }),
        )?;
        decode(response, "status")
    }

    /// Events of a single snapshot
    pub fn events(&self) -> Result<Vec<Event>, JobError> {
        Ok(self.status()?.events)
    }

    /// Logs of a single snapshot
    pub fn logs(&self) -> Result<Vec<LogEntry>, JobError> {
        Ok(self.status()?.logs)
    }

    /// Watch events until a terminal event or cancellation
    pub fn watch_events(&self, interval: Duration, cancel: CancelToken) -> EventWatch<'_> {
        EventWatch::new(self, interval, cancel)
    }

    /// Watch logs until the job reaches a terminal event or cancellation
    pub fn watch_logs(&self, interval: Duration, cancel: CancelToken) -> LogWatch<'_> {
        LogWatch::new(self, interval, cancel)
    }

    /// Retrieve the job's result folder
    ///
    /// `local` results are downloaded under `dest/<identifier>`; `globus`
    /// results are handed to the service as a transfer request.
    pub fn download_result_folder(&self, dest: &Path) -> Result<ResultRetrieval, JobError> {
        self.require_id()?;
        let status = self.status()?;

        let raw = status
            .record
            .result_folder
            .filter(|r| !r.is_empty())
            .ok_or(JobError::ResultNotReady)?;
        let locator = ResultLocator::parse(&raw)?;
        let params = json!({
            "accessToken": self.access_token()?,
            "fileUrl": raw,
        });

        match locator.scheme() {
            ResultScheme::Globus => {
                let response = self.transport.request(Method::Get, FILE_PATH, &params)?;
                info!(locator = %locator, "requested result transfer");
                Ok(ResultRetrieval::Transfer(response))
            }
            ResultScheme::Local => {
                let relative = normalize_path(Path::new(locator.identifier()))
                    .map_err(|_| JobError::InvalidResultLocatorFormat(raw.clone()))?;
                let target = dest.join(relative);
                let path = self
                    .transport
                    .download(Method::Get, FILE_PATH, &params, &target)?;
                info!(path = %path.display(), "result folder downloaded");
                Ok(ResultRetrieval::Local(path))
            }
            ResultScheme::Other(scheme) => Err(JobError::UnsupportedResultScheme(scheme.clone())),
        }
    }

    /// Status of a federated result transfer
    pub fn query_transfer_status(&self) -> Result<Value, JobError> {
        let id = self.require_id()?;
        let response = self.transport.request(
            Method::Get,
            &transfer_status_path(id),
            &json!({ "accessToken": self.access_token()? }),
        )?;
        Ok(response)
    }

    fn require_id(&self) -> Result<&str, JobError> {
        self.id().ok_or(JobError::MissingIdentity)
    }

    fn access_token(&self) -> Result<String, JobError> {
        if self.identity.is_none() {
            return Err(JobError::MissingIdentity);
        }
        Ok(self.tokens.access_token()?)
    }
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, JobError> {
    serde_json::from_value(value).map_err(|e| JobError::Protocol(format!("{}: {}", what, e)))
}
