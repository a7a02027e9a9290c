//! hpcjob - HPC job orchestration client
//!
//! Client SDK for submitting and tracking compute jobs on a remote HPC
//! orchestration service: job registration and re-attachment, configuration
//! and submission, executable folder packaging, live event/log polling with
//! terminal-state detection, and result retrieval.

pub mod bundle;
pub mod config;
pub mod host;
pub mod job;
pub mod mock;
pub mod signal;
pub mod token;

pub use bundle::{Archiver, BundleError};
pub use config::{ClientConfig, ConfigError, ConfigOverrides};
pub use host::{HttpConfig, HttpTransport, Method, Transport, TransportError};
pub use job::{
    IdentityStore, Job, JobClient, JobConfigUpdate, JobConfiguration, JobError, JobHeader,
    JobIdentity, RegisterOptions, ResultRetrieval, TokenSettings,
};
pub use signal::{CancelToken, InterruptHandler};
pub use token::{AccessTokenManager, DigestAlgorithm, TokenError, TokenSigner};
