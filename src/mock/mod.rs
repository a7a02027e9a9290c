//! Mock Service Implementation
//!
//! An in-process fake of the job orchestration service for tests. It
//! implements [`crate::host::Transport`], so a `JobClient` can run against it
//! unchanged.
//!
//! # Endpoints
//!
//! - `POST /job`: register, issuing an id and secret
//! - `PUT /job/<id>`: store the configuration
//! - `POST /job/<id>/submit`: submit (once)
//! - `GET /job/<id>`: serve the next scripted status snapshot
//! - `GET /file`: start a federated transfer for a `globus://` locator
//! - `GET /file/<id>/globus_task_status`: transfer status
//! - `GET /announcement`: service announcements
//! - upload `/file`: store an archive, answer `local://<ref>`
//! - download `/file`: write a stored result tree into the destination
//!
//! Failures can be injected per path with [`MockService::fail_next`].

mod failure;
mod service;
mod state;

pub use failure::{FailureInjector, MockFailure};
pub use service::{MockService, DEFAULT_HPC};
pub use state::{CallKind, MockJob, MockState, RecordedCall, StatusFrame};
