//! HPC Job Service Protocol Types
//!
//! Defines the JSON documents exchanged with the job orchestration service:
//! job records and status snapshots, lifecycle events, log lines, result
//! locators and the small request/response bodies of the job endpoints.

pub mod event;
pub mod job;
pub mod locator;
pub mod ops;
pub mod timestamp;

pub use event::{Event, EventType, LogEntry};
pub use job::{JobRecord, JobStatus};
pub use locator::{LocatorError, ResultLocator, ResultScheme};
pub use ops::{Announcement, AnnouncementList, CreateJobRequest, CreateJobResponse, UploadResponse};
pub use timestamp::Timestamp;

/// Path of the job collection endpoint.
pub const JOB_PATH: &str = "/job";

/// Path of the file endpoint (uploads and result retrieval).
pub const FILE_PATH: &str = "/file";

/// Path of the announcement endpoint.
pub const ANNOUNCEMENT_PATH: &str = "/announcement";

/// Path of a single job resource.
pub fn job_path(job_id: &str) -> String {
    format!("{}/{}", JOB_PATH, job_id)
}

/// Path of the submit action for a job.
pub fn submit_path(job_id: &str) -> String {
    format!("{}/{}/submit", JOB_PATH, job_id)
}

/// Path of the federated transfer status for a job.
pub fn transfer_status_path(job_id: &str) -> String {
    format!("{}/{}/globus_task_status", FILE_PATH, job_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(job_path("abc"), "/job/abc");
        assert_eq!(submit_path("abc"), "/job/abc/submit");
        assert_eq!(transfer_status_path("abc"), "/file/abc/globus_task_status");
    }
}
