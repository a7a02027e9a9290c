//! Result Retrieval Tests
//!
//! Result locator dispatch: local downloads, federated transfers and the
//! malformed, unsupported and not-ready cases.

use std::fs;
use std::sync::Arc;

use hpcjob::mock::{CallKind, MockService};
use hpcjob::{IdentityStore, Job, JobClient, JobError, RegisterOptions, ResultRetrieval};
use tempfile::TempDir;

fn setup() -> (Arc<MockService>, TempDir, Job, String) {
    let service = Arc::new(MockService::new());
    let dir = TempDir::new().unwrap();
    let client = JobClient::new(service.clone(), IdentityStore::new(dir.path()));
    let job = client.register(RegisterOptions::new("hello_world")).unwrap();
    let id = job.id().unwrap().to_string();
    service.clear_calls();
    (service, dir, job, id)
}

fn downloads(service: &MockService) -> usize {
    service
        .calls()
        .iter()
        .filter(|c| c.kind == CallKind::Download)
        .count()
}

#[test]
fn test_local_result_downloaded_under_identifier() {
    let (service, _dir, job, id) = setup();
    service.set_result_folder(&id, "local://abc123");
    service.put_result_files(
        "abc123",
        &[("output.txt", b"42".as_slice()), ("logs/run.log", b"ok".as_slice())],
    );

    let dest = TempDir::new().unwrap();
    let result = job.download_result_folder(dest.path()).unwrap();

    let expected = dest.path().join("abc123");
    assert_eq!(result, ResultRetrieval::Local(expected.clone()));
    assert_eq!(fs::read(expected.join("output.txt")).unwrap(), b"42");
    assert_eq!(fs::read(expected.join("logs/run.log")).unwrap(), b"ok");

    let calls = service.calls();
    let download = calls.iter().find(|c| c.kind == CallKind::Download).unwrap();
    assert_eq!(download.path, "/file");
    assert_eq!(download.params["fileUrl"], "local://abc123");
    assert!(download.params["accessToken"].is_string());
}

#[test]
fn test_malformed_locator_makes_no_download() {
    let (service, _dir, job, id) = setup();
    service.set_result_folder(&id, "weird_format_no_scheme");

    let dest = TempDir::new().unwrap();
    let err = job.download_result_folder(dest.path()).err().unwrap();

    assert!(matches!(
        err,
        JobError::InvalidResultLocatorFormat(ref raw) if raw == "weird_format_no_scheme"
    ));
    assert_eq!(err.exit_code(), 3);
    // Only the status fetch that produced the locator
    assert_eq!(service.calls().len(), 1);
    assert_eq!(downloads(&service), 0);
}

#[test]
fn test_double_separator_is_malformed() {
    let (service, _dir, job, id) = setup();
    service.set_result_folder(&id, "local://a://b");

    let dest = TempDir::new().unwrap();
    assert!(matches!(
        job.download_result_folder(dest.path()),
        Err(JobError::InvalidResultLocatorFormat(_))
    ));
    assert_eq!(downloads(&service), 0);
}

#[test]
fn test_local_identifier_cannot_escape_destination() {
    let (service, _dir, job, id) = setup();
    service.set_result_folder(&id, "local://../outside");

    let dest = TempDir::new().unwrap();
    assert!(matches!(
        job.download_result_folder(dest.path()),
        Err(JobError::InvalidResultLocatorFormat(_))
    ));
    assert_eq!(downloads(&service), 0);
}

#[test]
fn test_result_not_ready() {
    let (service, _dir, job, _id) = setup();

    let dest = TempDir::new().unwrap();
    let err = job.download_result_folder(dest.path()).err().unwrap();
    assert!(matches!(err, JobError::ResultNotReady));
    assert!(err.is_retryable());
    assert_eq!(downloads(&service), 0);
}

#[test]
fn test_unknown_scheme_is_unsupported() {
    let (service, _dir, job, id) = setup();
    service.set_result_folder(&id, "s3://bucket/results");

    let dest = TempDir::new().unwrap();
    let err = job.download_result_folder(dest.path()).err().unwrap();
    assert!(matches!(err, JobError::UnsupportedResultScheme(ref s) if s == "s3"));
    assert_eq!(service.calls().len(), 1);
}

#[test]
fn test_globus_result_requests_transfer() {
    let (service, _dir, job, id) = setup();
    service.set_result_folder(&id, "globus://endpoint/path");

    let dest = TempDir::new().unwrap();
    let result = job.download_result_folder(dest.path()).unwrap();
    let response = match result {
        ResultRetrieval::Transfer(response) => response,
        other => panic!("expected transfer, got {:?}", other),
    };
    assert_eq!(response["fileUrl"], "globus://endpoint/path");
    assert!(response["taskId"].is_string());
    assert_eq!(downloads(&service), 0);
    assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);

    let status = job.query_transfer_status().unwrap();
    assert_eq!(status["taskId"], response["taskId"]);
    assert_eq!(status["status"], "SUCCEEDED");

    let calls = service.calls();
    let last = calls.last().unwrap();
    assert_eq!(last.path, format!("/file/{}/globus_task_status", id));
}

#[test]
fn test_transfer_status_before_transfer() {
    let (_service, _dir, job, _id) = setup();
    assert!(matches!(
        job.query_transfer_status(),
        Err(JobError::Transport(_))
    ));
}
