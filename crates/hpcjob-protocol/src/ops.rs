//! Request and response bodies for the job endpoints.

use serde::{Deserialize, Serialize};

/// Body of `POST /job`.
///
/// `user`/`password` are accepted by the service for legacy logins; clients
/// should prefer re-attaching through a persisted identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub maintainer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hpc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Response of `POST /job`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub id: String,
    pub hpc: String,
    pub secret_token: String,
}

/// Response of an upload to `/file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Reference to the stored file, used as a job's executable folder.
    pub file: String,
}

/// A service-wide announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub poster: String,
    #[serde(default)]
    pub time_stamp: String,
}

/// Response of `GET /announcement`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnouncementList {
    #[serde(default)]
    pub announcements: Vec<Announcement>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_request_omits_absent_fields() {
        let req = CreateJobRequest {
            maintainer: "hello_world".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value, json!({"maintainer": "hello_world"}));
    }

    #[test]
    fn test_create_response_camel_case() {
        let resp: CreateJobResponse = serde_json::from_value(json!({
            "id": "job1",
            "hpc": "keeling_community",
            "secretToken": "s3cr3t",
            "maintainer": "hello_world"
        }))
        .unwrap();
        assert_eq!(resp.secret_token, "s3cr3t");
    }

    #[test]
    fn test_announcements_default_empty() {
        let list: AnnouncementList = serde_json::from_value(json!({})).unwrap();
        assert!(list.announcements.is_empty());
    }
}
