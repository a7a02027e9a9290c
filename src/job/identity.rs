//! Persisted job identities
//!
//! A job's identity (`id`, secret, HPC and maintainer) is written once at
//! registration to `job_constructor_<id>.json` and read back to re-attach to
//! the job from another process. It is the only durable state the client
//! owns.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Identity file name prefix
pub const FILE_PREFIX: &str = "job_constructor_";

/// Identity file extension
pub const FILE_EXTENSION: &str = "json";

/// Immutable identity of a registered job
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobIdentity {
    pub secret_token: String,
    pub id: String,
    pub hpc: String,
    pub maintainer: String,
}

impl fmt::Debug for JobIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobIdentity")
            .field("id", &self.id)
            .field("hpc", &self.hpc)
            .field("maintainer", &self.maintainer)
            .field("secret_token", &"<redacted>")
            .finish()
    }
}

/// Errors for identity persistence
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Invalid job id {0:?}: only ASCII letters, digits, '-' and '_' are allowed")]
    InvalidJobId(String),

    #[error("Failed to access identity file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed identity file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Check that a job id is safe to embed in a file name
pub fn validate_job_id(id: &str) -> Result<(), IdentityError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(IdentityError::InvalidJobId(id.to_string()))
    }
}

/// Directory of identity files
#[derive(Debug, Clone)]
pub struct IdentityStore {
    dir: PathBuf,
}

impl IdentityStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a job id
    pub fn file_name(id: &str) -> String {
        format!("{}{}.{}", FILE_PREFIX, id, FILE_EXTENSION)
    }

    /// Full path of the identity file for a job id
    pub fn path_for(&self, id: &str) -> Result<PathBuf, IdentityError> {
        validate_job_id(id)?;
        Ok(self.dir.join(Self::file_name(id)))
    }

    pub fn exists(&self, id: &str) -> Result<bool, IdentityError> {
        Ok(self.path_for(id)?.is_file())
    }

    /// Load an identity, or `None` if no file exists for `id`
    pub fn load(&self, id: &str) -> Result<Option<JobIdentity>, IdentityError> {
        let path = self.path_for(id)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(IdentityError::Io { path, source }),
        };
        let identity = serde_json::from_str(&content)
            .map_err(|source| IdentityError::Json { path, source })?;
        Ok(Some(identity))
    }

    /// Persist an identity atomically (write-then-rename) and return the file path
    pub fn save(&self, identity: &JobIdentity) -> Result<PathBuf, IdentityError> {
        let path = self.path_for(&identity.id)?;
        let io_err = |source| IdentityError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let json = serde_json::to_vec_pretty(identity).map_err(|source| IdentityError::Json {
            path: path.clone(),
            source,
        })?;

        let temp_path = path.with_extension("tmp");
        let mut file = open_private(&temp_path).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        fs::rename(&temp_path, &path).map_err(io_err)?;
        Ok(path)
    }
}

/// Open for writing, readable by the owner only on unix
fn open_private(path: &Path) -> io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identity(id: &str) -> JobIdentity {
        JobIdentity {
            secret_token: "s3cr3t".to_string(),
            id: id.to_string(),
            hpc: "keeling_community".to_string(),
            maintainer: "hello_world".to_string(),
        }
    }

    #[test]
    fn test_file_name() {
        assert_eq!(IdentityStore::file_name("abc"), "job_constructor_abc.json");
    }

    #[test]
    fn test_validate_job_id() {
        assert!(validate_job_id("1650000000abc_DEF-1").is_ok());
        assert!(validate_job_id("").is_err());
        assert!(validate_job_id("../etc").is_err());
        assert!(validate_job_id("a/b").is_err());
        assert!(validate_job_id("a b").is_err());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = IdentityStore::new(dir.path());

        let path = store.save(&identity("job1")).unwrap();
        assert_eq!(path, dir.path().join("job_constructor_job1.json"));
        assert!(store.exists("job1").unwrap());

        let loaded = store.load("job1").unwrap().unwrap();
        assert_eq!(loaded, identity("job1"));
    }

    #[test]
    fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        let store = IdentityStore::new(dir.path());
        let path = store.save(&identity("job2")).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["secretToken"], "s3cr3t");
        assert_eq!(value["id"], "job2");
        assert_eq!(value["hpc"], "keeling_community");
        assert_eq!(value["maintainer"], "hello_world");
    }

    #[test]
    fn test_save_replaces_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let store = IdentityStore::new(dir.path());
        store.save(&identity("job5")).unwrap();

        let mut updated = identity("job5");
        updated.hpc = "other_hpc".to_string();
        store.save(&updated).unwrap();

        assert_eq!(store.load("job5").unwrap().unwrap().hpc, "other_hpc");
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["job_constructor_job5.json"]);
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = IdentityStore::new(dir.path());
        assert!(store.load("nothing").unwrap().is_none());
        assert!(!store.exists("nothing").unwrap());
    }

    #[test]
    fn test_load_malformed() {
        let dir = TempDir::new().unwrap();
        let store = IdentityStore::new(dir.path());
        fs::write(dir.path().join("job_constructor_bad.json"), "{not json").unwrap();
        assert!(matches!(store.load("bad"), Err(IdentityError::Json { .. })));
    }

    #[test]
    fn test_rejects_traversal_id() {
        let dir = TempDir::new().unwrap();
        let store = IdentityStore::new(dir.path());
        assert!(matches!(
            store.save(&identity("../escape")),
            Err(IdentityError::InvalidJobId(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", identity("job3"));
        assert!(!debug.contains("s3cr3t"));
        assert!(debug.contains("job3"));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = IdentityStore::new(dir.path());
        let path = store.save(&identity("job4")).unwrap();
        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
