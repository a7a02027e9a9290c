//! Executable folder packaging
//!
//! Stages files under normalized relative paths and produces a single
//! archive blob for upload. The archive is an uncompressed tar with entries
//! sorted by path and normalized headers (mtime, uid and gid zeroed), so the
//! same staged content always yields the same bytes.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tar::{Builder, Header};
use walkdir::WalkDir;

/// Errors for archiving operations
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Invalid archive path {path:?}: {reason}")]
    InvalidPath { path: PathBuf, reason: &'static str },

    #[error("Archive size {actual_bytes} exceeds limit {limit_bytes}")]
    SizeExceeded {
        /// The actual archive size in bytes
        actual_bytes: u64,
        /// The configured limit in bytes
        limit_bytes: u64,
    },
}

#[derive(Debug, Clone)]
struct StagedFile {
    contents: Vec<u8>,
    executable: bool,
}

/// In-memory archive builder: directory in, single blob out.
#[derive(Debug, Default)]
pub struct Archiver {
    /// Staged files keyed by normalized path; a later append shadows an earlier one
    entries: BTreeMap<String, StagedFile>,
    /// Maximum archive size in bytes (None = no limit)
    max_bytes: Option<u64>,
}

impl Archiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum archive size in bytes
    ///
    /// If the archive exceeds this limit, `read()` returns
    /// `BundleError::SizeExceeded`. A value of 0 means no limit.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = if max_bytes > 0 { Some(max_bytes) } else { None };
        self
    }

    /// Walk `dir` (following symbolic links) and stage every regular file
    /// under its path relative to `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, BundleError> {
        let mut archiver = Self::new();
        archiver.append_dir(dir)?;
        Ok(archiver)
    }

    /// Stage one file's content.
    pub fn append(&mut self, path: impl AsRef<Path>, contents: Vec<u8>) -> Result<(), BundleError> {
        self.stage(path.as_ref(), contents, false)
    }

    /// Stage one file's content with the executable bit set in the archive.
    pub fn append_executable(
        &mut self,
        path: impl AsRef<Path>,
        contents: Vec<u8>,
    ) -> Result<(), BundleError> {
        self.stage(path.as_ref(), contents, true)
    }

    fn stage(&mut self, path: &Path, contents: Vec<u8>, executable: bool) -> Result<(), BundleError> {
        let key = normalize_path(path)?;
        self.entries.insert(key, StagedFile { contents, executable });
        Ok(())
    }

    /// Walk `dir` and stage its files, following symbolic links.
    pub fn append_dir(&mut self, dir: &Path) -> Result<(), BundleError> {
        if !dir.is_dir() {
            return Err(BundleError::NotADirectory(dir.to_path_buf()));
        }

        for entry in WalkDir::new(dir)
            .follow_links(true)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        {
            let entry = entry?;
            // With follow_links the reported type is the link target's type
            if !entry.file_type().is_file() {
                continue;
            }

            let rel_path = entry
                .path()
                .strip_prefix(dir)
                .map_err(|_| BundleError::InvalidPath {
                    path: entry.path().to_path_buf(),
                    reason: "outside of walked folder",
                })?;

            let contents = fs::read(entry.path())?;
            let executable = is_executable(entry.path());
            self.stage(rel_path, contents, executable)?;
        }

        Ok(())
    }

    /// Number of staged files
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Staged paths in archive order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Produce the archive bytes.
    pub fn read(&self) -> Result<Vec<u8>, BundleError> {
        let mut builder = Builder::new(Vec::new());

        for (path, file) in &self.entries {
            let mut header = Header::new_gnu();
            header.set_size(file.contents.len() as u64);
            header.set_mtime(0);
            header.set_uid(0);
            header.set_gid(0);
            header.set_mode(if file.executable { 0o755 } else { 0o644 });
            header.set_entry_type(tar::EntryType::Regular);
            builder.append_data(&mut header, path, file.contents.as_slice())?;
        }

        let bytes = builder.into_inner()?;

        if let Some(limit) = self.max_bytes {
            let actual = bytes.len() as u64;
            if actual > limit {
                return Err(BundleError::SizeExceeded {
                    actual_bytes: actual,
                    limit_bytes: limit,
                });
            }
        }

        Ok(bytes)
    }
}

/// Normalize a relative path to forward-slash form.
///
/// `.` components are dropped; absolute paths, parent components and empty
/// paths are rejected.
pub fn normalize_path(path: &Path) -> Result<String, BundleError> {
    let invalid = |reason| BundleError::InvalidPath {
        path: path.to_path_buf(),
        reason,
    };

    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| invalid("not valid UTF-8"))?;
                parts.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir => return Err(invalid("parent directory component")),
            Component::RootDir | Component::Prefix(_) => return Err(invalid("absolute path")),
        }
    }

    if parts.is_empty() {
        return Err(invalid("empty path"));
    }
    Ok(parts.join("/"))
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = fs::metadata(path) {
            return metadata.permissions().mode() & 0o111 != 0;
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;

    fn unpack(bytes: &[u8]) -> BTreeMap<String, Vec<u8>> {
        let mut archive = tar::Archive::new(Cursor::new(bytes));
        let mut files = BTreeMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().to_string();
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).unwrap();
            files.insert(path, contents);
        }
        files
    }

    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("job.json"), "{\"name\":\"hello\"}").unwrap();
        fs::write(dir.path().join("main.py"), "print('hi')").unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/util.py"), "x = 1").unwrap();
        dir
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("a/b.txt")).unwrap(), "a/b.txt");
        assert_eq!(normalize_path(Path::new("./a/./b.txt")).unwrap(), "a/b.txt");
        assert!(normalize_path(Path::new("../escape")).is_err());
        assert!(normalize_path(Path::new("a/../../b")).is_err());
        assert!(normalize_path(Path::new("/etc/passwd")).is_err());
        assert!(normalize_path(Path::new("")).is_err());
        assert!(normalize_path(Path::new(".")).is_err());
    }

    #[test]
    fn test_append_and_read() {
        let mut archiver = Archiver::new();
        archiver.append("b.txt", b"bee".to_vec()).unwrap();
        archiver.append("dir/a.txt", b"ay".to_vec()).unwrap();

        let files = unpack(&archiver.read().unwrap());
        assert_eq!(files.len(), 2);
        assert_eq!(files["b.txt"], b"bee");
        assert_eq!(files["dir/a.txt"], b"ay");
    }

    #[test]
    fn test_later_append_shadows_earlier() {
        let mut archiver = Archiver::new();
        archiver.append("a.txt", b"first".to_vec()).unwrap();
        archiver.append("./a.txt", b"second".to_vec()).unwrap();

        assert_eq!(archiver.len(), 1);
        let files = unpack(&archiver.read().unwrap());
        assert_eq!(files["a.txt"], b"second");
    }

    #[test]
    fn test_rejects_parent_component() {
        let mut archiver = Archiver::new();
        let err = archiver.append("../outside", vec![]).unwrap_err();
        assert!(matches!(err, BundleError::InvalidPath { .. }));
        assert!(archiver.is_empty());
    }

    #[test]
    fn test_dir_roundtrip() {
        let dir = create_test_dir();
        let archiver = Archiver::from_dir(dir.path()).unwrap();

        let paths: Vec<_> = archiver.paths().collect();
        assert_eq!(paths, vec!["job.json", "lib/util.py", "main.py"]);

        let files = unpack(&archiver.read().unwrap());
        assert_eq!(files["job.json"], b"{\"name\":\"hello\"}");
        assert_eq!(files["lib/util.py"], b"x = 1");
        assert_eq!(files["main.py"], b"print('hi')");
    }

    #[test]
    fn test_deterministic_bytes() {
        let dir = create_test_dir();
        let a = Archiver::from_dir(dir.path()).unwrap().read().unwrap();
        let b = Archiver::from_dir(dir.path()).unwrap().read().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_canonical_headers() {
        let dir = create_test_dir();
        let bytes = Archiver::from_dir(dir.path()).unwrap().read().unwrap();

        let mut archive = tar::Archive::new(Cursor::new(&bytes));
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            let header = entry.header();
            assert_eq!(header.mtime().unwrap(), 0);
            assert_eq!(header.uid().unwrap(), 0);
            assert_eq!(header.gid().unwrap(), 0);
            let mode = header.mode().unwrap();
            assert!(mode == 0o644 || mode == 0o755, "unexpected mode {:o}", mode);
        }
    }

    #[test]
    fn test_missing_dir_rejected() {
        let dir = TempDir::new().unwrap();
        let err = Archiver::from_dir(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, BundleError::NotADirectory(_)));
    }

    #[test]
    fn test_size_limit_enforced() {
        let dir = create_test_dir();
        let actual = Archiver::from_dir(dir.path()).unwrap().read().unwrap().len() as u64;

        let mut limited = Archiver::new().with_max_bytes(actual - 1);
        limited.append_dir(dir.path()).unwrap();
        match limited.read().unwrap_err() {
            BundleError::SizeExceeded {
                actual_bytes,
                limit_bytes,
            } => {
                assert_eq!(actual_bytes, actual);
                assert_eq!(limit_bytes, actual - 1);
            }
            other => panic!("Expected SizeExceeded, got {:?}", other),
        }

        let mut exact = Archiver::new().with_max_bytes(actual);
        exact.append_dir(dir.path()).unwrap();
        assert!(exact.read().is_ok());
    }

    #[cfg(unix)]
    mod symlink_tests {
        use super::*;
        use std::os::unix::fs::symlink;

        #[test]
        fn test_symlinked_subtree_included() {
            let outside = TempDir::new().unwrap();
            fs::create_dir(outside.path().join("shared")).unwrap();
            fs::write(outside.path().join("shared/data.csv"), "a,b\n1,2\n").unwrap();

            let dir = create_test_dir();
            symlink(outside.path().join("shared"), dir.path().join("linked")).unwrap();

            let archiver = Archiver::from_dir(dir.path()).unwrap();
            let files = unpack(&archiver.read().unwrap());

            assert_eq!(files["linked/data.csv"], b"a,b\n1,2\n");
            assert_eq!(files["main.py"], b"print('hi')");
        }

        #[test]
        fn test_symlinked_file_dereferenced() {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("target.txt"), "target content").unwrap();
            symlink("target.txt", dir.path().join("link.txt")).unwrap();

            let files = unpack(&Archiver::from_dir(dir.path()).unwrap().read().unwrap());
            assert_eq!(files["link.txt"], b"target content");
            assert_eq!(files["target.txt"], b"target content");
        }

        #[test]
        fn test_executable_bit_preserved() {
            use std::os::unix::fs::PermissionsExt;

            let dir = TempDir::new().unwrap();
            let script = dir.path().join("run.sh");
            fs::write(&script, "#!/bin/sh\necho hi\n").unwrap();
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

            let bytes = Archiver::from_dir(dir.path()).unwrap().read().unwrap();
            let mut archive = tar::Archive::new(Cursor::new(&bytes));
            let entry = archive.entries().unwrap().next().unwrap().unwrap();
            assert_eq!(entry.header().mode().unwrap(), 0o755);
        }
    }
}
