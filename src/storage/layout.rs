use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::Result;

/// Directory layout of a single database, spec.md §6:
/// `<db>/toc`, `<db>/schema`, `<db>/<idxKey>.index`, `<db>/<dataKey>.data`,
/// `<db>/<sub>.toc`.
#[derive(Debug, Clone)]
pub struct DatabaseLayout {
    pub base_dir: PathBuf,
}

impl DatabaseLayout {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(DatabaseLayout { base_dir })
    }

    pub fn existing(base_dir: PathBuf) -> Self {
        DatabaseLayout { base_dir }
    }

    pub fn exists(&self) -> bool {
        self.toc_path().exists()
    }

    pub fn toc_path(&self) -> PathBuf {
        self.base_dir.join("toc")
    }

    pub fn schema_path(&self) -> PathBuf {
        self.base_dir.join("schema")
    }

    pub fn filestore_path(&self) -> PathBuf {
        self.base_dir.join("filestore")
    }

    pub fn index_path(&self, idx_fingerprint: &str) -> PathBuf {
        self.base_dir.join(format!("{}.index", sanitize(idx_fingerprint)))
    }

    pub fn data_path(&self, idx_fingerprint: &str) -> PathBuf {
        self.base_dir.join(format!("{}.data", sanitize(idx_fingerprint)))
    }

    pub fn axis_path(&self, idx_fingerprint: &str) -> PathBuf {
        self.base_dir.join(format!("{}.axis", sanitize(idx_fingerprint)))
    }

    pub fn sub_toc_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{}.toc", sanitize(name)))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }

    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.base_dir).map(Path::to_path_buf).unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Fingerprints are `:`-separated segments; `:` is kept as-is (a valid
/// POSIX filename character) so a fingerprint round-trips exactly
/// through a file name — `known_index_fingerprints` recovers it with
/// `file_stem()` rather than an unsanitize step. Anything else unsafe
/// in a path component still gets replaced.
fn sanitize(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':' || c == '.' { c } else { '_' })
        .collect()
}
