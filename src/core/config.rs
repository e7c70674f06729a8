use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::Result;

/// Default comma-separated auxiliary extension list when
/// `FDB_AUX_EXTENSIONS` is not set in the environment.
pub const DEFAULT_AUX_EXTENSIONS: &str = "gribjump";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory under which per-database directories are created.
    pub root: PathBuf,

    /// Advisory lock acquisition deadline (spec default: 60s).
    pub lock_timeout: Duration,

    /// When set, re-archiving a non-distinct key within a session fails
    /// with `DuplicateKey` instead of silently overwriting.
    pub strict_duplicates: bool,

    /// Registered auxiliary file extensions. Opaque to the core engine;
    /// carried only so callers can discover which sidecar files belong
    /// to a data file (e.g. `gribjump`).
    pub aux_extensions: Vec<String>,

    /// B-tree page size in bytes. Fixed at 65536 by the spec; kept
    /// configurable only for tests that want smaller pages.
    pub btree_page_size: usize,

    /// Grace period `WipeVisitor` waits before physically deleting files.
    pub wipe_grace_period: Duration,
}

impl Config {
    /// Build a `Config` rooted at `root`, honouring `FDB_AUX_EXTENSIONS`
    /// from the environment the way the real catalogue does.
    pub fn new(root: PathBuf) -> Self {
        let aux_extensions = std::env::var("FDB_AUX_EXTENSIONS")
            .unwrap_or_else(|_| DEFAULT_AUX_EXTENSIONS.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Config {
            root,
            lock_timeout: Duration::from_secs(60),
            strict_duplicates: false,
            aux_extensions,
            btree_page_size: 65536,
            wipe_grace_period: Duration::from_secs(0),
        }
    }

    /// Persist this configuration next to the catalogue root, so a
    /// second process pointed at the same `root` picks up the same
    /// lock timeout and duplicate-handling policy.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serialize(self).map_err(crate::core::error::Error::from)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let config = bincode::deserialize(&bytes).map_err(crate::core::error::Error::from)?;
        Ok(config)
    }
}
