use std::path::PathBuf;

/// Outcome of a `PurgeVisitor` pass over one database directory.
#[derive(Debug, Clone, Default)]
pub struct PurgeReport {
    pub active: Vec<PathBuf>,
    pub duplicate: Vec<PathBuf>,
    pub orphan: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

impl PurgeReport {
    pub fn reclaimable_count(&self) -> usize {
        self.duplicate.len() + self.orphan.len()
    }
}

/// Outcome of a `WipeVisitor` pass over one database.
#[derive(Debug, Clone)]
pub struct WipeReport {
    pub database: PathBuf,
    pub files: Vec<PathBuf>,
    pub signature: String,
    pub deleted: bool,
}

/// Outcome of a `MoveVisitor` pass.
#[derive(Debug, Clone)]
pub struct MoveReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub moved_files: Vec<PathBuf>,
    pub source_deleted: bool,
}

/// Lightweight counters surfaced by `Archiver`/`Retriever` for
/// monitoring; not persisted.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub archived: u64,
    pub retrieved: u64,
    pub flushes: u64,
}
