use std::fs;

use crate::archiver::database::Db;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::stats::WipeReport;
use crate::toc::record::{Tag, TocRecord};
use crate::visitors::signature;

/// Retires an entire database: every file it owns is listed, signed,
/// and (after the configured grace period has elapsed and `doit` is
/// set) deleted, spec.md §4.8.
pub struct WipeVisitor;

impl WipeVisitor {
    /// `secret` signs the resulting manifest; see `visitors::signature`
    /// for why this is a placeholder, not a real MAC.
    pub fn run(db: &Db, config: &Config, doit: bool, secret: &str) -> Result<WipeReport> {
        let mut files = Vec::new();
        for id in db.file_store.ids() {
            if let Some(path) = db.file_store.get(id) {
                files.push(path);
            }
        }
        files.push(db.layout.toc_path());
        files.push(db.layout.filestore_path());

        let uris: Vec<String> = files.iter().map(|p| p.to_string_lossy().to_string()).collect();
        let signature = signature::compute(&uris, secret);

        let mut metadata = [0u8; 32];
        let grace_secs = config.wipe_grace_period.as_secs().min(u32::MAX as u64) as u32;
        metadata[0..4].copy_from_slice(&grace_secs.to_le_bytes());
        let record = TocRecord::new(Tag::Wipe, metadata, signature.as_bytes().to_vec())?;
        db.toc.append(&record, config.lock_timeout)?;

        let mut deleted = false;
        if doit {
            if config.wipe_grace_period.is_zero() {
                for path in &files {
                    if path.exists() {
                        fs::remove_file(path)?;
                    }
                }
                if db.layout.base_dir.exists() {
                    fs::remove_dir_all(&db.layout.base_dir)?;
                }
                deleted = true;
            } else {
                return Err(crate::core::error::Error::new(
                    crate::core::error::ErrorKind::InvalidState,
                    "wipe grace period has not elapsed; record the TOC_WIPE and retry after it passes",
                ));
            }
        }

        Ok(WipeReport { database: db.layout.base_dir.clone(), files, signature, deleted })
    }
}
