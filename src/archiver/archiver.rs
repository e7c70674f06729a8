use std::collections::HashSet;
use std::sync::Arc;

use crate::archiver::database::{fingerprint_of, Db};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::key::Key;
use crate::core::stats::SessionStats;
use crate::core::types::FieldRef;
use crate::schema::schema::Schema;
use crate::session::controller::SessionController;
use crate::storage::data_file::{NoStriping, StripingHint};
use crate::toc::record::{Tag, TocRecord};

/// Canonical, order-independent string identity of a key, used only to
/// detect re-archiving the same logical key within one session
/// (spec.md §4.6 strict-duplicates mode). Not a fingerprint used
/// anywhere on disk.
fn canonical_key_string(key: &Key) -> String {
    let mut kws: Vec<&str> = key.keywords().collect();
    kws.sort_unstable();
    let mut out = String::new();
    for kw in kws {
        out.push_str(kw);
        out.push('=');
        out.push_str(key.get(kw).unwrap_or(""));
        out.push(';');
    }
    out
}

/// A write session against one or more databases under `config.root`,
/// spec.md §4.6: "An archiver session accumulates writes across
/// `archive()` calls and durably commits them on `flush()`."
///
/// Once `flush()` has partially failed, the session is poisoned:
/// further calls to either `archive()` or `flush()` fail fast rather
/// than risk silently committing an inconsistent TOC (spec.md §7).
pub struct Archiver {
    config: Config,
    schema: Arc<Schema>,
    databases: std::collections::HashMap<String, Db>,
    seen_keys: HashSet<String>,
    prev_key: Option<Key>,
    poisoned: bool,
    striping: Arc<dyn StripingHint>,
    controller: SessionController,
    pub stats: SessionStats,
}

impl Archiver {
    pub fn new(config: Config, schema: Arc<Schema>) -> Self {
        let controller = SessionController::from_config(&config);
        Archiver {
            config,
            schema,
            databases: std::collections::HashMap::new(),
            seen_keys: HashSet::new(),
            prev_key: None,
            poisoned: false,
            striping: Arc::new(NoStriping),
            controller,
            stats: SessionStats::default(),
        }
    }

    pub fn with_striping(mut self, striping: Arc<dyn StripingHint>) -> Self {
        self.striping = striping;
        self
    }

    /// Returns the previous key archived in this session, the hint
    /// `archive()` callers use to skip re-deriving an unchanged index
    /// key (spec.md §4.6).
    pub fn previous_key(&self) -> Option<&Key> {
        self.prev_key.as_ref()
    }

    pub fn archive(&mut self, key: Key, bytes: &[u8]) -> Result<()> {
        if self.poisoned {
            return Err(Error::new(ErrorKind::InvalidState, "archiver session is poisoned after a failed flush"));
        }

        let canonical = canonical_key_string(&key);
        if self.config.strict_duplicates && self.seen_keys.contains(&canonical) {
            return Err(Error::new(ErrorKind::DuplicateKey, format!("key already archived this session: {canonical}")));
        }

        let (db_key, idx_key, datum_key) = self.schema.decompose(&key)?;
        let db_fingerprint = fingerprint_of(&db_key);

        if !self.databases.contains_key(&db_fingerprint) {
            let db = Db::create_or_open(&self.config, Arc::clone(&self.schema), db_key)?;
            self.databases.insert(db_fingerprint.clone(), db);
        }
        let db = self.databases.get_mut(&db_fingerprint).unwrap();
        let idx = db.index_mut(idx_key)?;

        let data_path = db.layout.data_path(&idx.fingerprint);
        let handle = idx.data_handle_for(&db.layout, &self.striping)?;
        let (offset, length) = handle.append(bytes)?;

        let file_id = db.file_store.insert(&data_path)?;
        let datum_fingerprint = fingerprint_of(&datum_key);
        idx.btree.set(&datum_fingerprint, FieldRef::local(file_id, offset, length));
        idx.axis.observe(&datum_key);

        self.seen_keys.insert(canonical);
        self.stats.archived += 1;
        self.prev_key = Some(key);
        Ok(())
    }

    /// Durably commits every index touched this session: syncs data
    /// handles, rewrites B-tree pages, saves the file store, and
    /// appends one `TOC_INDEX` record per updated index under the
    /// database's exclusive lock. If any database fails partway
    /// through, the session is poisoned (spec.md §7) — callers must
    /// start a fresh `Archiver` rather than retry.
    pub fn flush(&mut self) -> Result<()> {
        if self.poisoned {
            return Err(Error::new(ErrorKind::InvalidState, "archiver session is poisoned after a failed flush"));
        }
        if let Err(e) = self.try_flush() {
            self.poisoned = true;
            return Err(e);
        }
        self.stats.flushes += 1;
        Ok(())
    }

    fn try_flush(&mut self) -> Result<()> {
        for db in self.databases.values_mut() {
            for idx in db.indexes.values_mut() {
                idx.flush(&db.layout, self.controller.lock_timeout())?;
            }
            db.file_store.save(&db.layout.filestore_path())?;

            for idx in db.indexes.values() {
                // metadata: index-key fingerprint, truncated to 32 bytes (spec.md §7).
                let mut metadata = [0u8; 32];
                let fp_bytes = idx.fingerprint.as_bytes();
                let n = fp_bytes.len().min(32);
                metadata[..n].copy_from_slice(&fp_bytes[..n]);

                // payload: index file path relative to the database directory, NUL-terminated (spec.md §7).
                let relative = db.layout.relative(&db.layout.index_path(&idx.fingerprint));
                let mut payload = relative.to_string_lossy().into_owned().into_bytes();
                payload.push(0);

                let record = TocRecord::new(Tag::Index, metadata, payload)?;
                db.toc.append(&record, self.controller.lock_timeout())?;
            }
        }
        Ok(())
    }
}

impl Drop for Archiver {
    fn drop(&mut self) {
        if !self.poisoned {
            let _ = self.flush();
        }
    }
}
