use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::key::Key;
use crate::filestore::FileStore;
use crate::index::axis::IndexAxis;
use crate::index::btree::BTreeIndex;
use crate::schema::schema::Schema;
use crate::storage::data_file::{DataHandle, HandleKind, StripingHint};
use crate::storage::layout::DatabaseLayout;
use crate::toc::log::TocHandler;
use crate::toc::record::{Tag, TocRecord};

/// A key's values concatenated in the order they were inserted, which
/// for a key built by `Rule::build_subkey` is exactly schema order —
/// so this doubles as the fingerprint used for directory names, TOC
/// payloads, and B-tree keys (spec.md §4.1).
pub fn fingerprint_of(key: &Key) -> String {
    let order: Vec<String> = key.keywords().map(String::from).collect();
    key.fingerprint(&order)
}

/// One index file within a database: its B-tree, its observed axis for
/// request pruning, and the data file(s) it has appended to this
/// session (spec.md §4.3/§4.6).
pub struct Index {
    pub key: Key,
    pub fingerprint: String,
    pub btree: BTreeIndex,
    pub axis: IndexAxis,
    pub data_handles: HashMap<String, DataHandle>,
}

impl Index {
    pub fn open(layout: &DatabaseLayout, key: Key, btree_page_size: usize) -> Result<Self> {
        let fingerprint = fingerprint_of(&key);
        let btree = BTreeIndex::preload(layout.index_path(&fingerprint), btree_page_size)?;
        let axis = IndexAxis::load(&layout.axis_path(&fingerprint))?;
        Ok(Index { key, fingerprint, btree, axis, data_handles: HashMap::new() })
    }

    pub fn flush(&mut self, layout: &DatabaseLayout, lock_timeout: std::time::Duration) -> Result<()> {
        for handle in self.data_handles.values_mut() {
            handle.sync()?;
        }
        self.btree.flush(lock_timeout)?;
        self.axis.save(&layout.axis_path(&self.fingerprint))?;
        Ok(())
    }

    pub fn data_handle_for(
        &mut self,
        layout: &DatabaseLayout,
        striping: &Arc<dyn StripingHint>,
    ) -> Result<&mut DataHandle> {
        let path = layout.data_path(&self.fingerprint);
        let key = path.to_string_lossy().to_string();
        if !self.data_handles.contains_key(&key) {
            let handle = DataHandle::create_for_append(path, HandleKind::Plain, striping)?;
            self.data_handles.insert(key.clone(), handle);
        }
        Ok(self.data_handles.get_mut(&key).unwrap())
    }
}

/// One open database directory: its schema, file store, TOC chain and
/// the indexes touched this session (spec.md §6).
pub struct Db {
    pub key: Key,
    pub fingerprint: String,
    pub layout: DatabaseLayout,
    pub toc: TocHandler,
    pub schema: Arc<Schema>,
    pub file_store: FileStore,
    pub indexes: HashMap<String, Index>,
    pub btree_page_size: usize,
}

impl Db {
    /// Creates the database if its TOC doesn't exist yet — appending
    /// `TOC_INIT` and freezing the schema to `schema_path()` — or opens
    /// it unchanged otherwise (spec.md §4.1 state machine: `Empty ->
    /// TOC_INIT -> Live`; `TOC_INIT` is appended exactly once, on the
    /// transition out of `Empty`, not on every open).
    pub fn create_or_open(config: &Config, schema: Arc<Schema>, key: Key) -> Result<Self> {
        let fingerprint = fingerprint_of(&key);
        let base_dir = config.root.join(&fingerprint);
        let is_new = !base_dir.join("toc").exists();
        let layout = DatabaseLayout::new(base_dir)?;
        let toc = TocHandler::new(layout.toc_path());
        let file_store = FileStore::load(layout.base_dir.clone(), &layout.filestore_path(), false)?;
        if is_new {
            let init = TocRecord::new(Tag::Init, [0u8; 32], Vec::new())?;
            toc.append(&init, config.lock_timeout)?;
            fs::write(layout.schema_path(), schema.to_text())?;
        }
        Ok(Db {
            key,
            fingerprint,
            layout,
            toc,
            schema,
            file_store,
            indexes: HashMap::new(),
            btree_page_size: config.btree_page_size,
        })
    }

    /// Opens a database for reading without creating it, spec.md §4.7:
    /// a request matching no existing database is `DatabaseNotFound`,
    /// not an empty result.
    pub fn open_existing(config: &Config, schema: Arc<Schema>, key: Key) -> Result<Self> {
        let fingerprint = fingerprint_of(&key);
        let base_dir = config.root.join(&fingerprint);
        let layout = DatabaseLayout::existing(base_dir);
        if !layout.exists() {
            return Err(crate::core::error::Error::new(
                crate::core::error::ErrorKind::DatabaseNotFound,
                format!("no database for key fingerprint '{fingerprint}'"),
            ));
        }
        let toc = TocHandler::new(layout.toc_path());
        let file_store = FileStore::load(layout.base_dir.clone(), &layout.filestore_path(), true)?;
        Ok(Db {
            key,
            fingerprint,
            layout,
            toc,
            schema,
            file_store,
            indexes: HashMap::new(),
            btree_page_size: config.btree_page_size,
        })
    }

    /// Distinct index fingerprints currently visible in this database,
    /// derived from its TOC rather than a directory listing (spec.md
    /// §9: index-level enumeration is TOC-driven, not filesystem-driven).
    ///
    /// Folds the whole chain in order: a `TOC_INDEX` record makes its
    /// fingerprint visible, a `TOC_CLEAR` record hides it again (most
    /// recent record for a given fingerprint wins, matching Purge's own
    /// "most recent wins across duplicate TOC_INDEX records" rule,
    /// spec.md §4.8), and any `TOC_WIPE` record empties the whole
    /// database — readers see nothing once it's been wiped, even before
    /// physical deletion runs (spec.md §7 "Wipe finality").
    pub fn known_index_fingerprints(&self) -> Result<Vec<String>> {
        let mut order = Vec::new();
        let mut visible: HashMap<String, bool> = HashMap::new();
        let mut wiped = false;

        for record in self.toc.iter()? {
            match record.tag {
                Tag::Index => {
                    let relative = String::from_utf8_lossy(&record.payload).trim_end_matches('\0').to_string();
                    let fp = std::path::Path::new(&relative)
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or(relative);
                    if !visible.contains_key(&fp) {
                        order.push(fp.clone());
                    }
                    visible.insert(fp, true);
                }
                Tag::Clear => {
                    let fp = String::from_utf8_lossy(&record.payload).trim_end_matches('\0').to_string();
                    visible.insert(fp, false);
                }
                Tag::Wipe => {
                    wiped = true;
                }
                _ => {}
            }
        }

        if wiped {
            return Ok(Vec::new());
        }
        Ok(order.into_iter().filter(|fp| visible.get(fp).copied().unwrap_or(false)).collect())
    }

    pub fn index_mut(&mut self, idx_key: Key) -> Result<&mut Index> {
        let fingerprint = fingerprint_of(&idx_key);
        if !self.indexes.contains_key(&fingerprint) {
            let index = Index::open(&self.layout, idx_key, self.btree_page_size)?;
            self.indexes.insert(fingerprint.clone(), index);
        }
        Ok(self.indexes.get_mut(&fingerprint).unwrap())
    }
}
