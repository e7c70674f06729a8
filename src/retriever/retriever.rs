use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::archiver::database::{fingerprint_of, Db};
use crate::core::config::Config;
use crate::core::error::{ErrorKind, Result};
use crate::core::key::Key;
use crate::core::types::{split_remote_path, FieldLocation, Request};
use crate::schema::rule::Rule;
use crate::schema::schema::Schema;
use crate::session::controller::SessionController;

/// Progress callback, spec.md §4.7: callers observing retrieval may
/// want to react as each index is scanned or field resolved (e.g. the
/// wind-component conversion notifier the original system drives off
/// of retrieved `u`/`v` pairs). The core engine itself does no such
/// conversion; it only reports what it found.
pub enum RetrievalEvent<'a> {
    IndexScanned { db_fingerprint: &'a str, index_fingerprint: &'a str },
    FieldResolved { location: &'a FieldLocation },
}

const DB_CACHE_CAPACITY: usize = 64;

/// Read path over one or more databases under `config.root`, spec.md
/// §4.7. Keeps a small LRU of recently-opened databases open across
/// calls, grounded on the teacher's query-result cache.
pub struct Retriever {
    config: Config,
    schema: Arc<Schema>,
    db_cache: Mutex<LruCache<String, Arc<Db>>>,
    controller: SessionController,
}

impl Retriever {
    pub fn new(config: Config, schema: Arc<Schema>) -> Self {
        let controller = SessionController::from_config(&config);
        Retriever {
            config,
            schema,
            db_cache: Mutex::new(LruCache::new(std::num::NonZeroUsize::new(DB_CACHE_CAPACITY).unwrap())),
            controller,
        }
    }

    /// A clonable handle another thread can use to cancel an
    /// in-progress `retrieve()` call between index boundaries.
    pub fn cancel_handle(&self) -> std::sync::Arc<std::sync::atomic::AtomicBool> {
        self.controller.cancel_handle()
    }

    pub fn retrieve(&self, request: &Request, mut notifier: impl FnMut(RetrievalEvent)) -> Result<Vec<FieldLocation>> {
        let expanded = self.schema.expand(request)?;
        let mut out = Vec::new();

        for candidate in &expanded {
            self.controller.check()?;
            let db = match self.open_db(candidate.db_key.clone()) {
                Ok(db) => db,
                Err(e) if e.kind == ErrorKind::DatabaseNotFound => continue,
                Err(e) => return Err(e),
            };

            for index_fingerprint in db.known_index_fingerprints()? {
                self.controller.check()?;
                let Some(idx_key) = reconstruct_key(&candidate.idx_rule, &index_fingerprint) else { continue };
                if !candidate.idx_rule.matches(&idx_key) {
                    continue;
                }
                if !candidate.idx_rule.compatible_with_request(|kw| request.get(kw).map(|v| v.to_vec())) {
                    continue;
                }
                notifier(RetrievalEvent::IndexScanned { db_fingerprint: &db.fingerprint, index_fingerprint: &index_fingerprint });

                let index_path = db.layout.index_path(&index_fingerprint);
                let axis_path = db.layout.axis_path(&index_fingerprint);
                let btree = crate::index::btree::BTreeIndex::preload(index_path, db.btree_page_size)?;
                let axis = crate::index::axis::IndexAxis::load(&axis_path)?;

                for datum_rule in &candidate.idx_rule.children {
                    if !datum_rule.compatible_with_request(|kw| request.get(kw).map(|v| v.to_vec())) {
                        continue;
                    }
                    let datum_keys = Schema::cartesian(datum_rule, request, Some(axis.as_map()));
                    for datum_key in datum_keys {
                        let fingerprint = fingerprint_of(&datum_key);
                        let Some(field_ref) = btree.get(&fingerprint) else { continue };
                        let Some(stored) = db.file_store.get_raw(field_ref.file_id) else { continue };
                        let location = resolve_location(stored, field_ref.tag(), field_ref.offset, field_ref.length)?;
                        notifier(RetrievalEvent::FieldResolved { location: &location });
                        out.push(location);
                    }
                }
            }
        }

        Ok(out)
    }

    fn open_db(&self, db_key: Key) -> Result<Arc<Db>> {
        let fingerprint = fingerprint_of(&db_key);
        if let Some(hit) = self.db_cache.lock().get(&fingerprint) {
            return Ok(Arc::clone(hit));
        }
        let db = Arc::new(Db::open_existing(&self.config, Arc::clone(&self.schema), db_key)?);
        self.db_cache.lock().put(fingerprint, Arc::clone(&db));
        Ok(db)
    }
}

fn resolve_location(stored: &str, tag: u8, offset: u64, length: u64) -> Result<FieldLocation> {
    const TAG_REMOTE: u8 = 1;
    const TAG_ADOPTED_FOREIGN: u8 = 2;
    match tag {
        t if t == TAG_REMOTE => {
            let (host, port, path) = split_remote_path(stored)?;
            Ok(FieldLocation::Remote { host, port, path, offset, length })
        }
        t if t == TAG_ADOPTED_FOREIGN => Ok(FieldLocation::AdoptedForeign { path: stored.to_string(), offset, length }),
        _ => Ok(FieldLocation::Local { path: stored.to_string(), offset, length }),
    }
}

/// Rebuild a `Key` from a schema-order fingerprint string, the inverse
/// of `Key::fingerprint` for a rule whose predicate order is known.
/// Fingerprints are `value:` segments in `rule.order()` order, so this
/// only round-trips correctly when values don't themselves contain
/// `:` — true for every keyword type this engine normalises.
fn reconstruct_key(rule: &Rule, fingerprint: &str) -> Option<Key> {
    let order = rule.order();
    let parts: Vec<&str> = fingerprint.split(':').collect();
    if parts.len() < order.len() {
        return None;
    }
    let mut key = Key::new();
    for (kw, value) in order.iter().zip(parts.iter()) {
        if !value.is_empty() {
            key.set_raw(kw.clone(), value.to_string());
        }
    }
    Some(key)
}
