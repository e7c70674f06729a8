use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use crate::archiver::database::Db;
use crate::core::error::Result;
use crate::core::stats::PurgeReport;
use crate::index::btree::BTreeIndex;

/// Reclaims space from superseded or stray data files, spec.md §4.8.
/// A file is:
/// - `active` if the database's current `FileStore` maps an id to it
///   *and* at least one B-tree entry still references that id,
/// - `duplicate` if the `FileStore` knows it but no current B-tree
///   entry references it any more (superseded by a later write that
///   reused the same datum key against a fresh data file),
/// - `orphan` if it sits in the database directory but the
///   `FileStore` never recorded it at all (e.g. a file left behind by
///   a process that crashed before committing its `FileStore`).
pub struct PurgeVisitor;

impl PurgeVisitor {
    pub fn run(db: &Db, doit: bool) -> Result<PurgeReport> {
        let mut referenced_ids: HashSet<u32> = HashSet::new();
        for index_fingerprint in db.known_index_fingerprints()? {
            let btree = BTreeIndex::preload(db.layout.index_path(&index_fingerprint), db.btree_page_size)?;
            btree.visit(|_, record| {
                referenced_ids.insert(record.file_id);
            });
        }

        let mut report = PurgeReport::default();
        let mut known_paths: HashSet<PathBuf> = HashSet::new();

        for id in db.file_store.ids() {
            let Some(path) = db.file_store.get(id) else { continue };
            known_paths.insert(path.clone());
            if referenced_ids.contains(&id) {
                report.active.push(path);
            } else {
                report.duplicate.push(path);
            }
        }

        if db.layout.base_dir.exists() {
            for entry in fs::read_dir(&db.layout.base_dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("data") {
                    continue;
                }
                if !known_paths.contains(&path) {
                    report.orphan.push(path);
                }
            }
        }

        if doit {
            for path in report.duplicate.iter().chain(report.orphan.iter()) {
                fs::remove_file(path)?;
                report.deleted.push(path.clone());
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::key::{Key, TypeRegistry};
    use crate::schema::matcher::Matcher;
    use crate::schema::predicate::Predicate;
    use crate::schema::rule::{Level, Rule};
    use crate::schema::schema::Schema;
    use std::sync::Arc;

    fn test_schema() -> Arc<Schema> {
        let registry = TypeRegistry::new();
        let datum = Rule::new(Level::Datum, vec![Predicate::new("param", Matcher::Any)], vec![]);
        let idx = Rule::new(Level::Index, vec![Predicate::new("date", Matcher::Any)], vec![datum]);
        let db_rule = Rule::new(Level::Database, vec![Predicate::new("class", Matcher::Any)], vec![idx]);
        Arc::new(Schema::new(vec![db_rule], registry))
    }

    #[test]
    fn orphan_file_not_in_filestore_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf());
        let schema = test_schema();
        let mut key = Key::new();
        key.set_raw("class", "od");
        let db = Db::create_or_open(&config, schema, key).unwrap();

        std::fs::write(db.layout.base_dir.join("stray.data"), b"junk").unwrap();

        let report = PurgeVisitor::run(&db, false).unwrap();
        assert_eq!(report.orphan.len(), 1);
        assert!(report.active.is_empty());
        assert!(report.duplicate.is_empty());
    }
}
