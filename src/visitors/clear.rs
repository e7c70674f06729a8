use std::time::Duration;

use crate::archiver::database::Db;
use crate::core::error::Result;
use crate::toc::record::{Tag, TocRecord};

/// Logically hides an index without touching its data or B-tree files,
/// spec.md §4.8/§7: `Live -> TOC_CLEAR(idx) -> Live`. The index's data
/// survives on disk — `PurgeVisitor`/`WipeVisitor` decide its fate —
/// only `known_index_fingerprints` (and therefore retrieval) stops
/// seeing it once this record lands.
pub struct ClearVisitor;

impl ClearVisitor {
    pub fn run(db: &Db, idx_fingerprint: &str, lock_timeout: Duration) -> Result<()> {
        let metadata = [0u8; 32];
        let record = TocRecord::new(Tag::Clear, metadata, idx_fingerprint.as_bytes().to_vec())?;
        db.toc.append(&record, lock_timeout)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archiver::archiver::Archiver;
    use crate::core::config::Config;
    use crate::core::key::{Key, KeywordType, TypeRegistry};
    use crate::schema::matcher::Matcher;
    use crate::schema::predicate::Predicate;
    use crate::schema::rule::{Level, Rule};
    use crate::schema::schema::Schema;
    use std::sync::Arc;

    fn test_schema() -> Arc<Schema> {
        let mut registry = TypeRegistry::new();
        registry.register("date", KeywordType::Date);
        let datum = Rule::new(Level::Datum, vec![Predicate::new("param", Matcher::Any)], vec![]);
        let idx = Rule::new(Level::Index, vec![Predicate::new("date", Matcher::Any)], vec![datum]);
        let db_rule = Rule::new(Level::Database, vec![Predicate::new("class", Matcher::Any)], vec![idx]);
        Arc::new(Schema::new(vec![db_rule], registry))
    }

    #[test]
    fn cleared_index_is_no_longer_visible() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf());
        let schema = test_schema();

        let mut archiver = Archiver::new(config.clone(), Arc::clone(&schema));
        let mut key = Key::new();
        key.set_raw("class", "od");
        key.set(&schema.registry, "date", "20240101").unwrap();
        key.set_raw("param", "129");
        archiver.archive(key, b"payload").unwrap();
        archiver.flush().unwrap();
        drop(archiver);

        let mut db_key = Key::new();
        db_key.set_raw("class", "od");
        let db = crate::archiver::database::Db::open_existing(&config, Arc::clone(&schema), db_key).unwrap();
        let visible_before = db.known_index_fingerprints().unwrap();
        assert_eq!(visible_before.len(), 1);

        ClearVisitor::run(&db, &visible_before[0], std::time::Duration::from_millis(100)).unwrap();
        let visible_after = db.known_index_fingerprints().unwrap();
        assert!(visible_after.is_empty());
    }
}
