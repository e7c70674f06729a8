use std::sync::Arc;

use fieldcat::archiver::archiver::Archiver;
use fieldcat::core::config::Config;
use fieldcat::core::key::{Key, KeywordType, TypeRegistry};
use fieldcat::core::types::Request;
use fieldcat::retriever::retriever::Retriever;
use fieldcat::schema::matcher::Matcher;
use fieldcat::schema::predicate::Predicate;
use fieldcat::schema::rule::{Level, Rule};
use fieldcat::schema::schema::Schema;
use fieldcat::visitors::purge::PurgeVisitor;

fn schema() -> Arc<Schema> {
    let mut registry = TypeRegistry::new();
    registry.register("date", KeywordType::Date);
    let datum = Rule::new(Level::Datum, vec![Predicate::new("param", Matcher::Any)], vec![]);
    let index = Rule::new(Level::Index, vec![Predicate::new("date", Matcher::Any)], vec![datum]);
    let database = Rule::new(
        Level::Database,
        vec![Predicate::new("class", Matcher::Any), Predicate::new("stream", Matcher::Any)],
        vec![index],
    );
    Arc::new(Schema::new(vec![database], registry))
}

fn key(registry: &TypeRegistry, date: &str, param: &str) -> Key {
    let mut k = Key::new();
    k.set(registry, "class", "od").unwrap();
    k.set(registry, "stream", "oper").unwrap();
    k.set(registry, "date", date).unwrap();
    k.set_raw("param", param);
    k
}

#[test]
fn archive_flush_then_retrieve_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::new(dir.path().to_path_buf());
    let schema = schema();

    let mut archiver = Archiver::new(config.clone(), Arc::clone(&schema));
    archiver.archive(key(&schema.registry, "20240101", "129"), b"field-a").unwrap();
    archiver.archive(key(&schema.registry, "20240101", "130"), b"field-b").unwrap();
    archiver.archive(key(&schema.registry, "20240102", "129"), b"field-c").unwrap();
    archiver.flush().unwrap();
    drop(archiver);

    let retriever = Retriever::new(config, schema);
    let mut request = Request::new();
    request.set("class", vec!["od".to_string()]);
    request.set("stream", vec!["oper".to_string()]);
    request.set("date", vec!["20240101".to_string(), "20240102".to_string()]);
    request.set("param", vec!["129".to_string()]);

    let mut scanned = 0;
    let locations = retriever
        .retrieve(&request, |_event| {
            scanned += 1;
        })
        .unwrap();

    assert_eq!(locations.len(), 2);
    assert!(scanned > 0);
}

#[test]
fn retrieving_an_unknown_database_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::new(dir.path().to_path_buf());
    let schema = schema();
    let retriever = Retriever::new(config, Arc::clone(&schema));

    let mut request = Request::new();
    request.set("class", vec!["nonexistent".to_string()]);
    request.set("stream", vec!["oper".to_string()]);
    request.set("date", vec!["20240101".to_string()]);
    request.set("param", vec!["129".to_string()]);

    let locations = retriever.retrieve(&request, |_| {}).unwrap();
    assert!(locations.is_empty());
}

#[test]
fn purge_preserves_every_actively_referenced_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::new(dir.path().to_path_buf());
    let schema = schema();

    let mut archiver = Archiver::new(config.clone(), Arc::clone(&schema));
    archiver.archive(key(&schema.registry, "20240101", "129"), b"field-a").unwrap();
    archiver.flush().unwrap();
    drop(archiver);

    let mut db_key = Key::new();
    db_key.set_raw("class", "od");
    db_key.set_raw("stream", "oper");
    let db = fieldcat::archiver::database::Db::open_existing(&config, schema, db_key).unwrap();

    let report = PurgeVisitor::run(&db, false).unwrap();
    assert_eq!(report.active.len(), 1);
    assert!(report.duplicate.is_empty());
    assert!(report.orphan.is_empty());
}
