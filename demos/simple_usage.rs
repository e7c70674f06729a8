//! Walks through a whole archive/flush/retrieve cycle against a small
//! in-memory schema, printing each step.

use std::sync::Arc;

use fieldcat::archiver::archiver::Archiver;
use fieldcat::core::config::Config;
use fieldcat::core::key::{Key, KeywordType, TypeRegistry};
use fieldcat::core::types::Request;
use fieldcat::retriever::retriever::Retriever;
use fieldcat::schema::schema::Schema;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("fieldcat demo\n");

    let dir = std::env::temp_dir().join(format!("fieldcat-demo-{}", std::process::id()));
    let config = Config::new(dir.clone());
    let schema = Arc::new(build_schema());

    println!("archiving 3 fields under class=od,stream=oper,expver=0001...");
    let mut archiver = Archiver::new(config.clone(), Arc::clone(&schema));
    for (date, param) in [("20240101", "129"), ("20240101", "130"), ("20240102", "129")] {
        let key = build_key(&schema.registry, date, param);
        archiver.archive(key, format!("payload for {date}/{param}").as_bytes())?;
    }
    archiver.flush()?;
    println!("  flushed {} writes\n", archiver.stats.archived);

    println!("retrieving param=129 across both dates...");
    let mut request = Request::new();
    request.set("class", vec!["od".to_string()]);
    request.set("stream", vec!["oper".to_string()]);
    request.set("expver", vec!["0001".to_string()]);
    request.set("date", vec!["20240101".to_string(), "20240102".to_string()]);
    request.set("param", vec!["129".to_string()]);

    let retriever = Retriever::new(config, schema);
    let locations = retriever.retrieve(&request, |_event| {})?;
    println!("  matched {} fields", locations.len());
    for location in &locations {
        println!("  {location:?}");
    }

    std::fs::remove_dir_all(&dir).ok();
    Ok(())
}

fn build_schema() -> Schema {
    use fieldcat::schema::matcher::Matcher;
    use fieldcat::schema::predicate::Predicate;
    use fieldcat::schema::rule::{Level, Rule};

    let mut registry = TypeRegistry::new();
    registry.register("date", KeywordType::Date);

    let datum = Rule::new(Level::Datum, vec![Predicate::new("param", Matcher::Any)], vec![]);
    let index = Rule::new(Level::Index, vec![Predicate::new("date", Matcher::Any)], vec![datum]);
    let database = Rule::new(
        Level::Database,
        vec![
            Predicate::new("class", Matcher::Any),
            Predicate::new("stream", Matcher::Any),
            Predicate::new("expver", Matcher::Value("0001".to_string())),
        ],
        vec![index],
    );
    Schema::new(vec![database], registry)
}

fn build_key(registry: &TypeRegistry, date: &str, param: &str) -> Key {
    let mut key = Key::new();
    key.set(registry, "class", "od").unwrap();
    key.set(registry, "stream", "oper").unwrap();
    key.set(registry, "expver", "0001").unwrap();
    key.set(registry, "date", date).unwrap();
    key.set_raw("param", param);
    key
}
