//! Demonstrates the maintenance visitors: archive a field, then run
//! `PurgeVisitor` over the resulting database to show how it
//! classifies active vs. orphaned data files.

use std::sync::Arc;

use fieldcat::archiver::archiver::Archiver;
use fieldcat::archiver::database::Db;
use fieldcat::core::config::Config;
use fieldcat::core::key::{Key, TypeRegistry};
use fieldcat::schema::matcher::Matcher;
use fieldcat::schema::predicate::Predicate;
use fieldcat::schema::rule::{Level, Rule};
use fieldcat::schema::schema::Schema;
use fieldcat::visitors::purge::PurgeVisitor;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join(format!("fieldcat-purge-demo-{}", std::process::id()));
    let config = Config::new(dir.clone());

    let registry = TypeRegistry::new();
    let datum = Rule::new(Level::Datum, vec![Predicate::new("param", Matcher::Any)], vec![]);
    let db_rule = Rule::new(Level::Database, vec![Predicate::new("class", Matcher::Any)], vec![datum]);
    let schema = Arc::new(Schema::new(vec![db_rule], registry));

    let mut key = Key::new();
    key.set_raw("class", "od");
    key.set_raw("param", "129");

    let mut archiver = Archiver::new(config.clone(), Arc::clone(&schema));
    archiver.archive(key.clone(), b"payload")?;
    archiver.flush()?;
    drop(archiver);

    // A file the engine never recorded, left behind by some other process.
    let mut db_key = Key::new();
    db_key.set_raw("class", "od");
    let probe = Db::open_existing(&config, Arc::clone(&schema), db_key)?;
    std::fs::write(probe.layout.base_dir.join("stray.data"), b"orphan")?;

    let report = PurgeVisitor::run(&probe, false)?;
    println!("active:    {}", report.active.len());
    println!("duplicate: {}", report.duplicate.len());
    println!("orphan:    {}", report.orphan.len());
    println!("reclaimable bytes would free {} file(s)", report.reclaimable_count());

    std::fs::remove_dir_all(&dir).ok();
    Ok(())
}
