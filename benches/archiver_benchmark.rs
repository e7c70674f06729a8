use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use fieldcat::archiver::archiver::Archiver;
use fieldcat::core::config::Config;
use fieldcat::core::key::{Key, KeywordType, TypeRegistry};
use fieldcat::schema::matcher::Matcher;
use fieldcat::schema::predicate::Predicate;
use fieldcat::schema::rule::{Level, Rule};
use fieldcat::schema::schema::Schema;

fn build_schema() -> Arc<Schema> {
    let mut registry = TypeRegistry::new();
    registry.register("date", KeywordType::Date);
    let datum = Rule::new(Level::Datum, vec![Predicate::new("param", Matcher::Any)], vec![]);
    let index = Rule::new(Level::Index, vec![Predicate::new("date", Matcher::Any)], vec![datum]);
    let database = Rule::new(Level::Database, vec![Predicate::new("class", Matcher::Any)], vec![index]);
    Arc::new(Schema::new(vec![database], registry))
}

fn bench_archive(c: &mut Criterion) {
    let schema = build_schema();
    let payload = vec![0u8; 4096];

    let mut group = c.benchmark_group("archive");
    for count in [100usize, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let dir = tempfile::tempdir().unwrap();
                    let config = Config::new(dir.path().to_path_buf());
                    (dir, Archiver::new(config, Arc::clone(&schema)))
                },
                |(dir, mut archiver)| {
                    for i in 0..count {
                        let mut key = Key::new();
                        key.set_raw("class", "od");
                        key.set(&schema.registry, "date", "20240101").unwrap();
                        key.set_raw("param", i.to_string());
                        archiver.archive(key, &payload).unwrap();
                    }
                    archiver.flush().unwrap();
                    drop(dir);
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_archive);
criterion_main!(benches);
