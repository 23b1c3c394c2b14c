use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use arriba::core::config::Config;
use arriba::core::types::{ColumnType, DataBlock, Value};
use arriba::query::aggregate::{AggregationQuery, Aggregator, Dimension};
use arriba::query::parser::parse_where;
use arriba::query::select::SelectQuery;
use arriba::schema::schema::ColumnDetails;
use arriba::structures::partition_mask::{hash_id, PartitionMask};
use arriba::table::database::Database;
use arriba::table::table::{AddOrUpdateOptions, Table};
use rand::Rng;
use std::sync::Arc;

const PRIORITIES: [&str; 4] = ["Low", "Medium", "High", "Critical"];

/// Helper to build a block of random bug rows
fn create_bug_block(start: i64, count: usize) -> DataBlock {
    let mut rng = rand::thread_rng();
    let rows = (0..count as i64)
        .map(|i| {
            let words = ["crash", "hang", "leak", "typo", "layout", "timeout", "login"];
            let title = format!("{} in build {}", words[rng.gen_range(0..words.len())], rng.gen_range(0..50));
            vec![
                Value::Integer(start + i),
                Value::Text(title),
                Value::Text(PRIORITIES[rng.gen_range(0..PRIORITIES.len())].to_string()),
                Value::Integer(rng.gen_range(0..100)),
            ]
        })
        .collect();

    DataBlock::from_rows(
        vec!["ID".into(), "Title".into(), "Priority".into(), "Age".into()],
        rows,
    )
    .unwrap()
}

fn create_table(db: &Database, rows: usize) -> Arc<Table> {
    let table = db.add_table("Bugs", None).unwrap();
    table
        .add_columns(vec![
            ColumnDetails::new("ID", ColumnType::Integer).primary_key(),
            ColumnDetails::new("Title", ColumnType::String),
            ColumnDetails::new("Priority", ColumnType::String),
            ColumnDetails::new("Age", ColumnType::Integer),
        ])
        .unwrap();

    for start in (0..rows).step_by(10_000) {
        let block = create_bug_block(start as i64, 10_000.min(rows - start));
        table.add_or_update(&block, AddOrUpdateOptions::default()).unwrap();
    }
    table
}

fn open(dir: &std::path::Path) -> Database {
    let mut config = Config::with_storage_path(dir);
    config.partition_capacity = 16_384;
    Database::open(config).unwrap()
}

/// Benchmark hashing and routing ids to partitions
fn bench_partition_routing(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let ids: Vec<Value> = (0..10_000).map(|_| Value::Integer(rng.gen_range(0..i64::MAX))).collect();

    let mut group = c.benchmark_group("partition_routing");
    for bits in [0u8, 4, 8, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(bits), &bits, |b, &bits| {
            b.iter(|| {
                ids.iter()
                    .map(|id| PartitionMask::index_of_hash(hash_id(id), bits))
                    .sum::<usize>()
            });
        });
    }
    group.finish();
}

/// Benchmark bulk insertion at different block sizes
fn bench_add_or_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_or_update");
    group.sample_size(10);

    for size in [1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let dir = tempfile::tempdir().unwrap();
            let db = open(dir.path());
            let table = create_table(&db, 0);
            let mut start = 0;
            b.iter(|| {
                let block = create_bug_block(start, size);
                table.add_or_update(black_box(&block), AddOrUpdateOptions::default()).unwrap();
                start += size as i64;
            });
        });
    }
    group.finish();
}

/// Benchmark select with different where clauses
fn bench_select(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path());
    let table = create_table(&db, 100_000);

    let mut group = c.benchmark_group("select");
    for query in ["*", "Priority = High", "Title:crash", "Age > 50 AND Priority != Low", "crash OR leak"] {
        let where_clause = parse_where(query).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(query), &where_clause, |b, where_clause| {
            let mut select = SelectQuery::new(vec!["ID".into(), "Title".into()], where_clause.clone());
            select.table_name = "Bugs".into();
            b.iter(|| black_box(table.query(&select).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark grouped aggregation
fn bench_aggregate(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path());
    let table = create_table(&db, 100_000);

    c.bench_function("sum_age_by_priority", |b| {
        let mut query = AggregationQuery::new(Aggregator::Sum, Some("Age"), parse_where("*").unwrap());
        query.table_name = "Bugs".into();
        query.dimensions.push(Dimension::DistinctValue { column: "Priority".into() });
        b.iter(|| black_box(table.query(&query).unwrap()));
    });
}

fn bench_save_load(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path());
    let table = create_table(&db, 50_000);

    let mut group = c.benchmark_group("persistence");
    group.sample_size(10);
    group.bench_function("save", |b| b.iter(|| table.save().unwrap()));
    group.bench_function("reload", |b| b.iter(|| db.reload_table("Bugs").unwrap()));
    group.finish();
}

criterion_group!(benches, bench_partition_routing, bench_add_or_update, bench_select, bench_aggregate, bench_save_load);
criterion_main!(benches);
