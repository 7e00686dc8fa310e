use std::fmt::Write as _;

use cloud_inventory::ingest::parse_databases;
use cloud_inventory::model::{DatabaseRecord, Provider, Record};
use cloud_inventory::reconcile::{SyncMode, reconcile};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

fn generate_export(rows: usize) -> String {
    let mut csv = String::from(
        "DB Instance Identifier,Engine,Engine Version,Region,Allocated Storage,Status,Owner,Tags\n",
    );
    for i in 0..rows {
        let engine = match i % 3 {
            0 => "postgres",
            1 => "mysql",
            _ => "sqlserver-se",
        };
        let region = match i % 4 {
            0 => "us-east-1",
            1 => "us-west-2",
            2 => "eu-west-1",
            _ => "ap-southeast-2",
        };
        let status = if i % 7 == 0 { "stopped" } else { "available" };
        writeln!(
            csv,
            "db-{i},{engine},{}.{},{region},{},{status},{},team-{};prod",
            10 + i % 8,
            i % 20,
            20 + i % 500,
            100_000_000_000u64 + (i % 12) as u64,
            i % 9
        )
        .expect("row");
    }
    csv
}

fn existing_records(csv: &str) -> Vec<DatabaseRecord> {
    parse_databases(csv, Provider::Aws)
        .expect("parse seed")
        .rows
        .into_iter()
        .enumerate()
        .map(|(idx, parsed)| Record::new(format!("seed-{idx}"), parsed.item))
        .collect()
}

fn bench_reconcile(c: &mut Criterion) {
    let export = generate_export(20_000);
    let existing = existing_records(&generate_export(10_000));

    let mut group = c.benchmark_group("database_import");

    group.bench_function("parse_export", |b| {
        b.iter(|| parse_databases(&export, Provider::Aws).expect("parse export"));
    });

    group.bench_function("reconcile_additive", |b| {
        b.iter_batched(
            || parse_databases(&export, Provider::Aws).expect("parse export"),
            |batch| {
                let mut counter = 0usize;
                reconcile(&existing, batch, SyncMode::Additive, || {
                    counter += 1;
                    format!("new-{counter}")
                })
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("reconcile_mirror", |b| {
        b.iter_batched(
            || parse_databases(&export, Provider::Aws).expect("parse export"),
            |batch| {
                let mut counter = 0usize;
                reconcile(&existing, batch, SyncMode::Mirror, || {
                    counter += 1;
                    format!("new-{counter}")
                })
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_reconcile);
criterion_main!(benches);
