use std::hint::black_box;

use cellbase::construct::{Observation, Path, Row};
use cellbase::dataset::Dataset;
use cellbase::datatype::Date;
use cellbase::registry::{DatasetConfig, DatasetTypeRegistry};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

fn rows(count: u64) -> Vec<Row> {
    (0..count)
        .map(|n| {
            let ts = Date::from_micros(n as i64);
            Row::new(
                Path::new(["user".to_string(), n.to_string()]),
                vec![
                    Observation::new("clicks", n as i64, ts),
                    Observation::new("country", if n % 2 == 0 { "CA" } else { "SE" }, ts),
                    Observation::new(Path::new(["geo", "lat"]), n as f64 / 7.0, ts),
                ],
            )
        })
        .collect()
}

fn open_dataset(registry: &DatasetTypeRegistry) -> Dataset {
    Dataset::create(registry, DatasetConfig::new("memory")).expect("dataset")
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let registry = DatasetTypeRegistry::builtin();

    c.bench_function("record 1k rows", |b| {
        b.iter_batched(
            || (open_dataset(&registry), rows(1000)),
            |(dataset, rows)| dataset.record_rows(black_box(rows)).expect("record"),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("commit 10k rows", |b| {
        b.iter_batched(
            || {
                let dataset = open_dataset(&registry);
                dataset.record_rows(rows(10_000)).expect("record");
                dataset
            },
            |dataset| black_box(dataset.commit().expect("commit")),
            BatchSize::LargeInput,
        )
    });

    let columns = [Path::from("clicks"), Path::new(["geo", "lat"])];
    for (name, count) in [("rows with all 1k", 1000), ("rows with all 100k", 100_000)] {
        let dataset = open_dataset(&registry);
        dataset.record_rows(rows(count)).expect("record");
        dataset.commit().expect("commit");
        let index = dataset.column_index().expect("index");
        c.bench_function(name, |b| b.iter(|| index.rows_with_all(black_box(&columns))));
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
