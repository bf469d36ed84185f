use cellbase::construct::{ColumnObservation, Observation, Path};
use cellbase::dataset::Dataset;
use cellbase::datatype::{Date, TimestampRange};
use cellbase::registry::{DatasetConfig, DatasetTypeRegistry};

fn memory_dataset() -> Dataset {
    Dataset::create(&DatasetTypeRegistry::builtin(), DatasetConfig::new("memory")).expect("dataset")
}

fn at(text: &str) -> Date {
    Date::parse(text).expect("date")
}

#[test]
fn range_is_empty_before_any_observation() {
    let dataset = memory_dataset();
    let range = dataset.timestamp_range().expect("range");
    assert_eq!(range, TimestampRange::EMPTY);
    assert_eq!(range.earliest(), None);
    dataset.commit().expect("commit");
    assert!(dataset.timestamp_range().expect("range").is_empty());
}

#[test]
fn range_widens_only_outside_itself() {
    let dataset = memory_dataset();
    let row = Path::from("r");
    let record = |ts: Date| {
        dataset
            .record_row(row.clone(), vec![Observation::new("c", 1, ts)])
            .expect("row");
        dataset.timestamp_range().expect("range")
    };

    let range = record(at("2024-03-01"));
    assert_eq!(range, TimestampRange::single(at("2024-03-01")));
    let range = record(at("2024-01-01"));
    assert_eq!(range, TimestampRange::new(at("2024-01-01"), at("2024-03-01")));
    let inside = record(at("2024-02-01"));
    assert_eq!(inside, range);
    let range = record(at("2024-06-30T12:00:00Z"));
    assert_eq!(range.latest(), Some(at("2024-06-30T12:00:00Z")));
    assert_eq!(range.earliest(), Some(at("2024-01-01")));

    dataset.commit().expect("commit");
    assert_eq!(dataset.timestamp_range().expect("range"), range);
}

#[test]
fn column_ingestion_feeds_the_same_range() {
    let dataset = memory_dataset();
    let t1 = at("2023-12-31T23:59:59.999999Z");
    let t2 = at("2024-01-01");
    dataset
        .record_column(
            Path::from("clicks"),
            vec![
                ColumnObservation::new("a", 1, t2),
                ColumnObservation::new("b", 2, t1),
            ],
        )
        .expect("column");
    let range = dataset.timestamp_range().expect("range");
    assert_eq!((range.earliest(), range.latest()), (Some(t1), Some(t2)));
    assert_eq!(t2.micros() - t1.micros(), 1);
}

#[test]
fn column_stats_carry_their_own_ranges() {
    let dataset = memory_dataset();
    dataset
        .record_row(
            Path::from("r"),
            vec![
                Observation::new("early", 1, at("2020-01-01")),
                Observation::new("late", 1, at("2030-01-01")),
            ],
        )
        .expect("row");
    dataset.commit().expect("commit");
    let index = dataset.column_index().expect("index");
    let early = index.stats(&Path::from("early")).expect("stats");
    assert_eq!(early.timestamp_range, TimestampRange::single(at("2020-01-01")));
    let global = dataset.timestamp_range().expect("range");
    assert_eq!(global, TimestampRange::new(at("2020-01-01"), at("2030-01-01")));
}
