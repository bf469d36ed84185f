use std::collections::BTreeSet;

use cellbase::construct::{Column, ColumnObservation, Fact, Observation, Path, Row};
use cellbase::dataset::Dataset;
use cellbase::datatype::{CellValue, Date};
use cellbase::registry::{DatasetConfig, DatasetTypeRegistry};

fn memory_dataset() -> Dataset {
    Dataset::create(&DatasetTypeRegistry::builtin(), DatasetConfig::new("memory")).expect("dataset")
}

fn path(text: &str) -> Path {
    Path::parse(text).expect("path")
}

fn both_views(dataset: &Dataset) -> (BTreeSet<Fact>, BTreeSet<Fact>) {
    let store = match dataset.frozen() {
        Ok(store) => store,
        Err(_) => std::sync::Arc::new(dataset.live_snapshot().expect("snapshot")),
    };
    (
        store.facts_row_major().collect(),
        store.facts_column_major().collect(),
    )
}

#[test]
fn row_and_column_ingestion_meet_in_both_views() {
    let dataset = memory_dataset();
    let t1 = Date::from_micros(1_000);
    let t2 = Date::from_micros(2_000);
    dataset
        .record_row(
            path("user.1"),
            vec![
                Observation::new("clicks", 3, t1),
                Observation::new("country", "CA", t1),
            ],
        )
        .expect("row");
    dataset
        .record_column(
            path("clicks"),
            vec![
                ColumnObservation::new(path("user.2"), 1, t2),
                ColumnObservation::new(path("user.1"), 4, t2),
            ],
        )
        .expect("column");

    let (row_major, column_major) = both_views(&dataset);
    assert_eq!(row_major, column_major);
    assert_eq!(row_major.len(), 4);
    assert!(row_major.contains(&Fact {
        row: path("user.2"),
        column: path("clicks"),
        ts: t2,
        value: CellValue::Integer(1),
    }));

    dataset.commit().expect("commit");
    let (row_major_after, column_major_after) = both_views(&dataset);
    assert_eq!(row_major_after, column_major_after);
    assert_eq!(row_major_after, row_major);
}

#[test]
fn batches_are_transposes_of_each_other() {
    let by_rows = memory_dataset();
    let by_columns = memory_dataset();
    let t = Date::from_micros(7);
    by_rows
        .record_rows(vec![
            Row::new(path("a"), vec![Observation::new("x", 1, t), Observation::new("y", 2.5, t)]),
            Row::new(path("b"), vec![Observation::new("x", 3, t)]),
        ])
        .expect("rows");
    by_columns
        .record_columns(vec![
            Column::new(
                path("x"),
                vec![ColumnObservation::new(path("a"), 1, t), ColumnObservation::new(path("b"), 3, t)],
            ),
            Column::new(path("y"), vec![ColumnObservation::new(path("a"), 2.5, t)]),
        ])
        .expect("columns");
    by_rows.commit().expect("commit");
    by_columns.commit().expect("commit");
    let rows_store = by_rows.frozen().expect("frozen");
    let columns_store = by_columns.frozen().expect("frozen");
    assert_eq!(
        rows_store.facts_row_major().collect::<Vec<_>>(),
        columns_store.facts_row_major().collect::<Vec<_>>()
    );
    assert_eq!(rows_store.fingerprint(), columns_store.fingerprint());
}

#[test]
fn views_are_ordered_by_path_then_time() {
    let dataset = memory_dataset();
    let early = Date::from_micros(1);
    let late = Date::from_micros(2);
    dataset
        .record_row(
            path("r"),
            vec![
                Observation::new("b", 1, late),
                Observation::new("a", 1, late),
                Observation::new("b", 0, early),
            ],
        )
        .expect("row");
    dataset.commit().expect("commit");
    let store = dataset.frozen().expect("frozen");
    let row = store.row(&path("r")).expect("row");
    let order: Vec<(String, i64)> = row.iter().map(|o| (o.column.to_string(), o.ts.micros())).collect();
    assert_eq!(order, [("a".to_string(), 2), ("b".to_string(), 1), ("b".to_string(), 2)]);
}

#[test]
fn identical_coordinates_keep_the_last_value() {
    let dataset = memory_dataset();
    let t = Date::from_micros(5);
    dataset.record_row(path("r"), vec![Observation::new("c", 1, t)]).expect("first");
    dataset
        .record_column(path("c"), vec![ColumnObservation::new(path("r"), 2, t)])
        .expect("second");
    let status = dataset.status().expect("status");
    assert_eq!(status.value_count, 1);
    dataset.commit().expect("commit");
    let store = dataset.frozen().expect("frozen");
    assert_eq!(store.column(&path("c")).expect("column")[0].value, CellValue::Integer(2));
    assert_eq!(store.row(&path("r")).expect("row")[0].value, CellValue::Integer(2));
}

#[test]
fn empty_paths_are_invalid_arguments() {
    let dataset = memory_dataset();
    let t = Date::EPOCH;
    let err = dataset
        .record_row(Path::root(), vec![Observation::new("c", 1, t)])
        .expect_err("empty row path");
    assert!(err.is_recoverable());
    let err = dataset
        .record_row(path("r"), vec![Observation::new(Path::root(), 1, t)])
        .expect_err("empty column path");
    assert!(matches!(err, cellbase::error::CellbaseError::InvalidArgument(_)));
    assert_eq!(dataset.status().expect("status").value_count, 0);
    dataset.check_consistency().expect("consistent");
}

#[test]
fn row_batches_stop_at_the_first_bad_row() {
    let dataset = memory_dataset();
    let t = Date::from_micros(1);
    let outcome = dataset.record_rows(vec![
        Row::new(path("a"), vec![Observation::new("x", 1, t)]),
        Row::new(Path::root(), vec![Observation::new("x", 2, t)]),
        Row::new(path("c"), vec![Observation::new("x", 3, t)]),
    ]);
    assert!(matches!(outcome, Err(cellbase::error::CellbaseError::InvalidArgument(_))));
    assert_eq!(dataset.status().expect("status").value_count, 1);

    dataset.commit().expect("commit");
    let store = dataset.frozen().expect("frozen");
    assert!(store.row(&path("a")).is_some());
    assert!(store.row(&path("c")).is_none());
    let (row_major, column_major) = both_views(&dataset);
    assert_eq!(row_major, column_major);
}

#[test]
fn column_batches_stop_at_the_first_bad_column() {
    let dataset = memory_dataset();
    let t = Date::from_micros(1);
    let outcome = dataset.record_columns(vec![
        Column::new(path("x"), vec![ColumnObservation::new(path("a"), 1, t)]),
        Column::new(Path::root(), vec![ColumnObservation::new(path("a"), 2, t)]),
        Column::new(path("z"), vec![ColumnObservation::new(path("a"), 3, t)]),
    ]);
    assert!(matches!(outcome, Err(cellbase::error::CellbaseError::InvalidArgument(_))));
    assert_eq!(dataset.status().expect("status").value_count, 1);
    let snapshot = dataset.live_snapshot().expect("snapshot");
    assert!(snapshot.column(&path("x")).is_some());
    assert!(snapshot.column(&path("z")).is_none());
}
