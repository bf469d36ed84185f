use cellbase::construct::{Column, ColumnObservation, Observation, Path, Row};
use cellbase::dataset::{CancelToken, CommitOutcome, Dataset, Lifecycle};
use cellbase::datatype::Date;
use cellbase::error::CellbaseError;
use cellbase::expression::ExpressionValue;
use cellbase::registry::{DatasetConfig, DatasetTypeRegistry};

fn memory_dataset(id: &str) -> Dataset {
    let config = DatasetConfig::new("memory").with_id(id);
    Dataset::create(&DatasetTypeRegistry::builtin(), config).expect("dataset")
}

fn path(text: &str) -> Path {
    Path::parse(text).expect("path")
}

#[test]
fn second_commit_reports_already_committed() {
    let dataset = memory_dataset("twice");
    dataset
        .record_row(path("r"), vec![Observation::new("c", 1, Date::EPOCH)])
        .expect("row");
    assert_eq!(dataset.commit().expect("commit"), CommitOutcome::Committed);
    let first = dataset.status().expect("status");
    assert_eq!(dataset.commit().expect("commit"), CommitOutcome::AlreadyCommitted);
    assert_eq!(dataset.status().expect("status"), first);
    assert_eq!(first.state, Lifecycle::Committed);
    assert!(first.fingerprint.is_some());
}

#[test]
fn recording_after_commit_is_an_invalid_state() {
    let dataset = memory_dataset("sealed");
    let t = Date::from_micros(9);
    dataset
        .record_row(path("user.1"), vec![Observation::new("clicks", 3, t)])
        .expect("row");
    dataset.commit().expect("commit");

    let attempts = [
        dataset.record_row(path("user.2"), vec![Observation::new("clicks", 1, t)]),
        dataset.record_rows(vec![Row::new(path("user.2"), vec![])]),
        dataset.record_column(path("clicks"), vec![ColumnObservation::new(path("user.2"), 1, t)]),
        dataset.record_columns(vec![Column::new(path("clicks"), vec![])]),
        dataset.record_rows_from_expression(vec![(
            path("user.2"),
            ExpressionValue::row([("clicks", ExpressionValue::atom(1, t))]),
        )]),
    ];
    for attempt in attempts {
        assert!(matches!(attempt, Err(CellbaseError::InvalidState(_))));
    }

    // the rest of the surface keeps working
    assert_eq!(dataset.id(), "sealed");
    assert_eq!(dataset.type_name(), "memory");
    assert_eq!(dataset.config().id.as_deref(), Some("sealed"));
    let index = dataset.column_index().expect("index");
    assert_eq!(index.get_column_paths(), [path("clicks")]);
    let range = dataset.timestamp_range().expect("range");
    assert_eq!((range.earliest(), range.latest()), (Some(t), Some(t)));
    assert_eq!(dataset.status().expect("status").value_count, 1);
}

#[test]
fn committed_reads_are_stable() {
    let dataset = memory_dataset("stable");
    for n in 0..10i64 {
        dataset
            .record_row(
                Path::new(["row".to_string(), n.to_string()]),
                vec![Observation::new(Path::new(["col".to_string(), (n % 3).to_string()]), n, Date::from_micros(n))],
            )
            .expect("row");
    }
    dataset.commit().expect("commit");
    let first = dataset.column_index().expect("index").get_column_paths();
    let second = dataset.column_index().expect("index").get_column_paths();
    assert_eq!(first, second);
    assert_eq!(dataset.timestamp_range().expect("range"), dataset.timestamp_range().expect("range"));
}

#[test]
fn generated_ids_are_unique_and_typed() {
    let registry = DatasetTypeRegistry::builtin();
    let a = Dataset::create(&registry, DatasetConfig::new("memory")).expect("a");
    let b = Dataset::create(&registry, DatasetConfig::new("memory")).expect("b");
    assert_ne!(a.id(), b.id());
    assert!(a.id().starts_with("memory-"));
    assert_eq!(a.config().id.as_deref(), Some(a.id()));
    let empty = Dataset::create(&registry, DatasetConfig::new("memory").with_id(""));
    assert!(matches!(empty, Err(CellbaseError::InvalidArgument(_))));
    let unknown = Dataset::create(&registry, DatasetConfig::new("parquet"));
    assert!(matches!(unknown, Err(CellbaseError::InvalidArgument(_))));
}

#[test]
fn empty_observation_lists_change_nothing() {
    let dataset = memory_dataset("empty");
    dataset.record_row(path("r"), vec![]).expect("empty row");
    dataset.record_column(path("c"), vec![]).expect("empty column");
    dataset.record_rows(vec![]).expect("no rows");
    let status = dataset.status().expect("status");
    assert_eq!((status.row_count, status.column_count, status.value_count), (0, 0, 0));
    assert!(status.timestamp_range.is_empty());
    assert_eq!(status.state, Lifecycle::Open);
}

#[test]
fn cancelled_commit_leaves_the_dataset_open() {
    let dataset = memory_dataset("cancelled");
    let t = Date::from_micros(3);
    dataset
        .record_row(path("r"), vec![Observation::new("c", 1, t)])
        .expect("row");
    let token = CancelToken::new();
    token.cancel();
    assert!(matches!(dataset.commit_with(&token), Err(CellbaseError::Cancelled)));
    assert_eq!(dataset.lifecycle().expect("state"), Lifecycle::Open);
    dataset
        .record_row(path("r2"), vec![Observation::new("c", 2, t)])
        .expect("still open");
    assert_eq!(dataset.commit().expect("commit"), CommitOutcome::Committed);
    assert_eq!(dataset.frozen().expect("frozen").value_count(), 2);
}

#[test]
fn frozen_store_requires_a_commit() {
    let dataset = memory_dataset("unfrozen");
    assert!(matches!(dataset.frozen(), Err(CellbaseError::InvalidState(_))));
    dataset.commit().expect("commit empty");
    let store = dataset.frozen().expect("frozen");
    assert_eq!(store.value_count(), 0);
    assert!(store.timestamp_range().is_empty());
}

#[test]
fn status_serializes_for_hosts() {
    let dataset = memory_dataset("json");
    dataset
        .record_row(path("r"), vec![Observation::new("c", 1, Date::EPOCH)])
        .expect("row");
    let open = serde_json::to_value(dataset.status().expect("status")).expect("json");
    assert_eq!(open["state"], "open");
    assert_eq!(open["type"], "memory");
    assert!(open.get("fingerprint").is_none());
    dataset.commit().expect("commit");
    let committed = serde_json::to_value(dataset.status().expect("status")).expect("json");
    assert_eq!(committed["state"], "committed");
    assert_eq!(committed["rowCount"], 1);
    assert_eq!(committed["timestampRange"]["earliest"], "1970-01-01T00:00:00.000000Z");
    assert!(committed["fingerprint"].is_string());
}
