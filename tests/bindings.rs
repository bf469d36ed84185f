use serde_json::json;

use cellbase::binding::JsonBinding;
use cellbase::construct::Path;
use cellbase::dataset::Dataset;
use cellbase::datatype::CellValue;
use cellbase::error::CellbaseError;
use cellbase::registry::{DatasetConfig, DatasetTypeRegistry};

fn memory_dataset(id: &str) -> Dataset {
    let config = DatasetConfig::new("memory").with_id(id).with_param("shards", 2);
    Dataset::create(&DatasetTypeRegistry::builtin(), config).expect("dataset")
}

#[test]
fn both_row_shapes_record_the_same_facts() {
    let triples = memory_dataset("triples");
    let objects = memory_dataset("objects");

    JsonBinding::new(&triples)
        .record_rows(&json!([
            ["user.1", [["clicks", 3, 0], ["geo.country", "CA", 0]]],
            ["user.2", [["clicks", 1, 0]]]
        ]))
        .expect("pairs");
    JsonBinding::new(&objects)
        .record_rows(&json!([
            {"rowPath": "user.1", "columns": {"clicks": 3, "geo": {"country": "CA"}}, "timestamp": 0},
            {"rowPath": ["user", "2"], "columns": [["clicks", 1, "1970-01-01T00:00:00Z"]]}
        ]))
        .expect("objects");

    triples.commit().expect("commit");
    objects.commit().expect("commit");
    assert_eq!(
        triples.frozen().expect("frozen").fingerprint(),
        objects.frozen().expect("frozen").fingerprint()
    );
}

#[test]
fn introspection_returns_json() {
    let dataset = memory_dataset("intro");
    let binding = JsonBinding::new(&dataset);
    binding
        .record_row(&json!("user.1"), &json!([["clicks", 3, 1.5], ["country", "CA", 2]]))
        .expect("row");
    binding
        .record_column(&json!("clicks"), &json!([["user.2", 7, 3]]))
        .expect("column");
    binding
        .record_columns(&json!([["visits", [["user.2", 1, 3]]]]))
        .expect("columns");

    assert_eq!(binding.id(), json!("intro"));
    assert_eq!(binding.type_name(), json!("memory"));
    assert_eq!(
        binding.config().expect("config"),
        json!({"id": "intro", "type": "memory", "params": {"shards": 2}})
    );
    assert_eq!(
        binding.get_column_paths().expect("paths"),
        json!(["clicks", "country", "visits"])
    );
    assert_eq!(
        binding.get_timestamp_range().expect("range"),
        json!({"earliest": "1970-01-01T00:00:01.500000Z", "latest": "1970-01-01T00:00:03.000000Z"})
    );

    assert_eq!(
        binding.commit().expect("commit"),
        json!({"committed": true, "alreadyCommitted": false})
    );
    assert_eq!(binding.commit().expect("commit")["alreadyCommitted"], true);
    let status = binding.status().expect("status");
    assert_eq!(status["state"], "committed");
    assert_eq!(status["valueCount"], 4);
    assert_eq!(status["rowCount"], 2);
}

#[test]
fn malformed_input_is_an_invalid_argument() {
    let dataset = memory_dataset("bad");
    let binding = JsonBinding::new(&dataset);
    let attempts = [
        binding.record_rows(&json!({"rowPath": "r"})),
        binding.record_rows(&json!([["r"]])),
        binding.record_rows(&json!([{"rowPath": "r"}])),
        binding.record_rows(&json!([{"rowPath": "r", "columns": 5}])),
        binding.record_rows(&json!([{"rowPath": "r", "columns": {"": 1}}])),
        binding.record_row(&json!("r"), &json!([["c", [1, 2], 0]])),
        binding.record_row(&json!("r"), &json!([["c", 1, "yesterday"]])),
    ];
    for attempt in attempts {
        assert!(matches!(attempt, Err(CellbaseError::InvalidArgument(_))));
    }
    assert!(binding.record_rows(&json!([])).is_ok());
    assert_eq!(binding.status().expect("status")["valueCount"], 0);
}

#[test]
fn columns_named_like_value_tags_are_still_columns() {
    let dataset = memory_dataset("tags");
    let binding = JsonBinding::new(&dataset);
    binding
        .record_rows(&json!([
            {"rowPath": "a", "columns": {"timestamp": "2024-01-01"}, "timestamp": 0},
            {"rowPath": "b", "columns": {"interval": "soon"}, "timestamp": 0},
            {"rowPath": "c", "columns": {"seen": {"timestamp": "2024-01-01T00:00:00Z"}}, "timestamp": 0}
        ]))
        .expect("rows");
    dataset.commit().expect("commit");

    let store = dataset.frozen().expect("frozen");
    let a = store.row(&Path::from("a")).expect("row a");
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].column, Path::from("timestamp"));
    assert_eq!(a[0].value, CellValue::from("2024-01-01"));
    let b = store.row(&Path::from("b")).expect("row b");
    assert_eq!(b[0].column, Path::from("interval"));
    assert_eq!(b[0].value, CellValue::from("soon"));
    // nested one level down, the tag still reads as a timestamp value
    let c = store.row(&Path::from("c")).expect("row c");
    assert_eq!(c[0].column, Path::from("seen"));
    assert!(matches!(c[0].value, CellValue::Timestamp(_)));
}
