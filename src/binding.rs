//! Glue between a dataset and a host that speaks JSON, such as an embedded
//! scripting runtime. Every call takes and returns `serde_json::Value`.
//!
//! Rows arrive in one of two shapes, both ending up in the same dataset calls:
//!
//! ```text
//! [["user.1", [["clicks", 3, "2024-01-01T00:00:00Z"], ...]], ...]
//! [{"rowPath": "user.1", "columns": {"clicks": 3}, "timestamp": 1704067200}, ...]
//! ```

use serde_json::{json, Value};

use crate::construct::{Column, ColumnObservation, Observation, Path, Row};
use crate::dataset::{CommitOutcome, Dataset};
use crate::datatype::{CellValue, Date};
use crate::error::{CellbaseError, Result};
use crate::expression::ExpressionValue;

pub struct JsonBinding<'a> {
    dataset: &'a Dataset,
}

impl<'a> JsonBinding<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        Self { dataset }
    }
    pub fn dataset(&self) -> &Dataset {
        self.dataset
    }

    /// `values` is an array of `[column, value, timestamp]` triples.
    pub fn record_row(&self, row_name: &Value, values: &Value) -> Result<Value> {
        let path = path_from_json(row_name)?;
        let observations = observations_from_json(values)?;
        self.dataset.record_row(path, observations)?;
        Ok(Value::Null)
    }

    pub fn record_rows(&self, rows: &Value) -> Result<Value> {
        let items = rows.as_array().ok_or_else(|| {
            CellbaseError::InvalidArgument(format!("rows must be an array, got {}", rows))
        })?;
        if items.is_empty() {
            return Ok(Value::Null);
        }
        if items.iter().all(Value::is_object) {
            let expressions = items
                .iter()
                .map(expression_row_from_json)
                .collect::<Result<Vec<_>>>()?;
            self.dataset.record_rows_from_expression(expressions)?;
        } else {
            let rows = items
                .iter()
                .map(|item| {
                    let (name, values) = pair_from_json(item)?;
                    Ok(Row::new(path_from_json(name)?, observations_from_json(values)?))
                })
                .collect::<Result<Vec<_>>>()?;
            self.dataset.record_rows(rows)?;
        }
        Ok(Value::Null)
    }

    /// `values` is an array of `[row, value, timestamp]` triples.
    pub fn record_column(&self, column_name: &Value, values: &Value) -> Result<Value> {
        let path = path_from_json(column_name)?;
        let observations = column_observations_from_json(values)?;
        self.dataset.record_column(path, observations)?;
        Ok(Value::Null)
    }

    pub fn record_columns(&self, columns: &Value) -> Result<Value> {
        let items = columns.as_array().ok_or_else(|| {
            CellbaseError::InvalidArgument(format!("columns must be an array, got {}", columns))
        })?;
        let columns = items
            .iter()
            .map(|item| {
                let (name, values) = pair_from_json(item)?;
                Ok(Column::new(
                    path_from_json(name)?,
                    column_observations_from_json(values)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        self.dataset.record_columns(columns)?;
        Ok(Value::Null)
    }

    pub fn commit(&self) -> Result<Value> {
        let outcome = self.dataset.commit()?;
        Ok(json!({
            "committed": true,
            "alreadyCommitted": outcome == CommitOutcome::AlreadyCommitted,
        }))
    }
    pub fn status(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.dataset.status()?)?)
    }
    pub fn id(&self) -> Value {
        Value::String(self.dataset.id().to_owned())
    }
    pub fn type_name(&self) -> Value {
        Value::String(self.dataset.type_name().to_owned())
    }
    pub fn config(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.dataset.config())?)
    }
    pub fn get_column_paths(&self) -> Result<Value> {
        let index = self.dataset.column_index()?;
        Ok(Value::Array(
            index
                .get_column_paths()
                .iter()
                .map(|path| Value::String(path.to_string()))
                .collect(),
        ))
    }
    pub fn get_timestamp_range(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.dataset.timestamp_range()?)?)
    }
}

/// A string in dotted form, or an array of literal segments.
pub fn path_from_json(value: &Value) -> Result<Path> {
    match value {
        Value::String(text) => Path::parse(text),
        Value::Array(segments) => segments
            .iter()
            .map(|segment| {
                segment.as_str().map(str::to_owned).ok_or_else(|| {
                    CellbaseError::InvalidArgument(format!(
                        "path segment {} is not a string",
                        segment
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Path::new),
        other => Err(CellbaseError::InvalidArgument(format!(
            "{} is not a path",
            other
        ))),
    }
}

/// An RFC 3339 string or a number of seconds since the epoch.
pub fn date_from_json(value: &Value) -> Result<Date> {
    match value {
        Value::String(text) => Date::parse(text),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| CellbaseError::InvalidArgument(format!("{} is not a timestamp", n)))
            .and_then(Date::from_secs_f64),
        other => Err(CellbaseError::InvalidArgument(format!(
            "{} is not a timestamp",
            other
        ))),
    }
}

fn pair_from_json(value: &Value) -> Result<(&Value, &Value)> {
    match value.as_array().map(Vec::as_slice) {
        Some([name, values]) => Ok((name, values)),
        _ => Err(CellbaseError::InvalidArgument(format!(
            "expected a [name, values] pair, got {}",
            value
        ))),
    }
}

fn triples_from_json(values: &Value) -> Result<Vec<(&Value, CellValue, Date)>> {
    let items = values.as_array().ok_or_else(|| {
        CellbaseError::InvalidArgument(format!("values must be an array of triples, got {}", values))
    })?;
    items
        .iter()
        .map(|item| match item.as_array().map(Vec::as_slice) {
            Some([path, value, ts]) => Ok((path, CellValue::from_json(value)?, date_from_json(ts)?)),
            _ => Err(CellbaseError::InvalidArgument(format!(
                "expected a [path, value, timestamp] triple, got {}",
                item
            ))),
        })
        .collect()
}

fn observations_from_json(values: &Value) -> Result<Vec<Observation>> {
    triples_from_json(values)?
        .into_iter()
        .map(|(column, value, ts)| Ok(Observation::new(path_from_json(column)?, value, ts)))
        .collect()
}

fn column_observations_from_json(values: &Value) -> Result<Vec<ColumnObservation>> {
    triples_from_json(values)?
        .into_iter()
        .map(|(row, value, ts)| Ok(ColumnObservation::new(path_from_json(row)?, value, ts)))
        .collect()
}

fn expression_row_from_json(item: &Value) -> Result<(Path, ExpressionValue)> {
    let row = item.get("rowPath").ok_or_else(|| {
        CellbaseError::InvalidArgument(format!("row object {} has no rowPath", item))
    })?;
    let ts = match item.get("timestamp") {
        Some(ts) => date_from_json(ts)?,
        None => Date::now(),
    };
    let expression = match item.get("columns") {
        Some(columns @ Value::Array(_)) => ExpressionValue::Row(
            triples_from_json(columns)?
                .into_iter()
                .map(|(column, value, ts)| {
                    let column = path_from_json(column)?;
                    Ok(ExpressionValue::Atom { value, ts }.nest_under(&column))
                })
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .flat_map(|nested| match nested {
                    ExpressionValue::Row(members) => members,
                    atom => vec![(String::new(), atom)],
                })
                .collect(),
        ),
        Some(columns) => ExpressionValue::row_from_json(columns, ts)?,
        None => {
            return Err(CellbaseError::InvalidArgument(format!(
                "row object {} has no columns",
                item
            )));
        }
    };
    Ok((path_from_json(row)?, expression))
}
