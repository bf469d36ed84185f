//! Computed, possibly nested, row values and their flattening into observations.

use std::fmt;

use crate::construct::{ColumnPath, Observation, Path};
use crate::datatype::{CellValue, Date};
use crate::error::{CellbaseError, Result};

/// A value produced by evaluating an expression: either a timestamped scalar or
/// a row of named members, each of which may itself be a row.
#[derive(Clone, Debug, PartialEq)]
pub enum ExpressionValue {
    Atom { value: CellValue, ts: Date },
    Row(Vec<(String, ExpressionValue)>),
}

impl ExpressionValue {
    pub fn atom<V: Into<CellValue>>(value: V, ts: Date) -> Self {
        ExpressionValue::Atom {
            value: value.into(),
            ts,
        }
    }
    pub fn row<K: Into<String>, I: IntoIterator<Item = (K, ExpressionValue)>>(members: I) -> Self {
        ExpressionValue::Row(members.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
    /// Wraps `self` in one single-member row per segment, outermost first.
    pub fn nest_under(self, path: &ColumnPath) -> Self {
        path.segments()
            .iter()
            .rev()
            .fold(self, |inner, segment| ExpressionValue::Row(vec![(segment.clone(), inner)]))
    }

    /// Objects become rows, arrays become rows keyed by position and scalars
    /// become atoms stamped with `ts`.
    pub fn from_json(value: &serde_json::Value, ts: Date) -> Result<Self> {
        match value {
            serde_json::Value::Object(members) if !is_tagged_scalar(members) => members
                .iter()
                .map(|(key, member)| Ok((key.clone(), Self::from_json(member, ts)?)))
                .collect::<Result<Vec<_>>>()
                .map(ExpressionValue::Row),
            serde_json::Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| Ok((i.to_string(), Self::from_json(item, ts)?)))
                .collect::<Result<Vec<_>>>()
                .map(ExpressionValue::Row),
            scalar => Ok(ExpressionValue::Atom {
                value: CellValue::from_json(scalar)?,
                ts,
            }),
        }
    }

    /// Like [`ExpressionValue::from_json`], except that an object is always a row,
    /// even one whose only member is named `blob`, `timestamp` or `interval`.
    pub fn row_from_json(value: &serde_json::Value, ts: Date) -> Result<Self> {
        match value {
            serde_json::Value::Object(members) => members
                .iter()
                .map(|(key, member)| Ok((key.clone(), Self::from_json(member, ts)?)))
                .collect::<Result<Vec<_>>>()
                .map(ExpressionValue::Row),
            other => Self::from_json(other, ts),
        }
    }

    /// One observation per atom, its column path being the chain of keys leading to it.
    pub fn flatten(self) -> Result<Vec<Observation>> {
        match self {
            ExpressionValue::Atom { .. } => Err(CellbaseError::InvalidArgument(format!(
                "expected a row-valued expression, got the scalar {}",
                self
            ))),
            ExpressionValue::Row(members) => {
                let mut observations = Vec::new();
                flatten_into(&Path::root(), members, &mut observations)?;
                Ok(observations)
            }
        }
    }
}

fn flatten_into(
    prefix: &Path,
    members: Vec<(String, ExpressionValue)>,
    out: &mut Vec<Observation>,
) -> Result<()> {
    for (key, member) in members {
        if key.is_empty() {
            return Err(CellbaseError::InvalidArgument(format!(
                "empty member name under '{}' for value {}",
                prefix, member
            )));
        }
        let column = prefix.push(key);
        match member {
            ExpressionValue::Atom { value, ts } => out.push(Observation { column, value, ts }),
            ExpressionValue::Row(inner) => flatten_into(&column, inner, out)?,
        }
    }
    Ok(())
}

// {"blob": ..}, {"timestamp": ..} and {"interval": ..} are cell values, not rows
fn is_tagged_scalar(members: &serde_json::Map<String, serde_json::Value>) -> bool {
    members.len() == 1
        && ["blob", "timestamp", "interval"]
            .iter()
            .any(|tag| members.contains_key(*tag))
}

impl fmt::Display for ExpressionValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExpressionValue::Atom { value, ts } => write!(f, "{}@{}", value, ts),
            ExpressionValue::Row(members) => {
                write!(f, "{{")?;
                for (i, (key, member)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", key, member)?;
                }
                write!(f, "}}")
            }
        }
    }
}
