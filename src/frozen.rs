//! The immutable representation a dataset serves after commit.

use std::collections::BTreeMap;

// used to keep the one-to-one mapping between row paths and their ordinals
use bimap::BiMap;

use crate::buffer::{BufferViews, MutableBuffer};
use crate::construct::{ColumnObservation, ColumnPath, Fact, Observation, Path, RowPath};
use crate::datatype::{CellValue, TimestampRange};
use crate::error::{CellbaseError, Result};

/// Row-major and column-major views over one committed fact set.
///
/// Rows hold their observations ordered by `(column, ts)`, columns by `(row, ts)`.
/// Rows are numbered `0..row_count()` in path order; the ordinals back the
/// bitmaps of the column index.
#[derive(Debug)]
pub struct FrozenStore {
    rows: BTreeMap<RowPath, Vec<Observation>>,
    columns: BTreeMap<ColumnPath, Vec<ColumnObservation>>,
    row_ordinals: BiMap<RowPath, u64>,
    value_count: u64,
    range: TimestampRange,
    fingerprint: String,
}

impl FrozenStore {
    pub fn from_views(views: BufferViews) -> Self {
        let BufferViews { rows, columns } = views;
        let mut row_ordinals = BiMap::new();
        let mut value_count = 0u64;
        let mut range = TimestampRange::EMPTY;
        for (ordinal, (row, observations)) in rows.iter().enumerate() {
            row_ordinals.insert(row.clone(), ordinal as u64);
            value_count += observations.len() as u64;
            for observation in observations {
                range.extend(observation.ts);
            }
        }
        let fingerprint = fingerprint(&rows);
        Self {
            rows,
            columns,
            row_ordinals,
            value_count,
            range,
            fingerprint,
        }
    }

    /// Builds both views from a flat list of facts, e.g. one read back from disk.
    pub fn from_facts(facts: impl IntoIterator<Item = Fact>) -> Result<Self> {
        let staging = MutableBuffer::new(1);
        staging.load(facts)?;
        Ok(Self::from_views(staging.views(None)?))
    }

    pub fn empty() -> Self {
        Self::from_views(BufferViews::default())
    }

    /// Checks that both views hold exactly the same facts.
    pub fn verify(&self) -> Result<()> {
        let column_values: u64 = self.columns.values().map(|c| c.len() as u64).sum();
        if column_values != self.value_count {
            return Err(CellbaseError::InternalConsistency(format!(
                "row-major view holds {} values, column-major view holds {}",
                self.value_count, column_values
            )));
        }
        for (column, observations) in self.columns.iter() {
            for observation in observations {
                let found = self.rows.get(&observation.row).and_then(|row| {
                    row.binary_search_by(|o| {
                        (&o.column, o.ts).cmp(&(column, observation.ts))
                    })
                    .ok()
                    .map(|i| &row[i].value)
                });
                if found != Some(&observation.value) {
                    return Err(CellbaseError::InternalConsistency(format!(
                        "[{}, {}, {}] is missing from the row-major view",
                        observation.row, column, observation.ts
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn row_count(&self) -> u64 {
        self.rows.len() as u64
    }
    pub fn column_count(&self) -> u64 {
        self.columns.len() as u64
    }
    pub fn value_count(&self) -> u64 {
        self.value_count
    }
    pub fn timestamp_range(&self) -> TimestampRange {
        self.range
    }
    /// BLAKE3 digest (hex) over the facts in row-major order.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
    pub fn row_paths(&self) -> impl Iterator<Item = &RowPath> {
        self.rows.keys()
    }
    pub fn column_paths(&self) -> impl Iterator<Item = &ColumnPath> {
        self.columns.keys()
    }
    pub fn row(&self, path: &RowPath) -> Option<&[Observation]> {
        self.rows.get(path).map(Vec::as_slice)
    }
    pub fn column(&self, path: &ColumnPath) -> Option<&[ColumnObservation]> {
        self.columns.get(path).map(Vec::as_slice)
    }
    pub fn columns(&self) -> impl Iterator<Item = (&ColumnPath, &[ColumnObservation])> {
        self.columns.iter().map(|(c, o)| (c, o.as_slice()))
    }
    pub fn row_ordinal(&self, path: &RowPath) -> Option<u64> {
        self.row_ordinals.get_by_left(path).copied()
    }
    pub fn row_path(&self, ordinal: u64) -> Option<&RowPath> {
        self.row_ordinals.get_by_right(&ordinal)
    }
    pub fn facts_row_major(&self) -> impl Iterator<Item = Fact> + '_ {
        self.rows.iter().flat_map(|(row, observations)| {
            observations.iter().map(move |o| Fact {
                row: row.clone(),
                column: o.column.clone(),
                ts: o.ts,
                value: o.value.clone(),
            })
        })
    }
    pub fn facts_column_major(&self) -> impl Iterator<Item = Fact> + '_ {
        self.columns.iter().flat_map(|(column, observations)| {
            observations.iter().map(move |o| Fact {
                row: o.row.clone(),
                column: column.clone(),
                ts: o.ts,
                value: o.value.clone(),
            })
        })
    }
}

fn fingerprint(rows: &BTreeMap<RowPath, Vec<Observation>>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (row, observations) in rows.iter() {
        for observation in observations {
            digest_path(&mut hasher, row);
            digest_path(&mut hasher, &observation.column);
            hasher.update(&observation.ts.micros().to_le_bytes());
            digest_value(&mut hasher, &observation.value);
        }
    }
    hasher.finalize().to_hex().to_string()
}

fn digest_path(hasher: &mut blake3::Hasher, path: &Path) {
    hasher.update(&(path.len() as u64).to_le_bytes());
    for segment in path.segments() {
        hasher.update(&(segment.len() as u64).to_le_bytes());
        hasher.update(segment.as_bytes());
    }
}

fn digest_value(hasher: &mut blake3::Hasher, value: &CellValue) {
    hasher.update(&[value.uid()]);
    match value {
        CellValue::Null => (),
        CellValue::Integer(i) => {
            hasher.update(&i.to_le_bytes());
        }
        CellValue::Float(x) => {
            hasher.update(&x.to_bits().to_le_bytes());
        }
        CellValue::String(s) => {
            hasher.update(&(s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        CellValue::Blob(b) => {
            hasher.update(&(b.len() as u64).to_le_bytes());
            hasher.update(b);
        }
        CellValue::Timestamp(d) => {
            hasher.update(&d.micros().to_le_bytes());
        }
        CellValue::Interval(i) => {
            hasher.update(&i.months.to_le_bytes());
            hasher.update(&i.days.to_le_bytes());
            hasher.update(&i.seconds.to_bits().to_le_bytes());
        }
    }
}
