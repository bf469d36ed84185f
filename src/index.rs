//! Catalog of the columns a dataset knows about.

use std::collections::BTreeMap;

// row membership is kept as bitsets of row ordinals, so columns can be "joined"
use roaring::RoaringTreemap;
use serde::Serialize;

use crate::construct::{ColumnPath, Path};
use crate::datatype::TimestampRange;
use crate::frozen::FrozenStore;

#[derive(Debug, Clone, Serialize)]
pub struct ColumnStats {
    /// Distinct rows with at least one value in the column.
    pub row_count: u64,
    pub value_count: u64,
    pub timestamp_range: TimestampRange,
    #[serde(skip)]
    rows: RoaringTreemap,
}

/// Built once from a frozen store and never mutated afterwards.
///
/// Paths are kept in ascending [`Path`] order, so equal inputs always list
/// their columns identically.
#[derive(Debug, Default)]
pub struct ColumnIndex {
    columns: BTreeMap<ColumnPath, ColumnStats>,
}

impl ColumnIndex {
    pub fn build(store: &FrozenStore) -> Self {
        let mut columns = BTreeMap::new();
        for (column, observations) in store.columns() {
            let mut rows = RoaringTreemap::new();
            let mut timestamp_range = TimestampRange::EMPTY;
            for observation in observations {
                if let Some(ordinal) = store.row_ordinal(&observation.row) {
                    rows.insert(ordinal);
                }
                timestamp_range.extend(observation.ts);
            }
            columns.insert(
                column.clone(),
                ColumnStats {
                    row_count: rows.len(),
                    value_count: observations.len() as u64,
                    timestamp_range,
                    rows,
                },
            );
        }
        Self { columns }
    }

    pub fn get_column_paths(&self) -> Vec<ColumnPath> {
        self.columns.keys().cloned().collect()
    }
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
    pub fn contains(&self, column: &ColumnPath) -> bool {
        self.columns.contains_key(column)
    }
    pub fn stats(&self, column: &ColumnPath) -> Option<&ColumnStats> {
        self.columns.get(column)
    }
    /// Every known column at or below `prefix`, in path order.
    pub fn columns_under(&self, prefix: &Path) -> Vec<ColumnPath> {
        // descendants of a prefix sort contiguously, starting at the prefix itself
        self.columns
            .range(prefix.clone()..)
            .take_while(|(column, _)| column.starts_with(prefix))
            .map(|(column, _)| column.clone())
            .collect()
    }
    /// Ordinals of the rows holding the column; see [`FrozenStore::row_path`].
    pub fn rows_with_column(&self, column: &ColumnPath) -> Option<&RoaringTreemap> {
        self.columns.get(column).map(|stats| &stats.rows)
    }
    /// Ordinals of the rows holding every one of the columns.
    pub fn rows_with_all(&self, columns: &[ColumnPath]) -> RoaringTreemap {
        let mut result: Option<RoaringTreemap> = None;
        for column in columns {
            let rows = match self.rows_with_column(column) {
                Some(rows) => rows,
                None => return RoaringTreemap::new(),
            };
            result = Some(match result {
                Some(mut so_far) => {
                    so_far &= rows;
                    so_far
                }
                None => rows.clone(),
            });
        }
        result.unwrap_or_default()
    }
}
