//! The write side of a dataset.
//!
//! A [`MutableBuffer`] keeps two independent index structures over the same
//! fact set: a row-major one (row → (column, ts) → value) and a column-major
//! one (column → (row, ts) → value). Every ingestion call funnels into
//! [`MutableBuffer::apply`], which locks all touched row shards and then all
//! touched column shards (each group in ascending shard order) and writes the
//! facts into both structures before releasing anything. Calls for different
//! paths that land in different shards proceed in parallel, calls sharing a
//! path are linearized by that path's shard lock.
//!
//! The buffer does not guard against ingestion racing a whole-buffer read;
//! that barrier belongs to the owning dataset.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::error;

use crate::construct::{
    Column, ColumnObservation, ColumnPath, Fact, Observation, PathHasher, Row, RowPath,
};
use crate::dataset::CancelToken;
use crate::datatype::{CellValue, Date, TimestampRange};
use crate::error::{CellbaseError, Result};

pub const DEFAULT_SHARDS: usize = 16;

type RowEntries = BTreeMap<(ColumnPath, Date), CellValue>;
type ColumnEntries = BTreeMap<(RowPath, Date), CellValue>;

#[derive(Debug, Default)]
struct RowShard {
    rows: HashMap<RowPath, RowEntries, PathHasher>,
}

#[derive(Debug, Default)]
struct ColumnShard {
    columns: HashMap<ColumnPath, ColumnEntries, PathHasher>,
}

// ------------- TimestampTracker -------------
/// Global earliest/latest timestamp, widened in O(1) per observation.
#[derive(Debug)]
pub struct TimestampTracker {
    earliest: AtomicI64,
    latest: AtomicI64,
}

impl TimestampTracker {
    pub fn new() -> Self {
        Self {
            earliest: AtomicI64::new(i64::MAX),
            latest: AtomicI64::new(i64::MIN),
        }
    }
    pub fn observe(&self, ts: Date) {
        let ts = ts.micros();
        self.earliest.fetch_min(ts, Ordering::Relaxed);
        self.latest.fetch_max(ts, Ordering::Relaxed);
    }
    pub fn range(&self) -> TimestampRange {
        TimestampRange::new(
            Date::from_micros(self.earliest.load(Ordering::Relaxed)),
            Date::from_micros(self.latest.load(Ordering::Relaxed)),
        )
    }
    pub fn reset(&self) {
        self.earliest.store(i64::MAX, Ordering::Relaxed);
        self.latest.store(i64::MIN, Ordering::Relaxed);
    }
}
impl Default for TimestampTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- BufferStats -------------
#[derive(Debug, Default)]
pub struct BufferStats {
    rows: AtomicU64,
    columns: AtomicU64,
    values: AtomicU64,
}

impl BufferStats {
    pub fn row_count(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }
    pub fn column_count(&self) -> u64 {
        self.columns.load(Ordering::Relaxed)
    }
    pub fn value_count(&self) -> u64 {
        self.values.load(Ordering::Relaxed)
    }
    fn reset(&self) {
        self.rows.store(0, Ordering::Relaxed);
        self.columns.store(0, Ordering::Relaxed);
        self.values.store(0, Ordering::Relaxed);
    }
}

/// Both views copied out of a buffer, ordered by path.
#[derive(Debug, Default)]
pub struct BufferViews {
    pub rows: BTreeMap<RowPath, Vec<Observation>>,
    pub columns: BTreeMap<ColumnPath, Vec<ColumnObservation>>,
}

// ------------- MutableBuffer -------------
#[derive(Debug)]
pub struct MutableBuffer {
    row_shards: Vec<Mutex<RowShard>>,
    column_shards: Vec<Mutex<ColumnShard>>,
    tracker: TimestampTracker,
    stats: BufferStats,
}

impl MutableBuffer {
    pub fn new(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            row_shards: (0..shards).map(|_| Mutex::new(RowShard::default())).collect(),
            column_shards: (0..shards).map(|_| Mutex::new(ColumnShard::default())).collect(),
            tracker: TimestampTracker::new(),
            stats: BufferStats::default(),
        }
    }
    pub fn shards(&self) -> usize {
        self.row_shards.len()
    }
    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }
    pub fn timestamp_range(&self) -> TimestampRange {
        self.tracker.range()
    }

    /// Records one row; returns the number of previously unseen facts.
    pub fn record_row(&self, path: &RowPath, observations: Vec<Observation>) -> Result<u64> {
        if observations.is_empty() {
            return Ok(0);
        }
        require_path(path, "row")?;
        let facts = observations
            .into_iter()
            .map(|o| {
                require_path(&o.column, "column")?;
                Ok(Fact {
                    row: path.clone(),
                    column: o.column,
                    ts: o.ts,
                    value: o.value,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.apply(facts)
    }

    /// Records one column; mirrored into the row-major view.
    pub fn record_column(
        &self,
        path: &ColumnPath,
        observations: Vec<ColumnObservation>,
    ) -> Result<u64> {
        if observations.is_empty() {
            return Ok(0);
        }
        require_path(path, "column")?;
        let facts = observations
            .into_iter()
            .map(|o| {
                require_path(&o.row, "row")?;
                Ok(Fact {
                    row: o.row,
                    column: path.clone(),
                    ts: o.ts,
                    value: o.value,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.apply(facts)
    }

    /// Fail-fast batch: rows before a failing one stay recorded.
    pub fn record_rows(&self, rows: Vec<Row>) -> Result<u64> {
        let mut added = 0;
        for row in rows {
            added += self.record_row(&row.path, row.observations)?;
        }
        Ok(added)
    }

    pub fn record_columns(&self, columns: Vec<Column>) -> Result<u64> {
        let mut added = 0;
        for column in columns {
            added += self.record_column(&column.path, column.observations)?;
        }
        Ok(added)
    }

    /// The single entry point both ingestion shapes go through.
    fn apply(&self, facts: Vec<Fact>) -> Result<u64> {
        let row_indexes: BTreeSet<usize> =
            facts.iter().map(|f| self.shard_of(&f.row)).collect();
        let column_indexes: BTreeSet<usize> =
            facts.iter().map(|f| self.shard_of(&f.column)).collect();

        // all row shards before any column shard, ascending within each group
        let mut row_guards: BTreeMap<usize, MutexGuard<'_, RowShard>> = BTreeMap::new();
        for i in row_indexes {
            row_guards.insert(i, self.row_shards[i].lock()?);
        }
        let mut column_guards: BTreeMap<usize, MutexGuard<'_, ColumnShard>> = BTreeMap::new();
        for i in column_indexes {
            column_guards.insert(i, self.column_shards[i].lock()?);
        }

        let mut added = 0;
        for fact in facts {
            let row_shard = row_guards
                .get_mut(&self.shard_of(&fact.row))
                .ok_or_else(|| missing_guard(&fact))?;
            if !row_shard.rows.contains_key(&fact.row) {
                self.stats.rows.fetch_add(1, Ordering::Relaxed);
            }
            let row_entries = row_shard.rows.entry(fact.row.clone()).or_default();
            let previous_in_row =
                row_entries.insert((fact.column.clone(), fact.ts), fact.value.clone());

            let column_shard = column_guards
                .get_mut(&self.shard_of(&fact.column))
                .ok_or_else(|| missing_guard(&fact))?;
            if !column_shard.columns.contains_key(&fact.column) {
                self.stats.columns.fetch_add(1, Ordering::Relaxed);
            }
            let column_entries = column_shard.columns.entry(fact.column.clone()).or_default();
            let previous_in_column = column_entries.insert((fact.row.clone(), fact.ts), fact.value);

            // both views must agree on whether this (row, column, ts) existed and what it held
            if previous_in_row != previous_in_column {
                error!(row = %fact.row, column = %fact.column, ts = %fact.ts, "row and column views diverged");
                return Err(CellbaseError::InternalConsistency(
                    "row-major and column-major views disagree on a prior value".into(),
                ));
            }
            if previous_in_row.is_none() {
                added += 1;
                self.stats.values.fetch_add(1, Ordering::Relaxed);
            }
            self.tracker.observe(fact.ts);
        }
        Ok(added)
    }

    /// Copies both views out, shard by shard. The cancel token is checked between shards.
    pub fn views(&self, cancel: Option<&CancelToken>) -> Result<BufferViews> {
        let mut views = BufferViews::default();
        for shard in self.row_shards.iter() {
            check_cancel(cancel)?;
            let shard = shard.lock()?;
            for (row, entries) in shard.rows.iter() {
                let observations = entries
                    .iter()
                    .map(|((column, ts), value)| Observation {
                        column: column.clone(),
                        value: value.clone(),
                        ts: *ts,
                    })
                    .collect();
                views.rows.insert(row.clone(), observations);
            }
        }
        for shard in self.column_shards.iter() {
            check_cancel(cancel)?;
            let shard = shard.lock()?;
            for (column, entries) in shard.columns.iter() {
                let observations = entries
                    .iter()
                    .map(|((row, ts), value)| ColumnObservation {
                        row: row.clone(),
                        value: value.clone(),
                        ts: *ts,
                    })
                    .collect();
                views.columns.insert(column.clone(), observations);
            }
        }
        Ok(views)
    }

    /// Loads already-frozen facts back into an empty buffer, e.g. when restoring.
    pub fn load(&self, facts: impl IntoIterator<Item = Fact>) -> Result<u64> {
        self.apply(facts.into_iter().collect())
    }

    pub fn clear(&self) -> Result<()> {
        for shard in self.row_shards.iter() {
            shard.lock()?.rows.clear();
        }
        for shard in self.column_shards.iter() {
            shard.lock()?.columns.clear();
        }
        self.stats.reset();
        self.tracker.reset();
        Ok(())
    }

    fn shard_of(&self, path: &crate::construct::Path) -> usize {
        (path.stable_hash() % self.row_shards.len() as u64) as usize
    }
}
impl Default for MutableBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

fn require_path(path: &crate::construct::Path, what: &str) -> Result<()> {
    if path.is_empty() {
        return Err(CellbaseError::InvalidArgument(format!(
            "{} path must not be empty",
            what
        )));
    }
    Ok(())
}

fn check_cancel(cancel: Option<&CancelToken>) -> Result<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(CellbaseError::Cancelled),
        _ => Ok(()),
    }
}

fn missing_guard(fact: &Fact) -> CellbaseError {
    CellbaseError::InternalConsistency(format!("no shard lock held for {}", fact))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::Path;

    fn ts(micros: i64) -> Date {
        Date::from_micros(micros)
    }

    #[test]
    fn rows_show_up_in_the_column_view() {
        let buffer = MutableBuffer::new(4);
        let added = buffer
            .record_row(
                &Path::from("user1"),
                vec![
                    Observation::new("clicks", 3, ts(1)),
                    Observation::new("country", "CA", ts(1)),
                ],
            )
            .unwrap();
        assert_eq!(added, 2);
        let views = buffer.views(None).unwrap();
        assert_eq!(views.rows.len(), 1);
        assert_eq!(views.columns.len(), 2);
        let clicks = &views.columns[&Path::from("clicks")];
        assert_eq!(clicks, &vec![ColumnObservation::new("user1", 3, ts(1))]);
    }

    #[test]
    fn same_row_column_and_timestamp_is_last_write_wins() {
        let buffer = MutableBuffer::new(2);
        let row = Path::from("r");
        buffer.record_row(&row, vec![Observation::new("c", 1, ts(5))]).unwrap();
        let added = buffer
            .record_column(&Path::from("c"), vec![ColumnObservation::new("r", 2, ts(5))])
            .unwrap();
        assert_eq!(added, 0);
        assert_eq!(buffer.stats().value_count(), 1);
        let views = buffer.views(None).unwrap();
        assert_eq!(views.rows[&row][0].value, CellValue::Integer(2));
        assert_eq!(views.columns[&Path::from("c")][0].value, CellValue::Integer(2));
    }

    #[test]
    fn invalid_paths_leave_the_buffer_untouched() {
        let buffer = MutableBuffer::new(2);
        let result = buffer.record_row(
            &Path::from("r"),
            vec![
                Observation::new("ok", 1, ts(1)),
                Observation::new(Path::root(), 2, ts(1)),
            ],
        );
        assert!(matches!(result, Err(CellbaseError::InvalidArgument(_))));
        assert_eq!(buffer.stats().value_count(), 0);
        assert!(buffer.timestamp_range().is_empty());
    }

    #[test]
    fn tracker_widens_only_outside_the_range() {
        let tracker = TimestampTracker::new();
        assert!(tracker.range().is_empty());
        tracker.observe(ts(10));
        tracker.observe(ts(20));
        tracker.observe(ts(15));
        assert_eq!(tracker.range(), TimestampRange::new(ts(10), ts(20)));
        tracker.observe(ts(-5));
        assert_eq!(tracker.range().earliest(), Some(ts(-5)));
    }

    #[test]
    fn cancelled_views_stop_early() {
        let buffer = MutableBuffer::new(2);
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(buffer.views(Some(&token)), Err(CellbaseError::Cancelled)));
    }
}
