//! The dataset façade: lifecycle, ingestion, commit and query-time accessors.
//!
//! ```text
//! Open ──commit()──▶ Committing ──▶ Committed
//!   ▲                   │
//!   └──── cancelled ────┤
//!                       └── consistency failure ──▶ Degraded
//! ```
//!
//! Ingestion holds the lifecycle lock shared for the duration of the call, so
//! `commit()` taking it exclusively is the drain barrier: it waits for every
//! in-flight call, flips the state to `Committing` and from then on new calls
//! are rejected with `InvalidState`. Committing a committed dataset again is a
//! no-op reporting [`CommitOutcome::AlreadyCommitted`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::construct::{Column, ColumnObservation, ColumnPath, Observation, Row, RowPath};
use crate::datatype::{Date, TimestampRange};
use crate::error::{CellbaseError, Result};
use crate::expression::ExpressionValue;
use crate::frozen::FrozenStore;
use crate::index::ColumnIndex;
use crate::registry::{DatasetConfig, DatasetTypeRegistry};
use crate::storage::Storage;

/// Cancellation token for long-running operations such as commit.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);
impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Open,
    Committing,
    Committed,
    Degraded,
}
impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Lifecycle::Open => "open",
            Lifecycle::Committing => "committing",
            Lifecycle::Committed => "committed",
            Lifecycle::Degraded => "degraded",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CommitOutcome {
    Committed,
    AlreadyCommitted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetStatus {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub state: Lifecycle,
    pub row_count: u64,
    pub column_count: u64,
    pub value_count: u64,
    pub timestamp_range: TimestampRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

struct Sealed {
    store: Arc<FrozenStore>,
    index: Arc<ColumnIndex>,
}

// ------------- Dataset -------------
pub struct Dataset {
    id: String,
    config: DatasetConfig,
    storage: Box<dyn Storage>,
    lifecycle: RwLock<Lifecycle>,
    sealed: OnceLock<Sealed>,
}

impl Dataset {
    /// Creates a dataset of the configured type. Backends that persist restore a
    /// previously committed dataset with the same id, which then starts out committed.
    pub fn create(registry: &DatasetTypeRegistry, config: DatasetConfig) -> Result<Dataset> {
        let mut config = config;
        let id = match &config.id {
            Some(id) if id.is_empty() => {
                return Err(CellbaseError::InvalidArgument(
                    "dataset id must not be empty".into(),
                ));
            }
            Some(id) => id.clone(),
            None => generate_id(&config.type_name),
        };
        config.id = Some(id.clone());
        let storage = registry.create_storage(&config)?;
        let dataset = Dataset {
            id,
            config,
            storage,
            lifecycle: RwLock::new(Lifecycle::Open),
            sealed: OnceLock::new(),
        };
        if let Some(store) = dataset.storage.restore(&dataset.config)? {
            store.verify()?;
            let index = dataset.storage.index(&store);
            info!(
                dataset = %dataset.id,
                rows = store.row_count(),
                columns = store.column_count(),
                values = store.value_count(),
                "restored committed dataset"
            );
            dataset.seal_with(store, index)?;
            *dataset.lifecycle.write()? = Lifecycle::Committed;
        } else {
            info!(dataset = %dataset.id, kind = dataset.storage.kind(), "created dataset");
        }
        Ok(dataset)
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    /// The registered type name the dataset was created with.
    pub fn type_name(&self) -> &str {
        &self.config.type_name
    }
    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }
    pub fn lifecycle(&self) -> Result<Lifecycle> {
        Ok(*self.lifecycle.read()?)
    }

    // ------------- ingestion -------------
    pub fn record_row(&self, path: RowPath, observations: Vec<Observation>) -> Result<()> {
        self.ingest("record a row", |storage| {
            storage.ingest_rows(vec![Row::new(path, observations)])
        })
    }
    /// Rows are applied one at a time; a failing row leaves the earlier ones recorded.
    pub fn record_rows(&self, rows: Vec<Row>) -> Result<()> {
        self.ingest("record rows", |storage| storage.ingest_rows(rows))
    }
    pub fn record_column(
        &self,
        path: ColumnPath,
        observations: Vec<ColumnObservation>,
    ) -> Result<()> {
        self.ingest("record a column", |storage| {
            storage.ingest_columns(vec![Column::new(path, observations)])
        })
    }
    pub fn record_columns(&self, columns: Vec<Column>) -> Result<()> {
        self.ingest("record columns", |storage| storage.ingest_columns(columns))
    }
    /// Flattens each row-valued expression and records it as a row, row by row.
    pub fn record_rows_from_expression(
        &self,
        rows: Vec<(RowPath, ExpressionValue)>,
    ) -> Result<()> {
        self.ingest("record rows", |storage| {
            let mut added = 0;
            for (path, expression) in rows {
                let observations = expression.flatten()?;
                added += storage.ingest_rows(vec![Row::new(path, observations)])?;
            }
            Ok(added)
        })
    }

    fn ingest<F>(&self, what: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&dyn Storage) -> Result<u64>,
    {
        let state = self.lifecycle.read()?;
        if *state != Lifecycle::Open {
            return Err(CellbaseError::InvalidState(format!(
                "cannot {} on a {} dataset",
                what, *state
            )));
        }
        match apply(self.storage.as_ref()) {
            Ok(_) => Ok(()),
            Err(e @ CellbaseError::InternalConsistency(_)) => {
                drop(state);
                self.degrade(&e)?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn degrade(&self, cause: &CellbaseError) -> Result<()> {
        error!(dataset = %self.id, error = %cause, "dataset degraded");
        *self.lifecycle.write()? = Lifecycle::Degraded;
        Ok(())
    }

    // ------------- commit -------------
    pub fn commit(&self) -> Result<CommitOutcome> {
        self.commit_with(&CancelToken::new())
    }

    /// Commit with cooperative cancellation. The token is honored until the frozen
    /// store is handed to the backend; after that the commit runs to completion.
    pub fn commit_with(&self, cancel: &CancelToken) -> Result<CommitOutcome> {
        {
            let mut state = self.lifecycle.write()?;
            match *state {
                Lifecycle::Open => *state = Lifecycle::Committing,
                Lifecycle::Committed => {
                    debug!(dataset = %self.id, "commit on a committed dataset ignored");
                    return Ok(CommitOutcome::AlreadyCommitted);
                }
                Lifecycle::Committing => {
                    return Err(CellbaseError::InvalidState(
                        "a commit is already in progress".into(),
                    ));
                }
                Lifecycle::Degraded => {
                    return Err(CellbaseError::InvalidState(
                        "cannot commit a degraded dataset".into(),
                    ));
                }
            }
        }
        info!(dataset = %self.id, "commit started");
        let started = Instant::now();
        match self.finalize(cancel) {
            Ok(store) => {
                *self.lifecycle.write()? = Lifecycle::Committed;
                // the frozen store is already in place, a stale buffer only costs memory
                if let Err(e) = self.storage.release() {
                    warn!(dataset = %self.id, error = %e, "buffer not released after commit");
                }
                info!(
                    dataset = %self.id,
                    rows = store.row_count(),
                    columns = store.column_count(),
                    values = store.value_count(),
                    ms = started.elapsed().as_secs_f64() * 1000.0,
                    "commit complete"
                );
                Ok(CommitOutcome::Committed)
            }
            Err(CellbaseError::Cancelled) => {
                *self.lifecycle.write()? = Lifecycle::Open;
                info!(dataset = %self.id, "commit cancelled");
                Err(CellbaseError::Cancelled)
            }
            Err(e @ CellbaseError::InternalConsistency(_)) => {
                self.degrade(&e)?;
                Err(e)
            }
            Err(e) => {
                *self.lifecycle.write()? = Lifecycle::Open;
                warn!(dataset = %self.id, error = %e, "commit failed");
                Err(e)
            }
        }
    }

    fn finalize(&self, cancel: &CancelToken) -> Result<Arc<FrozenStore>> {
        let store = self.storage.freeze(cancel)?;
        store.verify()?;
        let tracked = self.storage.live_range();
        if store.timestamp_range() != tracked {
            return Err(CellbaseError::InternalConsistency(format!(
                "frozen timestamp range {:?} differs from the tracked range {:?}",
                store.timestamp_range(),
                tracked
            )));
        }
        if cancel.is_cancelled() {
            return Err(CellbaseError::Cancelled);
        }
        self.storage.seal(&self.config, &store)?;
        let index = self.storage.index(&store);
        self.seal_with(store, index)
    }

    fn seal_with(&self, store: FrozenStore, index: ColumnIndex) -> Result<Arc<FrozenStore>> {
        let store = Arc::new(store);
        let sealed = Sealed {
            store: Arc::clone(&store),
            index: Arc::new(index),
        };
        self.sealed.set(sealed).map_err(|_| {
            CellbaseError::InternalConsistency("dataset was sealed twice".into())
        })?;
        Ok(store)
    }

    // ------------- reads -------------
    pub fn status(&self) -> Result<DatasetStatus> {
        let state = self.lifecycle()?;
        let status = match (state, self.sealed.get()) {
            (Lifecycle::Committed, Some(sealed)) => DatasetStatus {
                id: self.id.clone(),
                type_name: self.type_name().to_owned(),
                state,
                row_count: sealed.store.row_count(),
                column_count: sealed.store.column_count(),
                value_count: sealed.store.value_count(),
                timestamp_range: sealed.store.timestamp_range(),
                fingerprint: Some(sealed.store.fingerprint().to_owned()),
            },
            _ => {
                let stats = self.storage.buffer().stats();
                DatasetStatus {
                    id: self.id.clone(),
                    type_name: self.type_name().to_owned(),
                    state,
                    row_count: stats.row_count(),
                    column_count: stats.column_count(),
                    value_count: stats.value_count(),
                    timestamp_range: self.storage.live_range(),
                    fingerprint: None,
                }
            }
        };
        Ok(status)
    }

    /// The frozen column catalog once committed; a live one built from a
    /// consistent snapshot while still open.
    pub fn column_index(&self) -> Result<Arc<ColumnIndex>> {
        if let Some(sealed) = self.committed_seal()? {
            return Ok(Arc::clone(&sealed.index));
        }
        let snapshot = self.live_snapshot()?;
        Ok(Arc::new(self.storage.index(&snapshot)))
    }

    pub fn timestamp_range(&self) -> Result<TimestampRange> {
        if let Some(sealed) = self.committed_seal()? {
            return Ok(sealed.store.timestamp_range());
        }
        Ok(self.storage.live_range())
    }

    /// Read access for the query layer; only available once committed.
    pub fn frozen(&self) -> Result<Arc<FrozenStore>> {
        match self.committed_seal()? {
            Some(sealed) => Ok(Arc::clone(&sealed.store)),
            None => Err(CellbaseError::InvalidState(format!(
                "dataset '{}' is not committed",
                self.id
            ))),
        }
    }

    /// A consistent copy of the buffered facts, taken while no ingestion runs.
    pub fn live_snapshot(&self) -> Result<FrozenStore> {
        let state = self.lifecycle.write()?;
        if *state == Lifecycle::Degraded {
            return Err(CellbaseError::InvalidState(
                "cannot read a degraded dataset".into(),
            ));
        }
        let views = self.storage.buffer().views(None)?;
        Ok(FrozenStore::from_views(views))
    }

    /// Compares the row-major and column-major views; a mismatch degrades the dataset.
    pub fn check_consistency(&self) -> Result<()> {
        let result = match self.committed_seal()? {
            Some(sealed) => sealed.store.verify(),
            None => self.live_snapshot()?.verify(),
        };
        if let Err(e @ CellbaseError::InternalConsistency(_)) = result {
            self.degrade(&e)?;
            return Err(e);
        }
        result
    }

    fn committed_seal(&self) -> Result<Option<&Sealed>> {
        match self.lifecycle()? {
            Lifecycle::Committed => Ok(self.sealed.get()),
            Lifecycle::Degraded => Err(CellbaseError::InvalidState(
                "cannot read a degraded dataset".into(),
            )),
            _ => Ok(None),
        }
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("id", &self.id)
            .field("type", &self.config.type_name)
            .field("kind", &self.storage.kind())
            .finish()
    }
}

static GENERATED: AtomicU64 = AtomicU64::new(0);

fn generate_id(type_name: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(type_name.as_bytes());
    hasher.update(&Date::now().micros().to_le_bytes());
    hasher.update(&GENERATED.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    let digest = hasher.finalize().to_hex();
    format!("{}-{}", type_name, &digest[..16])
}
