//! Storage backends.
//!
//! A backend provides the capability set a dataset needs: ingest into a
//! mutable buffer, freeze that buffer into a [`FrozenStore`], index the frozen
//! store and answer timestamp range queries. Backends are chosen when a
//! dataset is constructed, through the [`crate::registry::DatasetTypeRegistry`].

use crate::buffer::MutableBuffer;
use crate::construct::{Column, Row};
use crate::dataset::CancelToken;
use crate::datatype::TimestampRange;
use crate::error::Result;
use crate::frozen::FrozenStore;
use crate::index::ColumnIndex;
use crate::registry::DatasetConfig;

pub trait Storage: Send + Sync {
    /// The backend kind, e.g. `"memory"`.
    fn kind(&self) -> &'static str;
    fn buffer(&self) -> &MutableBuffer;
    /// Makes a frozen store durable. Called once, after the store passed verification.
    fn seal(&self, config: &DatasetConfig, frozen: &FrozenStore) -> Result<()>;
    /// Reads back a store sealed earlier under the same dataset id, if any.
    fn restore(&self, config: &DatasetConfig) -> Result<Option<FrozenStore>>;

    fn ingest_rows(&self, rows: Vec<Row>) -> Result<u64> {
        self.buffer().record_rows(rows)
    }
    fn ingest_columns(&self, columns: Vec<Column>) -> Result<u64> {
        self.buffer().record_columns(columns)
    }
    fn freeze(&self, cancel: &CancelToken) -> Result<FrozenStore> {
        let views = self.buffer().views(Some(cancel))?;
        Ok(FrozenStore::from_views(views))
    }
    fn index(&self, frozen: &FrozenStore) -> ColumnIndex {
        ColumnIndex::build(frozen)
    }
    fn live_range(&self) -> TimestampRange {
        self.buffer().timestamp_range()
    }
    /// Drops buffered data once the frozen store has taken over.
    fn release(&self) -> Result<()> {
        self.buffer().clear()
    }
}

// ------------- MemoryStorage -------------
/// Keeps everything in process memory; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buffer: MutableBuffer,
}

impl MemoryStorage {
    pub fn new(shards: usize) -> Self {
        Self {
            buffer: MutableBuffer::new(shards),
        }
    }
}

impl Storage for MemoryStorage {
    fn kind(&self) -> &'static str {
        "memory"
    }
    fn buffer(&self) -> &MutableBuffer {
        &self.buffer
    }
    fn seal(&self, _config: &DatasetConfig, _frozen: &FrozenStore) -> Result<()> {
        Ok(())
    }
    fn restore(&self, _config: &DatasetConfig) -> Result<Option<FrozenStore>> {
        Ok(None)
    }
}
