//! Dataset configuration and the table of known dataset types.
//!
//! There is no process-wide registry: a [`DatasetTypeRegistry`] is built by
//! the caller (usually via [`DatasetTypeRegistry::builtin`]) and handed to
//! [`crate::dataset::Dataset::create`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer::DEFAULT_SHARDS;
use crate::construct::OtherHasher;
use crate::error::{CellbaseError, Result};
use crate::persist::{SqliteStorage, IN_MEMORY};
use crate::storage::{MemoryStorage, Storage};

// ------------- DatasetConfig -------------
/// The construction parameters of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl DatasetConfig {
    pub fn new<S: Into<String>>(type_name: S) -> Self {
        Self {
            id: None,
            type_name: type_name.into(),
            params: serde_json::Value::Null,
        }
    }
    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }
    pub fn with_param<V: Into<serde_json::Value>>(mut self, key: &str, value: V) -> Self {
        if !self.params.is_object() {
            self.params = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(params) = self.params.as_object_mut() {
            params.insert(key.to_owned(), value.into());
        }
        self
    }
    pub fn require_id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| CellbaseError::InvalidState("dataset has no id assigned".into()))
    }
    pub fn param_usize(&self, key: &str) -> Result<Option<usize>> {
        match self.params.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .and_then(|v| usize::try_from(v).ok())
                .map(Some)
                .ok_or_else(|| {
                    CellbaseError::InvalidArgument(format!(
                        "parameter '{}' must be a non-negative integer, got {}",
                        key, value
                    ))
                }),
        }
    }
    pub fn param_str(&self, key: &str) -> Result<Option<&str>> {
        match self.params.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(s)) => Ok(Some(s.as_str())),
            Some(value) => Err(CellbaseError::InvalidArgument(format!(
                "parameter '{}' must be a string, got {}",
                key, value
            ))),
        }
    }
    fn shards(&self) -> Result<usize> {
        match self.param_usize("shards")? {
            Some(0) => Err(CellbaseError::InvalidArgument(
                "parameter 'shards' must be at least 1".into(),
            )),
            Some(shards) => Ok(shards),
            None => Ok(DEFAULT_SHARDS),
        }
    }
}

// ------------- DatasetTypeRegistry -------------
pub type StorageFactory = fn(&DatasetConfig) -> Result<Box<dyn Storage>>;

#[derive(Clone)]
pub struct DatasetType {
    name: String,
    description: String,
    factory: StorageFactory,
}
impl DatasetType {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn description(&self) -> &str {
        &self.description
    }
}
impl fmt::Debug for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DatasetType({}: {})", self.name, self.description)
    }
}

#[derive(Debug, Default, Clone)]
pub struct DatasetTypeRegistry {
    types: HashMap<String, DatasetType, OtherHasher>,
}

impl DatasetTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    /// A registry holding the `memory` and `sqlite` types.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        // names are fresh, so these cannot collide
        let _ = registry.register(
            "memory",
            "In-memory dataset, lost when the process exits",
            memory_factory,
        );
        let _ = registry.register(
            "sqlite",
            "Dataset persisted into a SQLite database when committed",
            sqlite_factory,
        );
        registry
    }
    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        factory: StorageFactory,
    ) -> Result<()> {
        if self.types.contains_key(name) {
            return Err(CellbaseError::InvalidArgument(format!(
                "dataset type '{}' is already registered",
                name
            )));
        }
        debug!(name, "registered dataset type");
        self.types.insert(
            name.to_owned(),
            DatasetType {
                name: name.to_owned(),
                description: description.to_owned(),
                factory,
            },
        );
        Ok(())
    }
    pub fn get(&self, name: &str) -> Option<&DatasetType> {
        self.types.get(name)
    }
    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
    pub fn create_storage(&self, config: &DatasetConfig) -> Result<Box<dyn Storage>> {
        let dataset_type = self.types.get(&config.type_name).ok_or_else(|| {
            CellbaseError::InvalidArgument(format!(
                "unknown dataset type '{}'; known types are {:?}",
                config.type_name,
                self.types()
            ))
        })?;
        (dataset_type.factory)(config)
    }
}

fn memory_factory(config: &DatasetConfig) -> Result<Box<dyn Storage>> {
    Ok(Box::new(MemoryStorage::new(config.shards()?)))
}

fn sqlite_factory(config: &DatasetConfig) -> Result<Box<dyn Storage>> {
    let location = config.param_str("path")?.unwrap_or(IN_MEMORY);
    Ok(Box::new(SqliteStorage::open(location, config.shards()?)?))
}
