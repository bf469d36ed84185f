use serde::{Deserialize, Serialize};

use crate::buffer::DEFAULT_SHARDS;
use crate::error::{CellbaseError, Result};
use crate::persist::IN_MEMORY;
use crate::registry::DatasetConfig;

/// Process-level settings: built-in defaults, then a settings file, then
/// `CELLBASE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub shards: usize,
    pub default_type: String,
    #[serde(default)]
    pub sqlite_path: Option<String>,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shards: DEFAULT_SHARDS,
            default_type: "memory".into(),
            sqlite_path: None,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    /// Without a `path`, a `cellbase.{toml,json,yaml,..}` in the working directory is used if present.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let defaults = Settings::default();
        let builder = config::Config::builder()
            .set_default("shards", defaults.shards as i64)?
            .set_default("default_type", defaults.default_type)?
            .set_default("log_filter", defaults.log_filter)?;

        let builder = if let Some(path) = path {
            builder.add_source(config::File::with_name(path))
        } else {
            builder.add_source(config::File::with_name("cellbase").required(false))
        };

        let settings: Settings = builder
            .add_source(config::Environment::with_prefix("CELLBASE").try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shards == 0 {
            return Err(CellbaseError::Config("shards must be at least 1".into()));
        }
        if self.default_type.is_empty() {
            return Err(CellbaseError::Config("default_type must not be empty".into()));
        }
        Ok(())
    }

    /// A dataset configuration carrying these settings as parameters.
    pub fn dataset_config(&self, type_name: Option<&str>, id: Option<&str>) -> DatasetConfig {
        let type_name = type_name.unwrap_or(&self.default_type);
        let mut config = DatasetConfig::new(type_name).with_param("shards", self.shards);
        if type_name == "sqlite" {
            let path = self.sqlite_path.as_deref().unwrap_or(IN_MEMORY);
            config = config.with_param("path", path);
        }
        match id {
            Some(id) => config.with_id(id),
            None => config,
        }
    }
}
