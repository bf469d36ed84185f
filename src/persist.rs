// used for persistence
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::buffer::MutableBuffer;
use crate::construct::{Fact, Path};
use crate::datatype::{CellValue, Date};
use crate::error::{CellbaseError, Result};
use crate::frozen::FrozenStore;
use crate::registry::DatasetConfig;
use crate::storage::Storage;

pub const IN_MEMORY: &str = ":memory:";

// ------------- Persistence -------------
/// Buffers in memory like [`crate::storage::MemoryStorage`] and writes the
/// frozen store to SQLite when the dataset commits. Several datasets may
/// share one database file, keyed by their id.
pub struct SqliteStorage {
    buffer: MutableBuffer,
    connection: Mutex<Connection>,
    location: String,
}

impl SqliteStorage {
    pub fn open(location: &str, shards: usize) -> Result<Self> {
        let connection = if location == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            Connection::open(location)?
        };
        // The "STRICT" keyword introduced in 3.37.0 breaks JDBC connections, which makes
        // debugging using an external tool like DBeaver impossible
        connection.execute_batch(
            "
            create table if not exists CellType (
                CellType_Identity integer not null,
                CellType text not null,
                constraint referenceable_CellType_Identity primary key (
                    CellType_Identity
                ),
                constraint unique_CellType unique (
                    CellType
                )
            );-- STRICT;
            create table if not exists Dataset (
                Dataset_Identity text not null,
                DatasetType text not null,
                Configuration text not null,
                Fingerprint text not null,
                CommittedAt integer not null,
                constraint referenceable_Dataset_Identity primary key (
                    Dataset_Identity
                )
            );-- STRICT;
            create table if not exists Observation (
                Dataset_Identity text not null,
                RowPath text not null,
                ColumnPath text not null,
                AppearanceTime integer not null,
                CellValue blob null,
                CellType_Identity integer not null,
                constraint Observation_in_Dataset foreign key (
                    Dataset_Identity
                ) references Dataset(Dataset_Identity),
                constraint CellType_is_CellType foreign key (
                    CellType_Identity
                ) references CellType(CellType_Identity),
                constraint unique_Observation primary key (
                    Dataset_Identity,
                    RowPath,
                    ColumnPath,
                    AppearanceTime
                )
            );-- STRICT;
            ",
        )?;
        debug!(location, "opened sqlite storage");
        Ok(Self {
            buffer: MutableBuffer::new(shards),
            connection: Mutex::new(connection),
            location: location.to_owned(),
        })
    }
    pub fn location(&self) -> &str {
        &self.location
    }
    /// Ids of every dataset committed into this database.
    pub fn committed_ids(&self) -> Result<Vec<String>> {
        let connection = self.connection.lock()?;
        let mut statement = connection.prepare_cached(
            "
            select Dataset_Identity
                from Dataset
                order by Dataset_Identity
        ",
        )?;
        let ids = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

impl Storage for SqliteStorage {
    fn kind(&self) -> &'static str {
        "sqlite"
    }
    fn buffer(&self) -> &MutableBuffer {
        &self.buffer
    }
    fn seal(&self, config: &DatasetConfig, frozen: &FrozenStore) -> Result<()> {
        let id = config.require_id()?;
        let mut connection = self.connection.lock()?;
        let transaction = connection.transaction()?;
        {
            let existing = transaction
                .query_row(
                    "select Fingerprint from Dataset where Dataset_Identity = ?",
                    params![id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            if existing.is_some() {
                return Err(CellbaseError::InvalidState(format!(
                    "dataset '{}' is already persisted in {}",
                    id, self.location
                )));
            }
            let mut add_cell_type = transaction.prepare_cached(
                "
                insert or ignore into CellType (
                    CellType_Identity,
                    CellType
                ) values (?, ?)
            ",
            )?;
            for (uid, name) in CellValue::ALL_TYPES {
                add_cell_type.execute(params![uid, name])?;
            }
            transaction.execute(
                "
                insert into Dataset (
                    Dataset_Identity,
                    DatasetType,
                    Configuration,
                    Fingerprint,
                    CommittedAt
                ) values (?, ?, ?, ?, ?)
            ",
                params![
                    id,
                    config.type_name,
                    serde_json::to_string(config)?,
                    frozen.fingerprint(),
                    Date::now().micros()
                ],
            )?;
            let mut add_observation = transaction.prepare_cached(
                "
                insert into Observation (
                    Dataset_Identity,
                    RowPath,
                    ColumnPath,
                    AppearanceTime,
                    CellValue,
                    CellType_Identity
                ) values (?, ?, ?, ?, ?, ?)
            ",
            )?;
            for fact in frozen.facts_row_major() {
                add_observation.execute(params![
                    id,
                    fact.row.to_string(),
                    fact.column.to_string(),
                    fact.ts.micros(),
                    &fact.value,
                    fact.value.uid()
                ])?;
            }
        }
        transaction.commit()?;
        info!(dataset = %id, values = frozen.value_count(), location = %self.location, "sealed dataset");
        Ok(())
    }
    fn restore(&self, config: &DatasetConfig) -> Result<Option<FrozenStore>> {
        let id = config.require_id()?;
        let connection = self.connection.lock()?;
        let fingerprint = connection
            .query_row(
                "select Fingerprint from Dataset where Dataset_Identity = ?",
                params![id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        let fingerprint = match fingerprint {
            Some(fingerprint) => fingerprint,
            None => return Ok(None),
        };
        let mut all_observations = connection.prepare_cached(
            "
            select RowPath,
                   ColumnPath,
                   AppearanceTime,
                   CellValue,
                   CellType_Identity
                from Observation
                where Dataset_Identity = ?
        ",
        )?;
        let mut facts = Vec::new();
        let mut rows = all_observations.query(params![id])?;
        while let Some(row) = rows.next()? {
            let row_path: String = row.get(0)?;
            let column_path: String = row.get(1)?;
            let uid: u8 = row.get(4)?;
            facts.push(Fact {
                row: restore_path(&row_path)?,
                column: restore_path(&column_path)?,
                ts: Date::from_micros(row.get(2)?),
                value: CellValue::from_sql(uid, row.get_ref(3)?)?,
            });
        }
        let frozen = FrozenStore::from_facts(facts)?;
        if frozen.fingerprint() != fingerprint {
            return Err(CellbaseError::DataCorruption {
                message: format!(
                    "dataset '{}' in {} does not match its recorded fingerprint",
                    id, self.location
                ),
            });
        }
        Ok(Some(frozen))
    }
}

fn restore_path(text: &str) -> Result<Path> {
    Path::parse(text).map_err(|_| CellbaseError::DataCorruption {
        message: format!("stored path '{}' cannot be parsed", text),
    })
}
