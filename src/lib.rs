//! Cellbase – a timestamped, column-oriented dataset engine.
//!
//! A dataset accumulates *observations*: facts of the form
//! `(RowPath, ColumnPath, CellValue, Date)`, read as "this column of this row
//! had this value at this time". Observations are event-sourced, so one
//! `(row, column)` pair may carry many values over time.
//!
//! Facts are ingested either row-major ([`dataset::Dataset::record_row`]) or
//! column-major ([`dataset::Dataset::record_column`]). Both shapes go through a
//! single entry point in the [`buffer::MutableBuffer`] that updates a row view
//! and a column view together, so reading either view always yields the same
//! fact set.
//!
//! [`dataset::Dataset::commit`] is a one-way barrier: it drains in-flight
//! writers, freezes the buffer into a [`frozen::FrozenStore`], verifies that
//! both views agree, lets the storage backend make it durable and builds the
//! [`index::ColumnIndex`]. The dataset is read-only from then on.
//!
//! ## Modules
//! * [`datatype`] – [`datatype::CellValue`], [`datatype::Date`], [`datatype::Interval`] and [`datatype::TimestampRange`].
//! * [`construct`] – Paths, observations, rows and columns.
//! * [`buffer`] – The sharded write buffer and the timestamp tracker.
//! * [`frozen`] / [`index`] – What a committed dataset is read through.
//! * [`storage`] / [`persist`] – The backend trait, with in-memory and SQLite implementations.
//! * [`registry`] – Dataset configuration and the table of dataset types.
//! * [`dataset`] – The façade holding the lifecycle.
//! * [`expression`] / [`binding`] – Nested row values and JSON glue for host runtimes.
//! * [`settings`] – Process-level settings.
//!
//! ## Quick Start
//! ```
//! use cellbase::construct::{Observation, Path};
//! use cellbase::dataset::Dataset;
//! use cellbase::datatype::Date;
//! use cellbase::registry::{DatasetConfig, DatasetTypeRegistry};
//!
//! let registry = DatasetTypeRegistry::builtin();
//! let dataset = Dataset::create(&registry, DatasetConfig::new("memory")).unwrap();
//! let t = Date::parse("2024-01-01").unwrap();
//! dataset
//!     .record_row(Path::parse("user.1").unwrap(), vec![Observation::new("clicks", 3, t)])
//!     .unwrap();
//! dataset.commit().unwrap();
//! assert_eq!(dataset.column_index().unwrap().get_column_paths(), [Path::from("clicks")]);
//! ```

pub mod binding;
pub mod buffer;
pub mod construct;
pub mod dataset;
pub mod datatype;
pub mod error;
pub mod expression;
pub mod frozen;
pub mod index;
pub mod persist;
pub mod registry;
pub mod settings;
pub mod storage;
