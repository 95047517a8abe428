//! Entity schema inference and validation
//!
//! Before any query is compiled, the entity data is described as an
//! [`EntitySchema`] (column name → canonical type) and checked against what
//! the requested feature views need:
//! - every join key of every view is present
//! - an event timestamp column exists (inferred when not given)
//!
//! ## Example Usage
//!
//! ```rust
//! use featurehive_core::types::{ColumnSchema, ValueType};
//! use featurehive_core::validation::{EntitySchema, ExpectedJoinKey};
//!
//! let schema = EntitySchema::new(vec![
//!     ColumnSchema::new("driver_id", ValueType::Int64),
//!     ColumnSchema::new("event_timestamp", ValueType::Timestamp),
//! ]);
//! let ts = schema.infer_event_timestamp_column().unwrap();
//! schema
//!     .assert_expected_columns(&[ExpectedJoinKey::new("driver_stats", "driver_id")], &ts)
//!     .unwrap();
//! ```

use crate::error::{Error, Result};
use crate::table::ResultTable;
use crate::type_map::resolve_arrow_type;
use crate::types::{ColumnSchema, ValueType};
use arrow::array::RecordBatch;

/// Preferred name of the entity event timestamp column
pub const DEFAULT_ENTITY_TIMESTAMP_COLUMN: &str = "event_timestamp";

/// A join key some feature view requires from the entity data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedJoinKey {
    pub feature_view: String,
    pub join_key: String,
}

impl ExpectedJoinKey {
    pub fn new(feature_view: impl Into<String>, join_key: impl Into<String>) -> Self {
        Self {
            feature_view: feature_view.into(),
            join_key: join_key.into(),
        }
    }
}

/// Ordered column name → canonical type mapping of the entity data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    columns: Vec<ColumnSchema>,
}

impl EntitySchema {
    pub fn new(columns: Vec<ColumnSchema>) -> Self {
        Self { columns }
    }

    /// Schema of an in-memory entity batch
    ///
    /// Fails with `UnsupportedColumnType` on the first column without a
    /// canonical type (lists, structs, maps, ...).
    pub fn from_record_batch(batch: &RecordBatch) -> Result<Self> {
        let columns = batch
            .schema()
            .fields()
            .iter()
            .map(|f| {
                resolve_arrow_type(f.name(), f.data_type())
                    .map(|t| ColumnSchema::new(f.name().clone(), t))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    /// Schema of a materialized query result (e.g. a one-row probe)
    pub fn from_table(table: &ResultTable) -> Self {
        Self {
            columns: table.columns().to_vec(),
        }
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<ValueType> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value_type)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Picks the entity event timestamp column
    ///
    /// A column named `event_timestamp` wins; otherwise the schema must have
    /// exactly one timestamp-typed column.
    pub fn infer_event_timestamp_column(&self) -> Result<String> {
        if self.contains(DEFAULT_ENTITY_TIMESTAMP_COLUMN) {
            return Ok(DEFAULT_ENTITY_TIMESTAMP_COLUMN.to_string());
        }

        let candidates: Vec<&ColumnSchema> = self
            .columns
            .iter()
            .filter(|c| c.value_type == ValueType::Timestamp)
            .collect();
        match candidates.as_slice() {
            [only] => Ok(only.name.clone()),
            [] => Err(Error::MissingTimestampColumn(format!(
                "no '{}' column and no timestamp-typed column among [{}]",
                DEFAULT_ENTITY_TIMESTAMP_COLUMN,
                self.column_names().join(", ")
            ))),
            many => Err(Error::MissingTimestampColumn(format!(
                "ambiguous timestamp columns [{}]; name one '{}'",
                many.iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                DEFAULT_ENTITY_TIMESTAMP_COLUMN
            ))),
        }
    }

    /// Asserts that every expected join key and the timestamp column exist
    pub fn assert_expected_columns(
        &self,
        expected_join_keys: &[ExpectedJoinKey],
        event_timestamp_column: &str,
    ) -> Result<()> {
        for expected in expected_join_keys {
            if !self.contains(&expected.join_key) {
                return Err(Error::MissingJoinKey {
                    feature_view: expected.feature_view.clone(),
                    join_key: expected.join_key.clone(),
                });
            }
        }

        if !self.contains(event_timestamp_column) {
            return Err(Error::MissingTimestampColumn(format!(
                "'{}' is not an entity column",
                event_timestamp_column
            )));
        }
        Ok(())
    }
}
