//! Core data types for featurehive
//!
//! This module defines the canonical value vocabulary shared by every backend
//! and the feature-view descriptors supplied by the registry.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Canonical, backend-independent value type
///
/// Every column that flows through the offline store (entity columns, feature
/// columns, result columns) is described by one of these types. Backends map
/// their own type names onto this set through the Type Mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    String,
    Timestamp,
    Date,
    Binary,
}

/// Coarse grouping of canonical types
///
/// Backend round-trips may narrow or widen within a category (int32 ↔ int64)
/// but must never move a column to a different category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    Integer,
    Floating,
    Boolean,
    Text,
    Timestamp,
    Date,
    Binary,
}

impl ValueType {
    /// All supported canonical types
    pub const ALL: [ValueType; 9] = [
        ValueType::Int32,
        ValueType::Int64,
        ValueType::Float32,
        ValueType::Float64,
        ValueType::Bool,
        ValueType::String,
        ValueType::Timestamp,
        ValueType::Date,
        ValueType::Binary,
    ];

    pub fn category(self) -> TypeCategory {
        match self {
            ValueType::Int32 | ValueType::Int64 => TypeCategory::Integer,
            ValueType::Float32 | ValueType::Float64 => TypeCategory::Floating,
            ValueType::Bool => TypeCategory::Boolean,
            ValueType::String => TypeCategory::Text,
            ValueType::Timestamp => TypeCategory::Timestamp,
            ValueType::Date => TypeCategory::Date,
            ValueType::Binary => TypeCategory::Binary,
        }
    }

    /// Whether literals of this type are written as quoted strings
    pub fn is_quoted(self) -> bool {
        matches!(
            self,
            ValueType::String | ValueType::Timestamp | ValueType::Date
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Int32 => "int32",
            ValueType::Int64 => "int64",
            ValueType::Float32 => "float32",
            ValueType::Float64 => "float64",
            ValueType::Bool => "bool",
            ValueType::String => "string",
            ValueType::Timestamp => "timestamp",
            ValueType::Date => "date",
            ValueType::Binary => "binary",
        };
        f.write_str(name)
    }
}

/// A single cell value
///
/// `Null` is typeless; every other variant corresponds to exactly one
/// canonical [`ValueType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    String(String),
    /// Timezone-naive timestamp, interpreted as UTC
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Binary(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical type of this value (`None` for `Null`)
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Int32(_) => Some(ValueType::Int32),
            Value::Int64(_) => Some(ValueType::Int64),
            Value::Float32(_) => Some(ValueType::Float32),
            Value::Float64(_) => Some(ValueType::Float64),
            Value::Bool(_) => Some(ValueType::Bool),
            Value::String(_) => Some(ValueType::String),
            Value::Timestamp(_) => Some(ValueType::Timestamp),
            Value::Date(_) => Some(ValueType::Date),
            Value::Binary(_) => Some(ValueType::Binary),
        }
    }

    /// Integer value widened to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating value widened to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(f64::from(*v)),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

/// Name and canonical type of one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub value_type: ValueType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

/// An entity registered in the registry
///
/// The entity name is what feature views refer to; the join key is the column
/// name that must be present in the entity data and in the backing table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    pub join_key: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub description: Option<String>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>, join_key: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            join_key: join_key.into(),
            value_type,
            description: None,
        }
    }
}

/// A feature column of a feature view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDef {
    pub name: String,
    pub value_type: ValueType,
}

/// Where a feature view's rows live in the warehouse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRef {
    /// A (possibly database-qualified) table name, e.g. `feast.driver_stats`
    Table(String),
    /// An arbitrary SELECT used as a subquery
    Query(String),
}

/// Batch source of a feature view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    #[serde(flatten)]
    pub table: TableRef,

    /// Column holding the time at which the feature value became valid
    pub event_timestamp_column: String,

    /// Column holding the time at which the row was written (tie-breaker)
    #[serde(default)]
    pub created_timestamp_column: Option<String>,

    /// Source column name -> logical (entity/feature/timestamp) name
    #[serde(default)]
    pub field_mapping: HashMap<String, String>,
}

impl DataSource {
    pub fn table(name: impl Into<String>, event_timestamp_column: impl Into<String>) -> Self {
        Self {
            table: TableRef::Table(name.into()),
            event_timestamp_column: event_timestamp_column.into(),
            created_timestamp_column: None,
            field_mapping: HashMap::new(),
        }
    }

    pub fn query(sql: impl Into<String>, event_timestamp_column: impl Into<String>) -> Self {
        Self {
            table: TableRef::Query(sql.into()),
            event_timestamp_column: event_timestamp_column.into(),
            created_timestamp_column: None,
            field_mapping: HashMap::new(),
        }
    }

    pub fn with_created_timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.created_timestamp_column = Some(column.into());
        self
    }

    pub fn with_field_mapping(mut self, source: impl Into<String>, logical: impl Into<String>) -> Self {
        self.field_mapping.insert(source.into(), logical.into());
        self
    }
}

/// Feature view metadata as supplied by the registry
///
/// A feature view is a set of features keyed by one or more entities and
/// backed by a single warehouse table or query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureViewDef {
    /// Unique name of the feature view (e.g., "driver_stats")
    pub name: String,

    /// Names of the entities this view is keyed by
    #[serde(default)]
    pub entities: Vec<String>,

    /// Feature columns exposed by the view
    pub features: Vec<FeatureDef>,

    /// Maximum age of a feature value in seconds; 0 means unlimited
    #[serde(default)]
    pub ttl_seconds: u64,

    pub source: DataSource,
}

impl FeatureViewDef {
    /// Creates a feature view with no entities and no features
    pub fn new(name: impl Into<String>, source: DataSource) -> Self {
        Self {
            name: name.into(),
            entities: Vec::new(),
            features: Vec::new(),
            ttl_seconds: 0,
            source,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entities.push(entity.into());
        self
    }

    pub fn with_feature(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.features.push(FeatureDef {
            name: name.into(),
            value_type,
        });
        self
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureDef> {
        self.features.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_categories() {
        assert_eq!(ValueType::Int32.category(), ValueType::Int64.category());
        assert_eq!(ValueType::Float32.category(), ValueType::Float64.category());
        assert_ne!(ValueType::Timestamp.category(), ValueType::Date.category());
        assert!(ValueType::Date.is_quoted());
        assert!(!ValueType::Binary.is_quoted());
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Int32(7).as_i64(), Some(7));
        assert_eq!(Value::Float32(0.5).as_f64(), Some(0.5));
        assert_eq!(Value::Null.value_type(), None);
        assert_eq!(Value::String("a".into()).as_str(), Some("a"));
    }

    #[test]
    fn test_feature_view_yaml() {
        let yaml = r#"
name: driver_stats
entities: [driver]
ttl_seconds: 86400
features:
  - name: conv_rate
    value_type: float64
source:
  table: warehouse.driver_stats
  event_timestamp_column: event_ts
  created_timestamp_column: created
"#;
        let view: FeatureViewDef = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(view.ttl_seconds, 86400);
        assert_eq!(
            view.source.table,
            TableRef::Table("warehouse.driver_stats".to_string())
        );
        assert_eq!(view.source.created_timestamp_column.as_deref(), Some("created"));
        assert_eq!(view.feature("conv_rate").unwrap().value_type, ValueType::Float64);
    }
}
