//! # featurehive Core Library
//!
//! Backend-independent building blocks of the featurehive offline store:
//! point-in-time feature retrieval from SQL warehouses (Hive, DuckDB).
//!
//! ## Key Components
//!
//! - **Type Mapper** (`type_map`): canonical value types ↔ warehouse and Arrow types
//! - **Query Compiler** (`point_in_time`): the multi-view point-in-time join,
//!   built as a structured query (`sql`) and rendered per dialect (`dialect`)
//! - **SqlConnection**: the trait every warehouse connection implements
//! - **FeatureRegistry**: read-only source of feature-view metadata
//! - **Errors**: strongly-typed error handling
//!
//! ## Example Usage
//!
//! ```rust
//! use featurehive_core::prelude::*;
//!
//! let ctx = FeatureViewQueryContext::new(
//!     "driver_stats",
//!     TableRef::Table("feast.driver_stats".to_string()),
//!     "event_timestamp",
//! )
//! .with_join_key(ColumnSelection::same("driver_id"))
//! .with_feature(ColumnSelection::same("conv_rate"));
//!
//! let columns = vec!["driver_id".to_string(), "event_timestamp".to_string()];
//! let entity = EntityInput {
//!     source: LeftSource::Table("entity_df".to_string()),
//!     columns: &columns,
//!     event_timestamp_column: "event_timestamp",
//! };
//! let sql = compile_point_in_time(&[ctx], &entity, &CompileOptions::new(SqlDialect::Hive)).unwrap();
//! assert!(sql.contains("LEFT JOIN"));
//! ```

// Re-export commonly used types for convenience
pub use config::{DuckDbConfig, HiveConfig, OfflineStoreConfig};
pub use connector::{recover_mutex, shared, SharedConnection, SqlConnection};
pub use dialect::SqlDialect;
pub use error::{Error, Result};
pub use table::ResultTable;
pub use types::{
    ColumnSchema, DataSource, EntityDef, FeatureDef, FeatureViewDef, TableRef, Value, ValueType,
};

pub mod config;
pub mod connector;
pub mod dialect;
mod error;
pub mod point_in_time;
pub mod registry;
pub mod sql;
pub mod table;
pub mod type_map;
pub mod types;
pub mod validation;

// Prelude module - commonly used imports
// Users can do `use featurehive_core::prelude::*` to get everything they need
pub mod prelude {
    pub use crate::config::OfflineStoreConfig;
    pub use crate::connector::{SharedConnection, SqlConnection};
    pub use crate::dialect::SqlDialect;
    pub use crate::error::{Error, Result};
    pub use crate::point_in_time::{
        compile_point_in_time, ColumnSelection, CompileOptions, EntityInput,
        FeatureViewQueryContext, LeftSource,
    };
    pub use crate::registry::{FeatureRegistry, InMemoryRegistry};
    pub use crate::table::ResultTable;
    pub use crate::types::{TableRef, Value, ValueType};
    pub use crate::validation::EntitySchema;
}
