//! # featurehive Offline Store
//!
//! Runs point-in-time feature retrieval against a SQL warehouse.
//!
//! ## Key Components
//!
//! - **EntityStager**: uploads entity rows into a staging table with chunked
//!   multi-row INSERTs, or materializes an entity query into one
//! - **RetrievalJob**: deferred setup → query → teardown, re-run on every
//!   materialization
//! - **OfflineStore**: latest-value and historical (point-in-time) entry points
//! - **DuckDbConnection**: embedded DuckDB implementation of `SqlConnection`
//!
//! Hive connections are supplied by the application through the
//! `SqlConnection` trait.
//!
//! ## Example
//!
//! ```rust,no_run
//! use featurehive_core::registry::InMemoryRegistry;
//! use featurehive_core::{shared, OfflineStoreConfig, SqlDialect};
//! use featurehive_offline::{DuckDbConnection, EntitySource, OfflineStore};
//! use std::sync::Arc;
//!
//! # fn main() -> featurehive_core::Result<()> {
//! let config = OfflineStoreConfig::new(SqlDialect::DuckDb);
//! let connection = shared(DuckDbConnection::from_config(&config)?);
//! let registry = Arc::new(InMemoryRegistry::load_from_file("registry.yaml")?);
//! let store = OfflineStore::new(config, connection, registry)?;
//!
//! let job = store.get_historical_features(
//!     &["driver_stats:conv_rate"],
//!     EntitySource::Query("SELECT driver_id, event_timestamp FROM entity_rows".to_string()),
//!     false,
//! )?;
//! let features = job.to_columnar()?;
//! println!("{} rows", features.num_rows());
//! # Ok(())
//! # }
//! ```

pub use duckdb_connection::DuckDbConnection;
pub use offline_store::{OfflineStore, STAGING_TABLE_PREFIX};
pub use retrieval_job::{EntitySource, RetrievalJob};
pub use stager::{EntityStager, UploadSummary};

mod duckdb_connection;
pub mod observability;
mod offline_store;
mod retrieval_job;
mod stager;
