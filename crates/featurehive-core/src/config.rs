//! Offline store configuration
//!
//! Configuration is read from YAML or JSON. Only the `type` selector is
//! required; everything else has a default.
//!
//! ```yaml
//! type: hive
//! entity_upload_chunk_size: 5000
//! hive:
//!   host: hive.internal
//!   database: feast
//!   configuration:
//!     hive.exec.parallel: "true"
//! ```

use crate::dialect::SqlDialect;
use crate::error::Result;
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default number of entity rows per INSERT statement
pub const DEFAULT_ENTITY_UPLOAD_CHUNK_SIZE: i64 = 10_000;

/// Top-level offline store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineStoreConfig {
    /// Which warehouse this store talks to (`hive` or `duckdb`)
    #[serde(rename = "type")]
    pub store_type: SqlDialect,

    /// Rows per multi-row INSERT when staging entity data; ≤ 0 uploads
    /// everything in one statement
    #[serde(default = "default_chunk_size")]
    pub entity_upload_chunk_size: i64,

    /// Overrides whether the compiled queries may use `ROW_NUMBER()`
    #[serde(default)]
    pub supports_window_functions: Option<bool>,

    /// Keep the staging table when a retrieval fails during setup
    #[serde(default)]
    pub retain_staging_table_on_failure: bool,

    #[serde(default)]
    pub hive: HiveConfig,

    #[serde(default)]
    pub duckdb: DuckDbConfig,
}

fn default_chunk_size() -> i64 {
    DEFAULT_ENTITY_UPLOAD_CHUNK_SIZE
}

impl OfflineStoreConfig {
    /// Configuration with defaults for the given store type
    pub fn new(store_type: SqlDialect) -> Self {
        Self {
            store_type,
            entity_upload_chunk_size: default_chunk_size(),
            supports_window_functions: None,
            retain_staging_table_on_failure: false,
            hive: HiveConfig::default(),
            duckdb: DuckDbConfig::default(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: i64) -> Self {
        self.entity_upload_chunk_size = chunk_size;
        self
    }

    pub fn with_window_functions(mut self, supported: bool) -> Self {
        self.supports_window_functions = Some(supported);
        self
    }

    pub fn with_retained_staging_tables(mut self, retain: bool) -> Self {
        self.retain_staging_table_on_failure = retain;
        self
    }

    /// Whether compiled queries use the window-function form
    pub fn window_functions_enabled(&self) -> bool {
        self.supports_window_functions
            .unwrap_or_else(|| self.store_type.supports_window_functions())
    }

    /// Loads a configuration file (YAML or JSON, chosen by extension)
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(load_from_file(path.as_ref())?)
    }
}

/// HiveServer2 connection parameters
///
/// These only describe how to reach the warehouse; the transport itself is
/// supplied by the caller as a `SqlConnection`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiveConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_hive_port")]
    pub port: u16,

    #[serde(default = "default_database")]
    pub database: String,

    /// Authentication mechanism (NONE, NOSASL, LDAP, KERBEROS, ...)
    #[serde(default)]
    pub auth: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub kerberos_service_name: Option<String>,

    /// Session settings issued as `SET key=value` before each retrieval
    #[serde(default)]
    pub configuration: BTreeMap<String, String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_hive_port() -> u16 {
    10000
}

fn default_database() -> String {
    "default".to_string()
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_hive_port(),
            database: default_database(),
            auth: None,
            username: None,
            password: None,
            kerberos_service_name: None,
            configuration: BTreeMap::new(),
        }
    }
}

/// DuckDB settings, applied when the connection is opened
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuckDbConfig {
    /// Database file; `None` opens an in-memory database
    #[serde(default)]
    pub path: Option<String>,

    /// Worker threads (`None` = DuckDB default)
    #[serde(default)]
    pub threads: Option<usize>,

    /// Memory limit such as "4GB"
    #[serde(default)]
    pub memory_limit: Option<String>,

    /// Spill directory for larger-than-memory queries
    #[serde(default)]
    pub temp_directory: Option<String>,

    #[serde(default)]
    pub preserve_insertion_order: Option<bool>,
}

/// Reads a YAML or JSON document
///
/// `.yaml`/`.yml` and `.json` select the parser; other extensions try YAML
/// first, then JSON.
pub(crate) fn load_from_file<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
        _ => serde_yaml::from_str(&content)
            .or_else(|_| serde_json::from_str(&content))
            .with_context(|| format!("Failed to parse config file: {}", path.display())),
    }
}
