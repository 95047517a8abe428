//! Error types for featurehive
//!
//! Every failure in the offline store surfaces as one of these variants.
//! We use the `thiserror` crate to keep the definitions concise.
//!
//! ## Design Philosophy
//!
//! - Errors should be descriptive and actionable
//! - Backend failures are propagated verbatim (no retries, no partial success)
//! - Pre-flight errors (config, entity source, join keys) are raised before
//!   any statement reaches the warehouse whenever the information is available

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors that can occur in featurehive
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration object does not describe the store it was given to
    ///
    /// For example a `hive` offline store config handed to a DuckDB connection.
    #[error("Offline store config type mismatch: expected '{expected}', got '{actual}'")]
    ConfigTypeMismatch { expected: String, actual: String },

    /// A column type has no mapping to the canonical type set
    ///
    /// Raised for nested/complex types (arrays, structs, maps) and for backend
    /// type names the Type Mapper does not know. Never coerced to string.
    #[error("Unsupported type '{type_name}' for column '{column}'")]
    UnsupportedColumnType { column: String, type_name: String },

    /// Entity input is neither usable tabular data nor a query string
    #[error("Unsupported entity source: {0}")]
    UnsupportedEntitySource(String),

    /// Any SQL or network failure reported by the backend
    #[error("Backend execution error: {0}")]
    BackendExecutionError(String),

    /// A join key required by a feature view is absent from the entity data
    #[error("Entity data is missing join key '{join_key}' required by feature view '{feature_view}'")]
    MissingJoinKey {
        feature_view: String,
        join_key: String,
    },

    /// The entity data has no usable event timestamp column
    #[error("Entity data has no event timestamp column: {0}")]
    MissingTimestampColumn(String),

    /// Feature view was not found in the registry
    #[error("Feature view '{0}' not found")]
    FeatureViewNotFound(String),

    /// Entity was not found in the registry
    #[error("Entity '{0}' not found")]
    EntityNotFound(String),

    /// Feature reference is not of the form `view:feature`
    #[error("Invalid feature reference '{0}' (expected '<feature_view>:<feature>')")]
    InvalidFeatureRef(String),

    /// Two output columns would share the same name
    ///
    /// Use `full_feature_names = true` to prefix features with their view name.
    #[error("Duplicate output column names: {}", .0.join(", "))]
    FeatureNameCollision(Vec<String>),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid input from the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error - indicates a bug in featurehive
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl Error {
    /// Wraps any backend error (DuckDB, driver, network) verbatim
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::BackendExecutionError(err.to_string())
    }

    /// Creates an UnsupportedColumnType error
    pub fn unsupported_column(column: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnsupportedColumnType {
            column: column.into(),
            type_name: type_name.into(),
        }
    }

    /// Creates a ConfigError from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Creates an InvalidInput error from a string
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates an InternalError from a string
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::ConfigError(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::FeatureViewNotFound("driver_stats".to_string());
        assert_eq!(err.to_string(), "Feature view 'driver_stats' not found");

        let err = Error::MissingJoinKey {
            feature_view: "driver_stats".to_string(),
            join_key: "driver_id".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Entity data is missing join key 'driver_id' required by feature view 'driver_stats'"
        );
    }

    #[test]
    fn test_error_helpers() {
        let err = Error::config("Missing required field");
        assert!(matches!(err, Error::ConfigError(_)));

        let err = Error::backend("connection reset");
        assert!(matches!(err, Error::BackendExecutionError(ref m) if m == "connection reset"));

        let err = Error::unsupported_column("tags", "array<string>");
        assert_eq!(
            err.to_string(),
            "Unsupported type 'array<string>' for column 'tags'"
        );
    }

    #[test]
    fn test_collision_lists_names() {
        let err = Error::FeatureNameCollision(vec!["conv_rate".to_string(), "trips".to_string()]);
        assert_eq!(err.to_string(), "Duplicate output column names: conv_rate, trips");
    }
}
