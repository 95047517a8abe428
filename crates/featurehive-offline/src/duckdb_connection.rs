//! DuckDB implementation of `SqlConnection`
//!
//! Used as an embedded warehouse (local development, tests, small
//! deployments). Result column types are read with `DESCRIBE <query>` and
//! mapped through the Type Mapper, so an unsupported result type fails the
//! same way it would on Hive.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use duckdb::types::{TimeUnit, Value as DuckValue};
use duckdb::Connection;
use featurehive_core::config::DuckDbConfig;
use featurehive_core::type_map::resolve_column_type;
use featurehive_core::{
    ColumnSchema, Error, OfflineStoreConfig, ResultTable, Result, SqlConnection, SqlDialect, Value,
    ValueType,
};
use std::path::Path;
use tracing::{debug, info};

/// Days from 0001-01-01 (CE) to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// A single DuckDB connection
pub struct DuckDbConnection {
    conn: Connection,
}

impl DuckDbConnection {
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::backend)?;
        Ok(Self { conn })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(Error::backend)?;
        Ok(Self { conn })
    }

    /// Opens the database described by an offline store config
    ///
    /// # Errors
    ///
    /// `ConfigTypeMismatch` if the config is not a `duckdb` config
    pub fn from_config(config: &OfflineStoreConfig) -> Result<Self> {
        if config.store_type != SqlDialect::DuckDb {
            return Err(Error::ConfigTypeMismatch {
                expected: SqlDialect::DuckDb.name().to_string(),
                actual: config.store_type.name().to_string(),
            });
        }

        let connection = match &config.duckdb.path {
            Some(path) => Self::open(path)?,
            None => Self::open_in_memory()?,
        };
        connection.configure(&config.duckdb)?;
        info!(
            path = config.duckdb.path.as_deref().unwrap_or(":memory:"),
            "Opened DuckDB offline store connection"
        );
        Ok(connection)
    }

    /// Applies session settings
    fn configure(&self, config: &DuckDbConfig) -> Result<()> {
        let dialect = SqlDialect::DuckDb;
        let mut pragmas = Vec::new();
        if let Some(threads) = config.threads {
            pragmas.push(format!("PRAGMA threads={};", threads.max(1)));
        }
        if let Some(limit) = &config.memory_limit {
            pragmas.push(format!("PRAGMA memory_limit={};", dialect.quote_string(limit)));
        }
        if let Some(dir) = &config.temp_directory {
            pragmas.push(format!("PRAGMA temp_directory={};", dialect.quote_string(dir)));
        }
        if let Some(preserve) = config.preserve_insertion_order {
            pragmas.push(format!("PRAGMA preserve_insertion_order={};", preserve));
        }
        if pragmas.is_empty() {
            return Ok(());
        }

        debug!(settings = ?pragmas, "Configuring DuckDB connection");
        self.conn
            .execute_batch(&pragmas.join("\n"))
            .map_err(|e| Error::backend(format!("Failed to configure DuckDB: {}", e)))
    }

    /// Result schema of a query, without running it
    fn describe(&self, sql: &str) -> Result<Vec<ColumnSchema>> {
        let mut stmt = self
            .conn
            .prepare(&format!("DESCRIBE {}", sql))
            .map_err(Error::backend)?;
        let mut rows = stmt.query([]).map_err(Error::backend)?;

        let mut columns = Vec::new();
        while let Some(row) = rows.next().map_err(Error::backend)? {
            let name: String = row.get(0).map_err(Error::backend)?;
            let type_name: String = row.get(1).map_err(Error::backend)?;
            let value_type = resolve_column_type(&name, &type_name)?;
            columns.push(ColumnSchema::new(name, value_type));
        }
        Ok(columns)
    }
}

impl SqlConnection for DuckDbConnection {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::DuckDb
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql).map_err(Error::backend)
    }

    fn query(&mut self, sql: &str) -> Result<ResultTable> {
        let columns = self.describe(sql)?;

        let mut stmt = self.conn.prepare(sql).map_err(Error::backend)?;
        let mut rows = stmt.query([]).map_err(Error::backend)?;
        let mut values = Vec::new();
        while let Some(row) = rows.next().map_err(Error::backend)? {
            let record = columns
                .iter()
                .enumerate()
                .map(|(idx, column)| {
                    let raw: DuckValue = row.get(idx).map_err(Error::backend)?;
                    convert_value(column, raw)
                })
                .collect::<Result<Vec<Value>>>()?;
            values.push(record);
        }

        ResultTable::new(columns, values)
    }
}

fn timestamp_micros(unit: TimeUnit, value: i64) -> Option<i64> {
    match unit {
        TimeUnit::Second => value.checked_mul(1_000_000),
        TimeUnit::Millisecond => value.checked_mul(1_000),
        TimeUnit::Microsecond => Some(value),
        TimeUnit::Nanosecond => Some(value.div_euclid(1_000)),
    }
}

fn to_naive_datetime(unit: TimeUnit, value: i64) -> Option<NaiveDateTime> {
    timestamp_micros(unit, value)
        .and_then(DateTime::<Utc>::from_timestamp_micros)
        .map(|dt| dt.naive_utc())
}

fn convert_value(column: &ColumnSchema, raw: DuckValue) -> Result<Value> {
    let out_of_range = || Error::backend(format!("Value out of range in column '{}'", column.name));

    let value = match (column.value_type, raw) {
        (_, DuckValue::Null) => Value::Null,
        (ValueType::Int32, DuckValue::TinyInt(v)) => Value::Int32(i32::from(v)),
        (ValueType::Int32, DuckValue::SmallInt(v)) => Value::Int32(i32::from(v)),
        (ValueType::Int32, DuckValue::Int(v)) => Value::Int32(v),
        (ValueType::Int32, DuckValue::UTinyInt(v)) => Value::Int32(i32::from(v)),
        (ValueType::Int32, DuckValue::USmallInt(v)) => Value::Int32(i32::from(v)),
        (ValueType::Int64, DuckValue::Int(v)) => Value::Int64(i64::from(v)),
        (ValueType::Int64, DuckValue::BigInt(v)) => Value::Int64(v),
        (ValueType::Int64, DuckValue::UInt(v)) => Value::Int64(i64::from(v)),
        (ValueType::Float32, DuckValue::Float(v)) => Value::Float32(v),
        (ValueType::Float64, DuckValue::Float(v)) => Value::Float64(f64::from(v)),
        (ValueType::Float64, DuckValue::Double(v)) => Value::Float64(v),
        (ValueType::Bool, DuckValue::Boolean(v)) => Value::Bool(v),
        (ValueType::String, DuckValue::Text(v)) => Value::String(v),
        (ValueType::Timestamp, DuckValue::Timestamp(unit, v)) => {
            Value::Timestamp(to_naive_datetime(unit, v).ok_or_else(out_of_range)?)
        }
        (ValueType::Date, DuckValue::Date32(days)) => Value::Date(
            days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .ok_or_else(out_of_range)?,
        ),
        (ValueType::Binary, DuckValue::Blob(v)) => Value::Binary(v),
        (expected, other) => {
            return Err(Error::unsupported_column(
                &column.name,
                format!("{:?} (expected {})", other, expected),
            ))
        }
    };
    Ok(value)
}
