//! SQL connection trait and related types
//!
//! This module defines the `SqlConnection` trait, the only way the offline
//! store talks to a warehouse. Everything it issues (DDL for staging tables,
//! multi-row inserts, the compiled point-in-time query, drops) goes through
//! these three methods.
//!
//! ## Design Philosophy
//!
//! The trait is intentionally minimal:
//! - Execute a statement that returns nothing
//! - Run a query and materialize its result
//! - Report the SQL dialect the warehouse speaks
//!
//! Opening, authenticating and closing connections stay with the
//! implementation.

use crate::dialect::SqlDialect;
use crate::error::{Error, Result};
use crate::table::ResultTable;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// A blocking connection to a SQL warehouse
///
/// Every call is one synchronous round trip. There are no retries and no
/// timeouts: a statement runs to completion or fails with
/// `BackendExecutionError`.
///
/// ## Implementation Notes
///
/// Temporary tables are connection-scoped, so the same connection must be
/// used to create, query and drop a staging table. The offline store
/// guarantees this by locking a [`SharedConnection`] for the whole
/// lifetime of a retrieval run.
///
/// ## Example Implementation
///
/// ```rust,ignore
/// use featurehive_core::{ResultTable, Result, SqlConnection, SqlDialect};
///
/// pub struct MyHiveConnection {
///     // transport, session, etc.
/// }
///
/// impl SqlConnection for MyHiveConnection {
///     fn dialect(&self) -> SqlDialect {
///         SqlDialect::Hive
///     }
///     fn execute(&mut self, sql: &str) -> Result<()> {
///         // send statement
///     }
///     fn query(&mut self, sql: &str) -> Result<ResultTable> {
///         // send statement, fetch every batch, map column types
///     }
/// }
/// ```
pub trait SqlConnection: Send {
    /// Dialect used to render statements for this connection
    fn dialect(&self) -> SqlDialect;

    /// Executes a statement that produces no rows (DDL, INSERT, SET, DROP)
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Executes a query and materializes the full result
    ///
    /// # Errors
    ///
    /// - `BackendExecutionError` if the warehouse rejects the statement
    /// - `UnsupportedColumnType` if a result column has no canonical type
    fn query(&mut self, sql: &str) -> Result<ResultTable>;
}

/// Connection handle shared between the facade and its retrieval jobs
pub type SharedConnection = Arc<Mutex<dyn SqlConnection>>;

/// Wraps a connection into a [`SharedConnection`]
pub fn shared<C: SqlConnection + 'static>(connection: C) -> SharedConnection {
    Arc::new(Mutex::new(connection))
}

/// Locks a mutex, recovering the guard if a previous holder panicked
///
/// The protected connection carries no invariants that a panic could break
/// halfway, so a poisoned lock is logged and reused.
pub fn recover_mutex<'a, T: ?Sized>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>> {
    match mutex.lock() {
        Ok(guard) => Ok(guard),
        Err(poisoned) => {
            warn!("{} mutex was poisoned, recovering", name);
            Ok(poisoned.into_inner())
        }
    }
}

/// Rejects a connection whose dialect differs from the configured store type
pub fn ensure_dialect(connection: &dyn SqlConnection, expected: SqlDialect) -> Result<()> {
    let actual = connection.dialect();
    if actual != expected {
        return Err(Error::ConfigTypeMismatch {
            expected: expected.name().to_string(),
            actual: actual.name().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullConnection;

    impl SqlConnection for NullConnection {
        fn dialect(&self) -> SqlDialect {
            SqlDialect::Hive
        }

        fn execute(&mut self, _sql: &str) -> Result<()> {
            Ok(())
        }

        fn query(&mut self, _sql: &str) -> Result<ResultTable> {
            Ok(ResultTable::empty(Vec::new()))
        }
    }

    #[test]
    fn test_recover_poisoned_mutex() {
        let conn = shared(NullConnection);
        let clone = Arc::clone(&conn);
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("boom");
        })
        .join();

        assert!(conn.is_poisoned());
        let mut guard = recover_mutex(&conn, "NullConnection").unwrap();
        assert!(guard.execute("SELECT 1").is_ok());
    }

    #[test]
    fn test_ensure_dialect() {
        assert!(ensure_dialect(&NullConnection, SqlDialect::Hive).is_ok());
        let err = ensure_dialect(&NullConnection, SqlDialect::DuckDb).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Offline store config type mismatch: expected 'duckdb', got 'hive'"
        );
    }
}
