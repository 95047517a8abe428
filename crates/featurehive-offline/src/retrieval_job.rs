//! Deferred retrieval jobs
//!
//! A [`RetrievalJob`] holds a connection handle and a recipe. Building one
//! performs no I/O; every call to [`RetrievalJob::to_rows`] or
//! [`RetrievalJob::to_columnar`] runs the whole recipe again:
//!
//! ```text
//! Pending ──setup──▶ Ready { sql, teardown } ──query + teardown──▶ Materialized
//! ```
//!
//! Setup stages the entity data and compiles the point-in-time join. Once
//! the query has been submitted, teardown (dropping the staging table) runs
//! whether or not the query succeeded. When setup itself fails, the staging
//! table is dropped eagerly unless the store is configured to keep it.

use crate::observability;
use crate::stager::EntityStager;
use arrow::record_batch::RecordBatch;
use featurehive_core::point_in_time::{
    compile_point_in_time, CompileOptions, EntityInput, FeatureViewQueryContext, LeftSource,
};
use featurehive_core::validation::{EntitySchema, ExpectedJoinKey};
use featurehive_core::{recover_mutex, Result, ResultTable, SharedConnection, SqlConnection};
use std::fmt;
use tracing::{debug, info, warn};

/// Entity observations for a historical retrieval
#[derive(Debug, Clone)]
pub enum EntitySource {
    /// In-memory entity rows, uploaded in chunks
    Tabular(RecordBatch),
    /// SELECT text evaluated by the warehouse
    Query(String),
}

impl EntitySource {
    pub fn kind(&self) -> &'static str {
        match self {
            EntitySource::Tabular(_) => "tabular",
            EntitySource::Query(_) => "query",
        }
    }
}

/// Everything a historical retrieval needs to run
#[derive(Debug, Clone)]
pub(crate) struct PointInTimePlan {
    pub contexts: Vec<FeatureViewQueryContext>,
    pub expected_join_keys: Vec<ExpectedJoinKey>,
    pub entity: EntitySource,
    pub staging_table: String,
    pub options: CompileOptions,
    pub stager: EntityStager,
    pub retain_staging_table_on_failure: bool,
    pub preamble: Vec<String>,
}

#[derive(Debug, Clone)]
enum Plan {
    /// A ready statement with nothing to stage
    Query { sql: String, preamble: Vec<String> },
    PointInTime(Box<PointInTimePlan>),
}

enum JobState {
    Pending,
    Ready { sql: String, teardown: Vec<String> },
    Materialized(ResultTable),
}

/// A deferred retrieval
pub struct RetrievalJob {
    connection: SharedConnection,
    plan: Plan,
}

impl RetrievalJob {
    pub(crate) fn query(connection: SharedConnection, sql: String, preamble: Vec<String>) -> Self {
        Self {
            connection,
            plan: Plan::Query { sql, preamble },
        }
    }

    pub(crate) fn point_in_time(connection: SharedConnection, plan: PointInTimePlan) -> Self {
        Self {
            connection,
            plan: Plan::PointInTime(Box::new(plan)),
        }
    }

    /// Name of the staging table a historical retrieval creates
    pub fn staging_table(&self) -> Option<&str> {
        match &self.plan {
            Plan::Query { .. } => None,
            Plan::PointInTime(plan) => Some(&plan.staging_table),
        }
    }

    /// Statement text, when it is known without staging
    pub fn sql(&self) -> Option<&str> {
        match &self.plan {
            Plan::Query { sql, .. } => Some(sql),
            Plan::PointInTime(_) => None,
        }
    }

    /// Runs the job and returns row-oriented results
    pub fn to_rows(&self) -> Result<ResultTable> {
        self.run()
    }

    /// Runs the job and returns an Arrow batch
    pub fn to_columnar(&self) -> Result<RecordBatch> {
        self.run()?.to_record_batch()
    }

    fn run(&self) -> Result<ResultTable> {
        let _timer = observability::time_retrieval();
        let result = self.run_to_completion();
        if let Err(e) = &result {
            observability::increment_retrieval_errors();
            warn!(error = %e, "Retrieval job failed");
        }
        result
    }

    fn run_to_completion(&self) -> Result<ResultTable> {
        // Held for setup, query and teardown: the staging table only lives on this connection
        let mut guard = recover_mutex(&self.connection, "SqlConnection")?;
        let conn: &mut dyn SqlConnection = &mut *guard;

        let mut state = JobState::Pending;
        loop {
            state = match state {
                JobState::Pending => self.setup(conn)?,
                JobState::Ready { sql, teardown } => {
                    let result = conn.query(&sql);
                    let cleanup = run_teardown(conn, &teardown);
                    let table = result?;
                    cleanup?;
                    JobState::Materialized(table)
                }
                JobState::Materialized(table) => {
                    info!(rows = table.num_rows(), columns = table.num_columns(), "Retrieval job materialized");
                    return Ok(table);
                }
            };
        }
    }

    fn setup(&self, conn: &mut dyn SqlConnection) -> Result<JobState> {
        match &self.plan {
            Plan::Query { sql, preamble } => {
                run_statements(conn, preamble)?;
                Ok(JobState::Ready {
                    sql: sql.clone(),
                    teardown: Vec::new(),
                })
            }
            Plan::PointInTime(plan) => {
                run_statements(conn, &plan.preamble)?;
                let sql = prepare_point_in_time(conn, plan)?;
                Ok(JobState::Ready {
                    sql,
                    teardown: vec![drop_table_sql(plan)],
                })
            }
        }
    }
}

impl fmt::Debug for RetrievalJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalJob").field("plan", &self.plan).finish()
    }
}

fn run_statements(conn: &mut dyn SqlConnection, statements: &[String]) -> Result<()> {
    for statement in statements {
        debug!(sql = %statement, "Executing session statement");
        conn.execute(statement)?;
    }
    Ok(())
}

/// Runs every teardown statement; the first failure is returned after the rest ran
fn run_teardown(conn: &mut dyn SqlConnection, statements: &[String]) -> Result<()> {
    let mut first_error = None;
    for statement in statements {
        debug!(sql = %statement, "Executing teardown statement");
        if let Err(e) = conn.execute(statement) {
            warn!(sql = %statement, error = %e, "Teardown statement failed");
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

fn drop_table_sql(plan: &PointInTimePlan) -> String {
    format!(
        "DROP TABLE IF EXISTS {}",
        plan.options.dialect.quote_identifier(&plan.staging_table)
    )
}

/// Stages the entity data and compiles the join
fn prepare_point_in_time(conn: &mut dyn SqlConnection, plan: &PointInTimePlan) -> Result<String> {
    info!(
        entity_source = plan.entity.kind(),
        staging_table = %plan.staging_table,
        feature_views = plan.contexts.len(),
        "Preparing historical retrieval"
    );

    let (schema, event_timestamp_column) = match &plan.entity {
        EntitySource::Tabular(batch) => {
            // Nothing exists remotely until the upload starts
            let schema = EntitySchema::from_record_batch(batch)?;
            let event_timestamp_column = validate_entity_schema(plan, &schema)?;
            guard_staging(conn, plan, |conn| {
                plan.stager
                    .upload(conn, &plan.staging_table, batch, &schema)
                    .map(|_| ())
            })?;
            (schema, event_timestamp_column)
        }
        EntitySource::Query(query) => guard_staging(conn, plan, |conn| {
            let schema = plan.stager.stage_query(conn, &plan.staging_table, query)?;
            let event_timestamp_column = validate_entity_schema(plan, &schema)?;
            Ok((schema, event_timestamp_column))
        })?,
    };

    let columns = schema.column_names();
    guard_staging(conn, plan, |_| {
        compile_point_in_time(
            &plan.contexts,
            &EntityInput {
                source: LeftSource::Table(plan.staging_table.clone()),
                columns: &columns,
                event_timestamp_column: &event_timestamp_column,
            },
            &plan.options,
        )
    })
}

fn validate_entity_schema(plan: &PointInTimePlan, schema: &EntitySchema) -> Result<String> {
    let event_timestamp_column = schema.infer_event_timestamp_column()?;
    schema.assert_expected_columns(&plan.expected_join_keys, &event_timestamp_column)?;
    debug!(
        event_timestamp_column = %event_timestamp_column,
        columns = ?schema.column_names(),
        "Validated entity schema"
    );
    Ok(event_timestamp_column)
}

/// Runs a setup step that may leave the staging table behind
///
/// On failure the table is dropped, or kept and reported when the store
/// retains staging tables, and the original error is returned.
fn guard_staging<T>(
    conn: &mut dyn SqlConnection,
    plan: &PointInTimePlan,
    step: impl FnOnce(&mut dyn SqlConnection) -> Result<T>,
) -> Result<T> {
    match step(&mut *conn) {
        Ok(value) => Ok(value),
        Err(e) => {
            if plan.retain_staging_table_on_failure {
                warn!(
                    staging_table = %plan.staging_table,
                    error = %e,
                    "Setup failed; keeping staging table for inspection"
                );
                observability::increment_staging_tables_leaked();
            } else if let Err(drop_err) = conn.execute(&drop_table_sql(plan)) {
                warn!(
                    staging_table = %plan.staging_table,
                    error = %drop_err,
                    "Failed to drop staging table after setup failure"
                );
                observability::increment_staging_tables_leaked();
            } else {
                warn!(
                    staging_table = %plan.staging_table,
                    error = %e,
                    "Setup failed; dropped staging table"
                );
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use featurehive_core::{shared, Error, SqlDialect};
    use std::sync::{Arc, Mutex};

    /// Records statements; `query` returns an empty table
    struct Recorder {
        statements: Arc<Mutex<Vec<String>>>,
        fail_on: Option<&'static str>,
    }

    impl SqlConnection for Recorder {
        fn dialect(&self) -> SqlDialect {
            SqlDialect::Hive
        }

        fn execute(&mut self, sql: &str) -> Result<()> {
            self.statements.lock().unwrap().push(sql.to_string());
            match self.fail_on {
                Some(marker) if sql.contains(marker) => Err(Error::backend("boom")),
                _ => Ok(()),
            }
        }

        fn query(&mut self, sql: &str) -> Result<ResultTable> {
            self.statements.lock().unwrap().push(sql.to_string());
            match self.fail_on {
                Some(marker) if sql.contains(marker) => Err(Error::backend("boom")),
                _ => Ok(ResultTable::empty(Vec::new())),
            }
        }
    }

    fn recorder(fail_on: Option<&'static str>) -> (SharedConnection, Arc<Mutex<Vec<String>>>) {
        let statements = Arc::new(Mutex::new(Vec::new()));
        let conn = shared(Recorder {
            statements: statements.clone(),
            fail_on,
        });
        (conn, statements)
    }

    #[test]
    fn test_construction_performs_no_io() {
        let (conn, statements) = recorder(None);
        let job = RetrievalJob::query(conn, "SELECT 1".to_string(), Vec::new());
        assert_eq!(job.sql(), Some("SELECT 1"));
        assert!(job.staging_table().is_none());
        assert!(statements.lock().unwrap().is_empty());
    }

    #[test]
    fn test_each_materialization_reruns() {
        let (conn, statements) = recorder(None);
        let job = RetrievalJob::query(
            conn,
            "SELECT 1".to_string(),
            vec!["SET hive.exec.parallel=true".to_string()],
        );
        job.to_rows().unwrap();
        job.to_rows().unwrap();
        assert_eq!(
            *statements.lock().unwrap(),
            vec![
                "SET hive.exec.parallel=true",
                "SELECT 1",
                "SET hive.exec.parallel=true",
                "SELECT 1"
            ]
        );
    }

    #[test]
    fn test_query_error_propagates() {
        let (conn, _) = recorder(Some("SELECT"));
        let job = RetrievalJob::query(conn, "SELECT 1".to_string(), Vec::new());
        assert!(matches!(job.to_rows(), Err(Error::BackendExecutionError(_))));
    }

    #[test]
    fn test_teardown_keeps_first_error() {
        let (conn, statements) = recorder(Some("DROP"));
        let mut guard = conn.lock().unwrap();
        let err = run_teardown(
            &mut *guard,
            &["DROP TABLE a".to_string(), "DROP TABLE b".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, Error::BackendExecutionError(_)));
        assert_eq!(statements.lock().unwrap().len(), 2);
    }
}
