//! Entity staging and staging-table lifecycle, observed through a recording connection

use arrow::array::{ArrayRef, Int64Array, ListArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Int64Type, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use featurehive_core::registry::InMemoryRegistry;
use featurehive_core::validation::EntitySchema;
use featurehive_core::{
    shared, DataSource, EntityDef, Error, FeatureViewDef, OfflineStoreConfig, Result, ResultTable,
    SqlConnection, SqlDialect, Value, ValueType,
};
use featurehive_offline::{DuckDbConnection, EntitySource, EntityStager, OfflineStore};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// 2024-01-01 10:00:00 UTC
const T_MICROS: i64 = 1_704_103_200_000_000;

/// Logs every statement before handing it to DuckDB
struct RecordingConnection {
    inner: DuckDbConnection,
    log: Arc<Mutex<Vec<String>>>,
    /// 1-based index of the INSERT that fails
    fail_insert: Option<usize>,
    inserts: usize,
}

impl RecordingConnection {
    fn new(fail_insert: Option<usize>) -> (Self, Arc<Mutex<Vec<String>>>) {
        let mut inner = DuckDbConnection::open_in_memory().unwrap();
        inner
            .execute(
                "CREATE TABLE driver_stats (driver_id BIGINT, event_timestamp TIMESTAMP, conv_rate DOUBLE);
                 INSERT INTO driver_stats VALUES (1, TIMESTAMP '2024-01-01 09:59:59', 0.5);",
            )
            .unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let conn = Self {
            inner,
            log: log.clone(),
            fail_insert,
            inserts: 0,
        };
        (conn, log)
    }
}

impl SqlConnection for RecordingConnection {
    fn dialect(&self) -> SqlDialect {
        self.inner.dialect()
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        self.log.lock().unwrap().push(sql.to_string());
        if sql.starts_with("INSERT") {
            self.inserts += 1;
            if self.fail_insert == Some(self.inserts) {
                return Err(Error::backend("injected insert failure"));
            }
        }
        self.inner.execute(sql)
    }

    fn query(&mut self, sql: &str) -> Result<ResultTable> {
        self.log.lock().unwrap().push(sql.to_string());
        self.inner.query(sql)
    }
}

fn count_statements(log: &Arc<Mutex<Vec<String>>>, prefix: &str) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|s| s.starts_with(prefix))
        .count()
}

fn entity_batch(num_rows: usize) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("driver_id", DataType::Int64, false),
        Field::new(
            "event_timestamp",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
    ]));
    let ids: Vec<i64> = (0..num_rows as i64).collect();
    let times: Vec<i64> = (0..num_rows as i64).map(|i| T_MICROS + i).collect();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(ids)),
        Arc::new(TimestampMicrosecondArray::from(times)),
    ];
    RecordBatch::try_new(schema, columns).unwrap()
}

fn nested_entity_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("driver_id", DataType::Int64, false),
        Field::new(
            "event_timestamp",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
        Field::new(
            "tags",
            DataType::List(Arc::new(Field::new("item", DataType::Int64, true))),
            true,
        ),
    ]));
    let tags = ListArray::from_iter_primitive::<Int64Type, _, _>(vec![
        Some(vec![Some(1), Some(2)]),
        None,
    ]);
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(vec![1, 2])),
        Arc::new(TimestampMicrosecondArray::from(vec![T_MICROS, T_MICROS])),
        Arc::new(tags),
    ];
    RecordBatch::try_new(schema, columns).unwrap()
}

fn registry() -> Arc<InMemoryRegistry> {
    Arc::new(
        InMemoryRegistry::new()
            .with_entity(EntityDef::new("driver", "driver_id", ValueType::Int64))
            .with_feature_view(
                FeatureViewDef::new(
                    "driver_stats",
                    DataSource::table("driver_stats", "event_timestamp"),
                )
                .with_entity("driver")
                .with_feature("conv_rate", ValueType::Float64),
            ),
    )
}

fn remote_count(conn: &mut dyn SqlConnection, sql: &str) -> Value {
    conn.query(sql).unwrap().rows()[0][0].clone()
}

#[test]
fn test_chunked_upload_issues_ceil_n_over_c_inserts() {
    let cases: [(usize, i64, usize); 6] = [(25, 10, 3), (20, 10, 2), (25, 0, 1), (25, -5, 1), (1, 10, 1), (0, 10, 0)];
    for (rows, chunk_size, expected_chunks) in cases {
        let (mut conn, log) = RecordingConnection::new(None);
        let batch = entity_batch(rows);
        let schema = EntitySchema::from_record_batch(&batch).unwrap();

        let summary = EntityStager::new(SqlDialect::DuckDb, chunk_size)
            .upload(&mut conn, "entities", &batch, &schema)
            .unwrap();

        assert_eq!(summary.rows, rows);
        assert_eq!(summary.chunks, expected_chunks, "rows={} chunk_size={}", rows, chunk_size);
        assert_eq!(count_statements(&log, "INSERT"), expected_chunks);
        assert_eq!(
            remote_count(&mut conn, "SELECT COUNT(*) AS n FROM entities"),
            Value::Int64(rows as i64)
        );
    }
}

#[test]
fn test_upload_into_existing_table_fails() {
    let (mut conn, _) = RecordingConnection::new(None);
    let batch = entity_batch(3);
    let schema = EntitySchema::from_record_batch(&batch).unwrap();
    let stager = EntityStager::new(SqlDialect::DuckDb, 10);

    stager.upload(&mut conn, "entities", &batch, &schema).unwrap();
    assert!(matches!(
        stager.upload(&mut conn, "entities", &batch, &schema),
        Err(Error::BackendExecutionError(_))
    ));
}

#[test]
fn test_nested_column_fails_after_create_before_insert() {
    let (mut conn, log) = RecordingConnection::new(None);
    let batch = nested_entity_batch();
    let schema = EntitySchema::new(vec![
        featurehive_core::ColumnSchema::new("driver_id", ValueType::Int64),
        featurehive_core::ColumnSchema::new("event_timestamp", ValueType::Timestamp),
    ]);

    let err = EntityStager::new(SqlDialect::DuckDb, 10)
        .upload(&mut conn, "entities", &batch, &schema)
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedColumnType { ref column, .. } if column == "tags"));

    let statements = log.lock().unwrap().clone();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].starts_with("CREATE TABLE"));
    assert_eq!(count_statements(&log, "INSERT"), 0);
}

#[test]
fn test_nested_column_rejected_before_any_statement() {
    let (conn, log) = RecordingConnection::new(None);
    let store = OfflineStore::new(
        OfflineStoreConfig::new(SqlDialect::DuckDb),
        shared(conn),
        registry(),
    )
    .unwrap();

    let err = store
        .get_historical_features(
            &["driver_stats:conv_rate"],
            EntitySource::Tabular(nested_entity_batch()),
            false,
        )
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedColumnType { .. }));
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_staging_table_lifecycle() {
    let (conn, log) = RecordingConnection::new(None);
    let conn = shared(conn);
    let store = OfflineStore::new(
        OfflineStoreConfig::new(SqlDialect::DuckDb).with_chunk_size(4),
        conn.clone(),
        registry(),
    )
    .unwrap();

    let job = store
        .get_historical_features(
            &["driver_stats:conv_rate"],
            EntitySource::Tabular(entity_batch(10)),
            false,
        )
        .unwrap();
    assert!(log.lock().unwrap().is_empty(), "construction must not touch the warehouse");

    let staging = job.staging_table().unwrap().to_string();
    assert!(staging.starts_with(featurehive_offline::STAGING_TABLE_PREFIX));

    assert_eq!(job.to_rows().unwrap().num_rows(), 10);
    {
        let statements = log.lock().unwrap();
        let kinds: Vec<&str> = statements
            .iter()
            .map(|s| s.split_whitespace().next().unwrap_or(""))
            .collect();
        assert_eq!(kinds, vec!["CREATE", "INSERT", "INSERT", "INSERT", "WITH", "DROP"]);
        assert!(statements[0].contains(&staging));
        assert!(statements[5].starts_with("DROP TABLE IF EXISTS"));
    }

    // Second materialization stages again under the same name
    assert_eq!(job.to_columnar().unwrap().num_rows(), 10);
    assert_eq!(count_statements(&log, "CREATE TABLE"), 2);
    assert_eq!(count_statements(&log, "DROP TABLE"), 2);

    let left = remote_count(
        &mut *conn.lock().unwrap(),
        &format!("SELECT COUNT(*) AS n FROM duckdb_tables() WHERE table_name = '{}'", staging),
    );
    assert_eq!(left, Value::Int64(0));
}

#[test]
fn test_failed_chunk_drops_staging_table() {
    let (conn, log) = RecordingConnection::new(Some(2));
    let conn = shared(conn);
    let store = OfflineStore::new(
        OfflineStoreConfig::new(SqlDialect::DuckDb).with_chunk_size(10),
        conn.clone(),
        registry(),
    )
    .unwrap();

    let job = store
        .get_historical_features(
            &["driver_stats:conv_rate"],
            EntitySource::Tabular(entity_batch(25)),
            false,
        )
        .unwrap();
    assert!(matches!(job.to_rows(), Err(Error::BackendExecutionError(_))));

    {
        let statements = log.lock().unwrap();
        assert_eq!(count_statements_in(&statements, "INSERT"), 2);
        assert!(statements.last().unwrap().starts_with("DROP TABLE IF EXISTS"));
        assert_eq!(count_statements_in(&statements, "WITH"), 0);
    }

    let staging = job.staging_table().unwrap();
    let left = remote_count(
        &mut *conn.lock().unwrap(),
        &format!("SELECT COUNT(*) AS n FROM duckdb_tables() WHERE table_name = '{}'", staging),
    );
    assert_eq!(left, Value::Int64(0));
}

#[test]
fn test_failed_chunk_keeps_staging_table_when_retained() {
    let (conn, log) = RecordingConnection::new(Some(2));
    let conn = shared(conn);
    let store = OfflineStore::new(
        OfflineStoreConfig::new(SqlDialect::DuckDb)
            .with_chunk_size(10)
            .with_retained_staging_tables(true),
        conn.clone(),
        registry(),
    )
    .unwrap();

    let job = store
        .get_historical_features(
            &["driver_stats:conv_rate"],
            EntitySource::Tabular(entity_batch(25)),
            false,
        )
        .unwrap();
    assert!(job.to_rows().is_err());
    assert_eq!(count_statements(&log, "DROP"), 0);

    // The first chunk made it in before the failure
    let staging = job.staging_table().unwrap();
    let rows = remote_count(
        &mut *conn.lock().unwrap(),
        &format!("SELECT COUNT(*) AS n FROM \"{}\"", staging),
    );
    assert_eq!(rows, Value::Int64(10));
}

fn count_statements_in(statements: &[String], prefix: &str) -> usize {
    statements.iter().filter(|s| s.starts_with(prefix)).count()
}

#[test]
fn test_store_rejects_mismatched_connection() {
    let err = OfflineStore::new(
        OfflineStoreConfig::new(SqlDialect::Hive),
        shared(DuckDbConnection::open_in_memory().unwrap()),
        registry(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::ConfigTypeMismatch { ref expected, ref actual } if expected == "hive" && actual == "duckdb"));
}

#[test]
fn test_store_from_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("offline_store.yaml");
    std::fs::write(
        &path,
        r#"
type: duckdb
entity_upload_chunk_size: 2
duckdb:
  threads: 1
"#,
    )
    .unwrap();

    let config = OfflineStoreConfig::load_from_file(&path).unwrap();
    let mut conn = DuckDbConnection::from_config(&config).unwrap();
    conn.execute(
        "CREATE TABLE driver_stats (driver_id BIGINT, event_timestamp TIMESTAMP, conv_rate DOUBLE)",
    )
    .unwrap();
    let store = OfflineStore::new(config, shared(conn), registry()).unwrap();

    let result = store
        .get_historical_features(
            &["driver_stats:conv_rate"],
            EntitySource::Tabular(entity_batch(5)),
            false,
        )
        .unwrap()
        .to_rows()
        .unwrap();
    assert_eq!(result.num_rows(), 5);
    assert!(result.rows().iter().all(|row| row[2].is_null()));
}
