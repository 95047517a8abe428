//! Entity staging
//!
//! Moves the caller's entity observations into a remote table so that the
//! point-in-time join can run entirely inside the warehouse.
//!
//! Two paths:
//! - tabular data: `CREATE TABLE` from the entity schema, then one
//!   multi-row `INSERT` per chunk, issued strictly in order
//! - query text: `CREATE TEMPORARY TABLE .. AS SELECT`, then a one-row
//!   probe to learn the schema
//!
//! Neither path is transactional. A failing chunk leaves the table created
//! and holding the chunks before it; cleanup belongs to the retrieval job.

use crate::observability;
use arrow::record_batch::RecordBatch;
use featurehive_core::config::DEFAULT_ENTITY_UPLOAD_CHUNK_SIZE;
use featurehive_core::sql::{render, Query, Select, TableFactor};
use featurehive_core::type_map::to_backend;
use featurehive_core::validation::EntitySchema;
use featurehive_core::{Error, OfflineStoreConfig, Result, ResultTable, SqlConnection, SqlDialect};
use tracing::{debug, info};

/// Outcome of a tabular upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    pub rows: usize,
    /// INSERT statements issued
    pub chunks: usize,
}

/// Stages entity data into warehouse tables
#[derive(Debug, Clone, Copy)]
pub struct EntityStager {
    dialect: SqlDialect,
    chunk_size: i64,
}

impl EntityStager {
    /// Creates a stager; a chunk size ≤ 0 uploads everything in one INSERT
    pub fn new(dialect: SqlDialect, chunk_size: i64) -> Self {
        Self {
            dialect,
            chunk_size,
        }
    }

    pub fn from_config(config: &OfflineStoreConfig) -> Self {
        Self::new(config.store_type, config.entity_upload_chunk_size)
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn chunk_size(&self) -> i64 {
        self.chunk_size
    }

    /// Rows per INSERT for an upload of `total_rows`
    pub fn chunk_len(&self, total_rows: usize) -> usize {
        if self.chunk_size <= 0 {
            total_rows.max(1)
        } else {
            usize::try_from(self.chunk_size).unwrap_or(usize::MAX)
        }
    }

    /// `CREATE TABLE` statement for a staging table
    pub fn create_table_sql(&self, table: &str, schema: &EntitySchema) -> Result<String> {
        if schema.is_empty() {
            return Err(Error::invalid_input(format!(
                "Cannot create staging table '{}' without columns",
                table
            )));
        }

        let columns = schema
            .columns()
            .iter()
            .map(|c| {
                format!(
                    "    {} {}",
                    self.dialect.quote_identifier(&c.name),
                    to_backend(c.value_type)
                )
            })
            .collect::<Vec<_>>()
            .join(",\n");
        Ok(format!(
            "CREATE TABLE {} (\n{}\n)",
            self.dialect.quote_identifier(table),
            columns
        ))
    }

    /// One multi-row INSERT for a chunk of rows
    ///
    /// Values are taken from `chunk` in the column order of `schema`.
    pub fn insert_sql(&self, table: &str, schema: &EntitySchema, chunk: &ResultTable) -> Result<String> {
        let positions = schema
            .columns()
            .iter()
            .map(|c| {
                chunk.column_index(&c.name).ok_or_else(|| {
                    Error::invalid_input(format!("Entity data has no column '{}'", c.name))
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        let column_list = schema
            .columns()
            .iter()
            .map(|c| self.dialect.quote_identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let rows = chunk
            .rows()
            .iter()
            .map(|row| {
                let values = positions
                    .iter()
                    .map(|&idx| self.dialect.insert_literal(&row[idx]))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({})", values)
            })
            .collect::<Vec<_>>()
            .join(",\n");

        Ok(format!(
            "{} {} ({})\nVALUES\n{}",
            self.dialect.insert_prefix(),
            self.dialect.quote_identifier(table),
            column_list,
            rows
        ))
    }

    /// Creates `table` and fills it with `batch`
    ///
    /// The table name must be fresh; uploading twice into the same name fails
    /// on the second `CREATE TABLE`.
    ///
    /// # Errors
    ///
    /// - `UnsupportedColumnType` when a chunk holds a column without a
    ///   canonical type; this surfaces after `CREATE TABLE` but before any
    ///   INSERT
    /// - `BackendExecutionError` from any statement
    pub fn upload(
        &self,
        conn: &mut dyn SqlConnection,
        table: &str,
        batch: &RecordBatch,
        schema: &EntitySchema,
    ) -> Result<UploadSummary> {
        conn.execute(&self.create_table_sql(table, schema)?)?;
        info!(table = table, columns = schema.columns().len(), "Created entity staging table");

        let total = batch.num_rows();
        let chunk_len = self.chunk_len(total);
        let mut offset = 0;
        let mut chunks = 0;
        while offset < total {
            let len = chunk_len.min(total - offset);
            let chunk = ResultTable::from_record_batch(&batch.slice(offset, len))?;
            let sql = self.insert_sql(table, schema, &chunk)?;
            conn.execute(&sql)?;

            chunks += 1;
            offset += len;
            observability::increment_insert_chunks(1);
            observability::increment_rows_uploaded(len);
            debug!(
                table = table,
                chunk = chunks,
                rows = len,
                uploaded = offset,
                total = total,
                "Inserted entity chunk"
            );
        }

        info!(table = table, rows = total, chunks = chunks, "Uploaded entity rows");
        Ok(UploadSummary {
            rows: total,
            chunks,
        })
    }

    /// `CREATE TEMPORARY TABLE` wrapping caller-supplied query text
    pub fn create_from_query_sql(&self, table: &str, query: &str) -> String {
        let select = Query::new(Select::new(TableFactor::raw_query(query, "entity_source")));
        format!(
            "CREATE TEMPORARY TABLE {} AS\n{}",
            self.dialect.quote_identifier(table),
            render(&select, self.dialect)
        )
    }

    /// Materializes `query` into `table` and returns the staged schema
    ///
    /// The schema is read from a `LIMIT 1` probe, so an empty result still
    /// reports its column types.
    pub fn stage_query(&self, conn: &mut dyn SqlConnection, table: &str, query: &str) -> Result<EntitySchema> {
        conn.execute(&self.create_from_query_sql(table, query))?;
        info!(table = table, "Created entity staging table from query");

        let probe = format!("SELECT * FROM {} LIMIT 1", self.dialect.quote_identifier(table));
        let schema = EntitySchema::from_table(&conn.query(&probe)?);
        debug!(table = table, columns = ?schema.column_names(), "Probed staged entity schema");
        Ok(schema)
    }
}

impl Default for EntityStager {
    fn default() -> Self {
        Self::new(SqlDialect::Hive, DEFAULT_ENTITY_UPLOAD_CHUNK_SIZE)
    }
}
