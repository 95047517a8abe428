//! Offline store facade
//!
//! Entry points:
//! - [`OfflineStore::pull_latest_from_table_or_query`]: newest row per
//!   join-key combination within a time range, from one source
//! - [`OfflineStore::get_historical_features`]: point-in-time join of any
//!   number of feature views onto caller-supplied entity rows
//!
//! Both return a [`RetrievalJob`]; nothing touches the warehouse until the
//! job is materialized.

use crate::retrieval_job::{EntitySource, PointInTimePlan, RetrievalJob};
use crate::stager::EntityStager;
use chrono::NaiveDateTime;
use featurehive_core::connector::ensure_dialect;
use featurehive_core::point_in_time::{compile_latest, CompileOptions, LatestValueRequest};
use featurehive_core::registry::{
    build_query_contexts, expected_join_keys, resolve_feature_refs, FeatureRegistry,
};
use featurehive_core::validation::EntitySchema;
use featurehive_core::{
    recover_mutex, DataSource, Error, OfflineStoreConfig, Result, SharedConnection,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Prefix of every entity staging table
pub const STAGING_TABLE_PREFIX: &str = "featurehive_entity_df_";

pub struct OfflineStore {
    config: OfflineStoreConfig,
    connection: SharedConnection,
    registry: Arc<dyn FeatureRegistry>,
}

impl OfflineStore {
    /// Creates a store over an open connection
    ///
    /// # Errors
    ///
    /// `ConfigTypeMismatch` if the connection speaks a different dialect than
    /// the config selects
    pub fn new(
        config: OfflineStoreConfig,
        connection: SharedConnection,
        registry: Arc<dyn FeatureRegistry>,
    ) -> Result<Self> {
        {
            let guard = recover_mutex(&connection, "SqlConnection")?;
            ensure_dialect(&*guard, config.store_type)?;
        }
        info!(
            dialect = %config.store_type,
            chunk_size = config.entity_upload_chunk_size,
            window_functions = config.window_functions_enabled(),
            "Offline store ready"
        );
        Ok(Self {
            config,
            connection,
            registry,
        })
    }

    pub fn config(&self) -> &OfflineStoreConfig {
        &self.config
    }

    pub fn connection(&self) -> SharedConnection {
        self.connection.clone()
    }

    fn compile_options(&self, full_feature_names: bool) -> CompileOptions {
        CompileOptions::new(self.config.store_type)
            .with_full_feature_names(full_feature_names)
            .with_window_functions(self.config.window_functions_enabled())
    }

    fn session_preamble(&self) -> Vec<String> {
        self.config
            .store_type
            .session_preamble(&self.config.hive.configuration)
    }

    /// Newest row per join-key combination with event timestamp in `[start, end]`
    ///
    /// Rows are ranked by event timestamp, then by the source's created
    /// timestamp when it has one. No staging table is involved. Column names
    /// are those of the source table or query.
    pub fn pull_latest_from_table_or_query(
        &self,
        source: &DataSource,
        join_key_columns: &[String],
        feature_columns: &[String],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<RetrievalJob> {
        let sql = compile_latest(
            &LatestValueRequest {
                table: &source.table,
                join_keys: join_key_columns,
                feature_columns,
                event_timestamp_column: &source.event_timestamp_column,
                created_timestamp_column: source.created_timestamp_column.as_deref(),
                start,
                end,
            },
            &self.compile_options(false),
        )?;
        info!(
            join_keys = ?join_key_columns,
            features = feature_columns.len(),
            %start,
            %end,
            "Prepared latest-value retrieval"
        );
        Ok(RetrievalJob::query(
            self.connection.clone(),
            sql,
            self.session_preamble(),
        ))
    }

    /// Point-in-time join of the referenced features onto `entity`
    ///
    /// `feature_refs` are `"<view>:<feature>"` strings. Tabular entity data is
    /// validated here; a query source is validated after it is staged.
    ///
    /// # Errors
    ///
    /// - `UnsupportedEntitySource` for an empty query or a batch without columns
    /// - `FeatureViewNotFound`, `EntityNotFound`, `InvalidFeatureRef` from the registry
    /// - `UnsupportedColumnType`, `MissingTimestampColumn`, `MissingJoinKey`
    ///   for tabular entity data that cannot be joined
    pub fn get_historical_features<S: AsRef<str>>(
        &self,
        feature_refs: &[S],
        entity: EntitySource,
        full_feature_names: bool,
    ) -> Result<RetrievalJob> {
        match &entity {
            EntitySource::Query(query) if query.trim().trim_end_matches(';').trim().is_empty() => {
                return Err(Error::UnsupportedEntitySource(
                    "entity query is empty".to_string(),
                ));
            }
            EntitySource::Tabular(batch) if batch.num_columns() == 0 => {
                return Err(Error::UnsupportedEntitySource(
                    "entity data has no columns".to_string(),
                ));
            }
            _ => {}
        }

        let registry = self.registry.as_ref();
        let views = resolve_feature_refs(registry, feature_refs)?;
        let expected = expected_join_keys(registry, &views)?;
        let contexts = build_query_contexts(registry, &views)?;

        if let EntitySource::Tabular(batch) = &entity {
            let schema = EntitySchema::from_record_batch(batch)?;
            let event_timestamp_column = schema.infer_event_timestamp_column()?;
            schema.assert_expected_columns(&expected, &event_timestamp_column)?;
        }

        let staging_table = format!("{}{}", STAGING_TABLE_PREFIX, Uuid::new_v4().simple());
        info!(
            feature_views = contexts.len(),
            entity_source = entity.kind(),
            staging_table = %staging_table,
            full_feature_names,
            "Prepared historical retrieval"
        );

        Ok(RetrievalJob::point_in_time(
            self.connection.clone(),
            PointInTimePlan {
                contexts,
                expected_join_keys: expected,
                entity,
                staging_table,
                options: self.compile_options(full_feature_names),
                stager: EntityStager::from_config(&self.config),
                retain_staging_table_on_failure: self.config.retain_staging_table_on_failure,
                preamble: self.session_preamble(),
            },
        ))
    }
}
