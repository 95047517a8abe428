//! Point-in-time query compiler
//!
//! Builds, as a single statement, the join that attaches to every entity row
//! the feature values that were valid at that row's timestamp.
//!
//! ## Algorithm (per feature view)
//!
//! 1. Tag every entity row with `<view>__entity_row_unique_id`, the text
//!    concatenation of its join keys and timestamp.
//! 2. Prune backing rows to `[min(entity_timestamp) - ttl, max(entity_timestamp)]`
//!    over the whole entity batch (no lower bound when ttl = 0).
//! 3. Join backing rows to entity rows on every join key, keeping rows with
//!    `event_timestamp <= entity_timestamp` and, when ttl > 0,
//!    `event_timestamp >= entity_timestamp - ttl`.
//! 4. Keep the latest row per unique id, ordering by event timestamp then
//!    created timestamp.
//! 5. Left join every view's surviving rows back onto the entity rows.
//!
//! Step 4 has two renderings: a `ROW_NUMBER()` window, or a group-by/rejoin
//! chain for engines without window functions. Both come from
//! [`keep_latest`] and select the same rows.

use crate::dialect::SqlDialect;
use crate::error::{Error, Result};
use crate::sql::{render, Cte, Expr, JoinKind, OrderBy, Query, Select, TableFactor};
use crate::types::{TableRef, Value};
use chrono::NaiveDateTime;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

pub const ENTITY_DATAFRAME: &str = "entity_dataframe";
pub const ENTITY_BOUNDS: &str = "entity_bounds";
pub const ENTITY_TIMESTAMP: &str = "entity_timestamp";
pub const EVENT_TIMESTAMP: &str = "event_timestamp";
pub const CREATED_TIMESTAMP: &str = "created_timestamp";
const MIN_ENTITY_TIMESTAMP: &str = "min_entity_timestamp";
const MAX_ENTITY_TIMESTAMP: &str = "max_entity_timestamp";
const ROW_NUMBER: &str = "featurehive_row_number";
const ROW_KEY: &str = "featurehive_row_key";
const UNIQUE_ID_SEPARATOR: &str = "|";

/// A column read from a backing source, exposed under a logical name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSelection {
    /// Column name in the backing table
    pub source: String,
    /// Name the rest of the query refers to
    pub name: String,
}

impl ColumnSelection {
    pub fn new(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
        }
    }

    pub fn same(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: name.clone(),
            name,
        }
    }
}

/// Everything the compiler needs to know about one feature view
///
/// Built once from registry metadata and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureViewQueryContext {
    pub name: String,
    /// Ordered entity join keys
    pub join_keys: Vec<ColumnSelection>,
    pub features: Vec<ColumnSelection>,
    /// Event timestamp column in the backing table
    pub event_timestamp_column: String,
    /// Created timestamp column in the backing table, if any
    pub created_timestamp_column: Option<String>,
    /// 0 means unlimited
    pub ttl_seconds: u64,
    pub table: TableRef,
}

impl FeatureViewQueryContext {
    pub fn new(name: impl Into<String>, table: TableRef, event_timestamp_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            join_keys: Vec::new(),
            features: Vec::new(),
            event_timestamp_column: event_timestamp_column.into(),
            created_timestamp_column: None,
            ttl_seconds: 0,
            table,
        }
    }

    pub fn with_join_key(mut self, selection: ColumnSelection) -> Self {
        self.join_keys.push(selection);
        self
    }

    pub fn with_feature(mut self, selection: ColumnSelection) -> Self {
        self.features.push(selection);
        self
    }

    pub fn with_created_timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.created_timestamp_column = Some(column.into());
        self
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn join_key_names(&self) -> Vec<&str> {
        self.join_keys.iter().map(|k| k.name.as_str()).collect()
    }

    /// Output column name of a feature
    pub fn output_name(&self, feature: &str, full_feature_names: bool) -> String {
        if full_feature_names {
            self.qualified(feature)
        } else {
            feature.to_string()
        }
    }

    fn qualified(&self, suffix: &str) -> String {
        format!("{}__{}", self.name, suffix)
    }

    fn unique_id(&self) -> String {
        self.qualified("entity_row_unique_id")
    }
}

/// Left-hand side of the point-in-time join
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeftSource {
    /// Staged (or otherwise existing) table
    Table(String),
    /// Raw SELECT text
    Query(String),
}

impl LeftSource {
    fn factor(&self, alias: &str) -> TableFactor {
        match self {
            LeftSource::Table(name) => TableFactor::aliased(name, alias),
            LeftSource::Query(sql) => TableFactor::raw_query(sql, alias),
        }
    }
}

fn table_factor(table: &TableRef, alias: &str) -> TableFactor {
    match table {
        TableRef::Table(name) => TableFactor::aliased(name, alias),
        TableRef::Query(sql) => TableFactor::raw_query(sql, alias),
    }
}

/// Compile-time switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub dialect: SqlDialect,
    /// Prefix every output feature column with `<view>__`
    pub full_feature_names: bool,
    /// Use `ROW_NUMBER()` instead of the group-by/rejoin chain
    pub supports_window_functions: bool,
}

impl CompileOptions {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            full_feature_names: false,
            supports_window_functions: dialect.supports_window_functions(),
        }
    }

    pub fn with_full_feature_names(mut self, full_feature_names: bool) -> Self {
        self.full_feature_names = full_feature_names;
        self
    }

    pub fn with_window_functions(mut self, supported: bool) -> Self {
        self.supports_window_functions = supported;
        self
    }
}

/// Entity side of a point-in-time join
#[derive(Debug, Clone)]
pub struct EntityInput<'a> {
    pub source: LeftSource,
    /// Every entity column, in output order
    pub columns: &'a [String],
    pub event_timestamp_column: &'a str,
}

/// Builds the multi-view point-in-time join
///
/// Output columns are the entity columns followed by every view's features.
/// With zero views the entity input is selected unchanged.
pub fn build_point_in_time_query(
    contexts: &[FeatureViewQueryContext],
    entity: &EntityInput<'_>,
    options: &CompileOptions,
) -> Result<Query> {
    validate_request(contexts, entity, options)?;

    if contexts.is_empty() {
        let body = entity
            .columns
            .iter()
            .fold(Select::new(entity.source.factor("entity_source")), |s, c| {
                s.column(Expr::column(c))
            });
        return Ok(Query::new(body));
    }

    let mut ctes = vec![
        entity_dataframe_cte(contexts, entity),
        Cte {
            name: ENTITY_BOUNDS.to_string(),
            select: Select::new(TableFactor::table(ENTITY_DATAFRAME))
                .column_as(Expr::min(Expr::column(ENTITY_TIMESTAMP)), MIN_ENTITY_TIMESTAMP)
                .column_as(Expr::max(Expr::column(ENTITY_TIMESTAMP)), MAX_ENTITY_TIMESTAMP),
        },
    ];

    let mut cleaned = Vec::with_capacity(contexts.len());
    for ctx in contexts {
        ctes.push(view_entity_dataframe_cte(ctx));
        ctes.push(subquery_cte(ctx));
        ctes.push(base_cte(ctx));

        let partition = vec![ctx.unique_id()];
        let carry: Vec<String> = ctx.features.iter().map(|f| ctx.qualified(&f.name)).collect();
        let (latest_ctes, cleaned_name) = keep_latest(
            &LatestRowSpec {
                prefix: &ctx.name,
                source: &ctx.qualified("base"),
                partition_by: &partition,
                carry: &carry,
                event_timestamp: EVENT_TIMESTAMP,
                created_timestamp: ctx
                    .created_timestamp_column
                    .as_ref()
                    .map(|_| CREATED_TIMESTAMP),
            },
            options.supports_window_functions,
        );
        ctes.extend(latest_ctes);
        cleaned.push(cleaned_name);
    }

    let ed = "ed";
    let mut body = entity
        .columns
        .iter()
        .fold(Select::new(TableFactor::aliased(ENTITY_DATAFRAME, ed)), |s, c| {
            s.column(Expr::qualified(ed, c))
        });
    for (ctx, cleaned_name) in contexts.iter().zip(&cleaned) {
        for feature in &ctx.features {
            body = body.column_as(
                Expr::qualified(cleaned_name, &ctx.qualified(&feature.name)),
                &ctx.output_name(&feature.name, options.full_feature_names),
            );
        }
        body = body.join(
            JoinKind::Left,
            TableFactor::table(cleaned_name),
            Some(Expr::eq(
                Expr::qualified(ed, &ctx.unique_id()),
                Expr::qualified(cleaned_name, &ctx.unique_id()),
            )),
        );
    }

    Ok(Query::with_ctes(ctes, body))
}

/// Builds and renders the point-in-time join
pub fn compile_point_in_time(
    contexts: &[FeatureViewQueryContext],
    entity: &EntityInput<'_>,
    options: &CompileOptions,
) -> Result<String> {
    let query = build_point_in_time_query(contexts, entity, options)?;
    let sql = render(&query, options.dialect);
    debug!(
        feature_views = contexts.len(),
        dialect = %options.dialect,
        "Compiled point-in-time query:\n{}",
        sql
    );
    Ok(sql)
}

fn validate_request(
    contexts: &[FeatureViewQueryContext],
    entity: &EntityInput<'_>,
    options: &CompileOptions,
) -> Result<()> {
    if !entity.columns.iter().any(|c| c == entity.event_timestamp_column) {
        return Err(Error::MissingTimestampColumn(format!(
            "'{}' is not an entity column",
            entity.event_timestamp_column
        )));
    }
    if entity.event_timestamp_column != ENTITY_TIMESTAMP
        && entity.columns.iter().any(|c| c == ENTITY_TIMESTAMP)
    {
        return Err(Error::invalid_input(format!(
            "Entity column '{}' is reserved when the event timestamp is '{}'",
            ENTITY_TIMESTAMP, entity.event_timestamp_column
        )));
    }

    let mut names = HashSet::new();
    for ctx in contexts {
        if !names.insert(ctx.name.as_str()) {
            return Err(Error::invalid_input(format!(
                "Feature view '{}' appears more than once",
                ctx.name
            )));
        }
        for key in &ctx.join_keys {
            if !entity.columns.contains(&key.name) {
                return Err(Error::MissingJoinKey {
                    feature_view: ctx.name.clone(),
                    join_key: key.name.clone(),
                });
            }
        }
    }

    let mut seen = HashSet::new();
    let mut duplicates = BTreeSet::new();
    let outputs = entity.columns.iter().cloned().chain(contexts.iter().flat_map(|ctx| {
        ctx.features
            .iter()
            .map(move |f| ctx.output_name(&f.name, options.full_feature_names))
    }));
    for name in outputs {
        if !seen.insert(name.clone()) {
            duplicates.insert(name);
        }
    }
    if !duplicates.is_empty() {
        return Err(Error::FeatureNameCollision(duplicates.into_iter().collect()));
    }
    Ok(())
}

fn entity_dataframe_cte(contexts: &[FeatureViewQueryContext], entity: &EntityInput<'_>) -> Cte {
    let mut select = entity
        .columns
        .iter()
        .fold(Select::new(entity.source.factor("entity_source")), |s, c| {
            s.column(Expr::column(c))
        });
    if entity.event_timestamp_column != ENTITY_TIMESTAMP {
        select = select.column_as(Expr::column(entity.event_timestamp_column), ENTITY_TIMESTAMP);
    }

    for ctx in contexts {
        let mut parts = Vec::with_capacity(ctx.join_keys.len() * 2 + 1);
        for key in &ctx.join_keys {
            parts.push(Expr::cast_text(Expr::column(&key.name)));
            parts.push(Expr::string(UNIQUE_ID_SEPARATOR));
        }
        parts.push(Expr::cast_text(Expr::column(entity.event_timestamp_column)));
        select = select.column_as(Expr::function("CONCAT", parts), &ctx.unique_id());
    }

    Cte {
        name: ENTITY_DATAFRAME.to_string(),
        select,
    }
}

/// Distinct (keys, timestamp, id) triples of the entity rows
fn view_entity_dataframe_cte(ctx: &FeatureViewQueryContext) -> Cte {
    let mut columns: Vec<&str> = ctx.join_key_names();
    let unique_id = ctx.unique_id();
    columns.push(ENTITY_TIMESTAMP);
    columns.push(&unique_id);

    let select = columns.iter().fold(Select::new(TableFactor::table(ENTITY_DATAFRAME)), |s, c| {
        s.column(Expr::column(c)).group_by(Expr::column(c))
    });

    Cte {
        name: ctx.qualified("entity_dataframe"),
        select,
    }
}

/// Backing rows inside the batch-level time window
fn subquery_cte(ctx: &FeatureViewQueryContext) -> Cte {
    let src = "src";
    let bounds = "bounds";
    let event = Expr::qualified(src, &ctx.event_timestamp_column);

    let mut select = Select::new(table_factor(&ctx.table, src))
        .column_as(event.clone(), EVENT_TIMESTAMP);
    if let Some(created) = &ctx.created_timestamp_column {
        select = select.column_as(Expr::qualified(src, created), CREATED_TIMESTAMP);
    }
    for key in &ctx.join_keys {
        select = select.column_as(Expr::qualified(src, &key.source), &key.name);
    }
    for feature in &ctx.features {
        select = select.column_as(
            Expr::qualified(src, &feature.source),
            &ctx.qualified(&feature.name),
        );
    }

    select = select
        .join(
            JoinKind::Cross,
            TableFactor::aliased(ENTITY_BOUNDS, bounds),
            None,
        )
        .filter(Expr::lte(
            event.clone(),
            Expr::qualified(bounds, MAX_ENTITY_TIMESTAMP),
        ));
    if ctx.ttl_seconds > 0 {
        select = select.filter(Expr::gte(
            event,
            Expr::subtract_seconds(
                Expr::qualified(bounds, MIN_ENTITY_TIMESTAMP),
                ctx.ttl_seconds,
            ),
        ));
    }

    Cte {
        name: ctx.qualified("subquery"),
        select,
    }
}

/// Candidate rows joined to entity rows under the point-in-time predicate
fn base_cte(ctx: &FeatureViewQueryContext) -> Cte {
    let sq = "sq";
    let ed = "ed";

    let mut select = Select::new(TableFactor::aliased(&ctx.qualified("subquery"), sq))
        .column(Expr::qualified(sq, EVENT_TIMESTAMP));
    if ctx.created_timestamp_column.is_some() {
        select = select.column(Expr::qualified(sq, CREATED_TIMESTAMP));
    }
    select = select.column(Expr::qualified(ed, &ctx.unique_id()));
    for feature in &ctx.features {
        select = select.column(Expr::qualified(sq, &ctx.qualified(&feature.name)));
    }

    let on = Expr::and_all(
        ctx.join_keys
            .iter()
            .map(|k| Expr::eq(Expr::qualified(sq, &k.name), Expr::qualified(ed, &k.name))),
    );
    let kind = if on.is_some() {
        JoinKind::Inner
    } else {
        JoinKind::Cross
    };
    select = select
        .join(
            kind,
            TableFactor::aliased(&ctx.qualified("entity_dataframe"), ed),
            on,
        )
        .filter(Expr::lte(
            Expr::qualified(sq, EVENT_TIMESTAMP),
            Expr::qualified(ed, ENTITY_TIMESTAMP),
        ));
    if ctx.ttl_seconds > 0 {
        select = select.filter(Expr::gte(
            Expr::qualified(sq, EVENT_TIMESTAMP),
            Expr::subtract_seconds(Expr::qualified(ed, ENTITY_TIMESTAMP), ctx.ttl_seconds),
        ));
    }

    Cte {
        name: ctx.qualified("base"),
        select,
    }
}

/// Input of the "keep the most recent row per partition" step
#[derive(Debug, Clone, Copy)]
pub struct LatestRowSpec<'a> {
    /// Prefix of the generated CTE names
    pub prefix: &'a str,
    /// CTE holding the candidate rows
    pub source: &'a str,
    pub partition_by: &'a [String],
    /// Columns carried along from the winning row
    pub carry: &'a [String],
    pub event_timestamp: &'a str,
    pub created_timestamp: Option<&'a str>,
}

/// Emits the CTEs that keep one row per partition: maximum event timestamp,
/// ties broken by maximum created timestamp
///
/// Returns the CTEs and the name of the last one, whose columns are
/// partition, carry, event timestamp and (if any) created timestamp.
///
/// The group-by form rejoins on the winning timestamps. Rows tied on both
/// timestamps are narrowed to one whole row by the largest text encoding of
/// their carried values, so no output mixes columns of different rows.
pub fn keep_latest(spec: &LatestRowSpec<'_>, supports_window_functions: bool) -> (Vec<Cte>, String) {
    let cleaned = format!("{}__cleaned", spec.prefix);

    let mut output: Vec<&str> = spec
        .partition_by
        .iter()
        .chain(spec.carry)
        .map(String::as_str)
        .collect();
    output.push(spec.event_timestamp);
    if let Some(created) = spec.created_timestamp {
        output.push(created);
    }

    if supports_window_functions {
        let ranked = format!("{}__ranked", spec.prefix);

        let mut order_by = vec![OrderBy::desc(Expr::column(spec.event_timestamp))];
        if let Some(created) = spec.created_timestamp {
            order_by.push(OrderBy::desc(Expr::column(created)));
        }
        let row_number = Expr::row_number(
            spec.partition_by.iter().map(|c| Expr::column(c)).collect(),
            order_by,
        );

        let ranked_select = output
            .iter()
            .fold(Select::new(TableFactor::table(spec.source)), |s, c| {
                s.column(Expr::column(c))
            })
            .column_as(row_number, ROW_NUMBER);
        let cleaned_select = output
            .iter()
            .fold(Select::new(TableFactor::table(&ranked)), |s, c| {
                s.column(Expr::column(c))
            })
            .filter(Expr::eq(
                Expr::column(ROW_NUMBER),
                Expr::literal(Value::Int64(1)),
            ));

        return (
            vec![
                Cte {
                    name: ranked.clone(),
                    select: ranked_select,
                },
                Cte {
                    name: cleaned.clone(),
                    select: cleaned_select,
                },
            ],
            cleaned,
        );
    }

    let s = "s";
    let l = "l";
    let latest_event = format!("{}__latest_event", spec.prefix);
    let mut ctes = Vec::with_capacity(4);

    let partition_match = |extra: &[&str]| -> Vec<Expr> {
        spec.partition_by
            .iter()
            .map(String::as_str)
            .chain(extra.iter().copied())
            .map(|c| Expr::null_safe_eq(Expr::qualified(s, c), Expr::qualified(l, c)))
            .collect()
    };

    let latest_event_select = spec
        .partition_by
        .iter()
        .fold(Select::new(TableFactor::table(spec.source)), |sel, c| {
            sel.column(Expr::column(c)).group_by(Expr::column(c))
        })
        .column_as(Expr::max(Expr::column(spec.event_timestamp)), spec.event_timestamp);
    ctes.push(Cte {
        name: latest_event.clone(),
        select: latest_event_select,
    });

    let mut match_columns = vec![spec.event_timestamp];
    let latest = match spec.created_timestamp {
        Some(created) => {
            let latest = format!("{}__latest", spec.prefix);
            let select = spec
                .partition_by
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(spec.event_timestamp))
                .fold(Select::new(TableFactor::aliased(spec.source, s)), |sel, c| {
                    sel.column(Expr::qualified(s, c)).group_by(Expr::qualified(s, c))
                })
                .column_as(Expr::max(Expr::qualified(s, created)), created)
                .join(
                    JoinKind::Inner,
                    TableFactor::aliased(&latest_event, l),
                    Expr::and_all(partition_match(&[spec.event_timestamp])),
                );
            ctes.push(Cte {
                name: latest.clone(),
                select,
            });
            match_columns.push(created);
            latest
        }
        None => latest_event,
    };

    let (winner, key_match) = if spec.carry.is_empty() {
        (latest, None)
    } else {
        let tiebreak = format!("{}__tiebreak", spec.prefix);
        let select = spec
            .partition_by
            .iter()
            .map(String::as_str)
            .chain(match_columns.iter().copied())
            .fold(Select::new(TableFactor::aliased(spec.source, s)), |sel, c| {
                sel.column_as(Expr::qualified(s, c), c)
                    .group_by(Expr::qualified(s, c))
            })
            .column_as(Expr::max(row_key(s, spec.carry)), ROW_KEY)
            .join(
                JoinKind::Inner,
                TableFactor::aliased(&latest, l),
                Expr::and_all(partition_match(&match_columns)),
            );
        ctes.push(Cte {
            name: tiebreak.clone(),
            select,
        });
        let key_match = Expr::eq(row_key(s, spec.carry), Expr::qualified(l, ROW_KEY));
        (tiebreak, Some(key_match))
    };

    let mut cleaned_select = spec
        .partition_by
        .iter()
        .fold(Select::new(TableFactor::aliased(spec.source, s)), |sel, c| {
            sel.column_as(Expr::qualified(s, c), c)
                .group_by(Expr::qualified(s, c))
        });
    for column in spec
        .carry
        .iter()
        .map(String::as_str)
        .chain(match_columns.iter().copied())
    {
        cleaned_select = cleaned_select.column_as(Expr::max(Expr::qualified(s, column)), column);
    }
    // Rows sharing the winning key carry the same values; MAX only folds them
    cleaned_select = cleaned_select.join(
        JoinKind::Inner,
        TableFactor::aliased(&winner, l),
        Expr::and_all(partition_match(&match_columns).into_iter().chain(key_match)),
    );
    if spec.partition_by.is_empty() {
        // A global aggregate over zero rows would still produce one row
        cleaned_select = cleaned_select.having(Expr::gt(
            Expr::count_all(),
            Expr::literal(Value::Int64(0)),
        ));
    }
    ctes.push(Cte {
        name: cleaned.clone(),
        select: cleaned_select,
    });

    (ctes, cleaned)
}

/// Text encoding of a row's carried values
///
/// Each column becomes `<length>:<text>`, or `~:` when NULL, so two rows
/// encode alike only when every carried value renders to the same text.
fn row_key(qualifier: &str, carry: &[String]) -> Expr {
    let mut parts = Vec::with_capacity(carry.len() * 3);
    for column in carry {
        let text = Expr::cast_text(Expr::qualified(qualifier, column));
        parts.push(Expr::function(
            "COALESCE",
            vec![
                Expr::cast_text(Expr::function("LENGTH", vec![text.clone()])),
                Expr::string("~"),
            ],
        ));
        parts.push(Expr::string(":"));
        parts.push(Expr::function("COALESCE", vec![text, Expr::string("")]));
    }
    Expr::function("CONCAT", parts)
}

/// Parameters of a latest-value query
#[derive(Debug, Clone)]
pub struct LatestValueRequest<'a> {
    pub table: &'a TableRef,
    pub join_keys: &'a [String],
    pub feature_columns: &'a [String],
    pub event_timestamp_column: &'a str,
    pub created_timestamp_column: Option<&'a str>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

const LATEST_PREFIX: &str = "featurehive";

/// Builds the query returning the most recent row per join-key combination
/// with event timestamp in `[start, end]`
pub fn build_latest_query(request: &LatestValueRequest<'_>, options: &CompileOptions) -> Result<Query> {
    let mut columns: Vec<&str> = request
        .join_keys
        .iter()
        .chain(request.feature_columns)
        .map(String::as_str)
        .collect();
    columns.push(request.event_timestamp_column);
    if let Some(created) = request.created_timestamp_column {
        columns.push(created);
    }

    let mut seen = HashSet::new();
    if let Some(dup) = columns.iter().find(|c| !seen.insert(**c)) {
        return Err(Error::invalid_input(format!(
            "Column '{}' is requested more than once",
            dup
        )));
    }
    if request.start > request.end {
        return Err(Error::invalid_input(format!(
            "Start date {} is after end date {}",
            request.start, request.end
        )));
    }

    let src = "src";
    let source_name = format!("{}__source", LATEST_PREFIX);
    let source_select = columns
        .iter()
        .fold(Select::new(table_factor(request.table, src)), |s, c| {
            s.column_as(Expr::qualified(src, c), c)
        })
        .filter(Expr::between(
            Expr::qualified(src, request.event_timestamp_column),
            Expr::literal(Value::Timestamp(request.start)),
            Expr::literal(Value::Timestamp(request.end)),
        ));

    let mut ctes = vec![Cte {
        name: source_name.clone(),
        select: source_select,
    }];
    let (latest_ctes, cleaned) = keep_latest(
        &LatestRowSpec {
            prefix: LATEST_PREFIX,
            source: &source_name,
            partition_by: request.join_keys,
            carry: request.feature_columns,
            event_timestamp: request.event_timestamp_column,
            created_timestamp: request.created_timestamp_column,
        },
        options.supports_window_functions,
    );
    ctes.extend(latest_ctes);

    let body = columns
        .iter()
        .fold(Select::new(TableFactor::table(&cleaned)), |s, c| {
            s.column(Expr::column(c))
        });
    Ok(Query::with_ctes(ctes, body))
}

/// Builds and renders the latest-value query
pub fn compile_latest(request: &LatestValueRequest<'_>, options: &CompileOptions) -> Result<String> {
    let sql = render(&build_latest_query(request, options)?, options.dialect);
    debug!(dialect = %options.dialect, "Compiled latest-value query:\n{}", sql);
    Ok(sql)
}
