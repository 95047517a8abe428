use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use featurehive_core::point_in_time::{
    compile_point_in_time, ColumnSelection, CompileOptions, EntityInput, FeatureViewQueryContext,
    LeftSource,
};
use featurehive_core::validation::EntitySchema;
use featurehive_core::{ColumnSchema, ResultTable, SqlDialect, TableRef, Value, ValueType};
use featurehive_offline::EntityStager;

fn feature_views(count: usize, features_per_view: usize) -> Vec<FeatureViewQueryContext> {
    (0..count)
        .map(|v| {
            let mut ctx = FeatureViewQueryContext::new(
                format!("view_{}", v),
                TableRef::Table(format!("feast.view_{}", v)),
                "event_timestamp",
            )
            .with_join_key(ColumnSelection::same("user_id"))
            .with_created_timestamp_column("created")
            .with_ttl_seconds(86_400);
            for f in 0..features_per_view {
                ctx = ctx.with_feature(ColumnSelection::same(format!("f_{}", f)));
            }
            ctx
        })
        .collect()
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_point_in_time");
    let columns = vec!["user_id".to_string(), "event_timestamp".to_string()];
    let entity = EntityInput {
        source: LeftSource::Table("featurehive_entity_df_bench".to_string()),
        columns: &columns,
        event_timestamp_column: "event_timestamp",
    };

    for views in [1, 5, 20] {
        let contexts = feature_views(views, 10);
        for window_functions in [true, false] {
            let options = CompileOptions::new(SqlDialect::Hive)
                .with_full_feature_names(true)
                .with_window_functions(window_functions);
            let label = if window_functions { "window" } else { "group_by" };
            group.bench_with_input(BenchmarkId::new(label, views), &contexts, |b, contexts| {
                b.iter(|| compile_point_in_time(black_box(contexts), &entity, &options).unwrap())
            });
        }
    }
    group.finish();
}

fn bench_insert_rendering(c: &mut Criterion) {
    let schema = EntitySchema::new(vec![
        ColumnSchema::new("user_id", ValueType::String),
        ColumnSchema::new("event_timestamp", ValueType::Timestamp),
    ]);
    let now = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(10, 0, 0))
        .unwrap();
    let rows: Vec<Vec<Value>> = (0..10_000)
        .map(|i| vec![Value::String(format!("user_{}", i)), Value::Timestamp(now)])
        .collect();
    let chunk = ResultTable::new(schema.columns().to_vec(), rows).unwrap();
    let stager = EntityStager::new(SqlDialect::Hive, 10_000);

    c.bench_function("render_insert_10k_rows", |b| {
        b.iter(|| stager.insert_sql("entity_df", black_box(&schema), black_box(&chunk)).unwrap())
    });
}

criterion_group!(benches, bench_compile, bench_insert_rendering);
criterion_main!(benches);
