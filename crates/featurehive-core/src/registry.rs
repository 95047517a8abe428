//! Registry collaborator
//!
//! The offline store never owns feature metadata. It reads entity and
//! feature-view descriptors through [`FeatureRegistry`] and turns them into
//! the immutable [`FeatureViewQueryContext`]s the compiler consumes.
//!
//! [`InMemoryRegistry`] is a simple implementation, loadable from YAML/JSON:
//!
//! ```yaml
//! entities:
//!   - name: driver
//!     join_key: driver_id
//!     value_type: int64
//! feature_views:
//!   - name: driver_stats
//!     entities: [driver]
//!     ttl_seconds: 86400
//!     features:
//!       - { name: conv_rate, value_type: float64 }
//!     source:
//!       table: feast.driver_stats
//!       event_timestamp_column: event_timestamp
//! ```

use crate::config::load_from_file;
use crate::error::{Error, Result};
use crate::point_in_time::{ColumnSelection, FeatureViewQueryContext};
use crate::types::{EntityDef, FeatureViewDef};
use crate::validation::ExpectedJoinKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Read-only source of feature metadata
pub trait FeatureRegistry: Send + Sync {
    /// # Errors
    ///
    /// `FeatureViewNotFound` if no view has this name
    fn get_feature_view(&self, name: &str) -> Result<FeatureViewDef>;

    /// # Errors
    ///
    /// `EntityNotFound` if no entity has this name
    fn get_entity(&self, name: &str) -> Result<EntityDef>;
}

/// Registry held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    entities: HashMap<String, EntityDef>,
    feature_views: HashMap<String, FeatureViewDef>,
}

/// On-disk layout of a registry file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub entities: Vec<EntityDef>,
    #[serde(default)]
    pub feature_views: Vec<FeatureViewDef>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    pub fn with_feature_view(mut self, view: FeatureViewDef) -> Self {
        self.feature_views.insert(view.name.clone(), view);
        self
    }

    pub fn from_definitions(file: RegistryFile) -> Self {
        let registry = file
            .entities
            .into_iter()
            .fold(Self::new(), |r, e| r.with_entity(e));
        file.feature_views
            .into_iter()
            .fold(registry, |r, v| r.with_feature_view(v))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: RegistryFile = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse registry YAML: {}", e)))?;
        Ok(Self::from_definitions(file))
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file: RegistryFile = load_from_file(path.as_ref())?;
        Ok(Self::from_definitions(file))
    }
}

impl FeatureRegistry for InMemoryRegistry {
    fn get_feature_view(&self, name: &str) -> Result<FeatureViewDef> {
        self.feature_views
            .get(name)
            .cloned()
            .ok_or_else(|| Error::FeatureViewNotFound(name.to_string()))
    }

    fn get_entity(&self, name: &str) -> Result<EntityDef> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| Error::EntityNotFound(name.to_string()))
    }
}

/// A parsed `"<feature_view>:<feature>"` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRef {
    pub feature_view: String,
    pub feature: String,
}

impl FeatureRef {
    pub fn parse(reference: &str) -> Result<Self> {
        match reference.split_once(':') {
            Some((view, feature))
                if !view.is_empty() && !feature.is_empty() && !feature.contains(':') =>
            {
                Ok(Self {
                    feature_view: view.to_string(),
                    feature: feature.to_string(),
                })
            }
            _ => Err(Error::InvalidFeatureRef(reference.to_string())),
        }
    }
}

/// A feature view together with the subset of its features requested
#[derive(Debug, Clone)]
pub struct RequestedFeatureView {
    pub view: FeatureViewDef,
    pub features: Vec<String>,
}

/// Resolves feature references against the registry
///
/// Views come back in order of first reference, each with its requested
/// features in reference order and without duplicates.
pub fn resolve_feature_refs<S: AsRef<str>>(
    registry: &dyn FeatureRegistry,
    feature_refs: &[S],
) -> Result<Vec<RequestedFeatureView>> {
    let mut requested: Vec<RequestedFeatureView> = Vec::new();
    for reference in feature_refs {
        let parsed = FeatureRef::parse(reference.as_ref())?;
        let idx = match requested
            .iter()
            .position(|r| r.view.name == parsed.feature_view)
        {
            Some(idx) => idx,
            None => {
                requested.push(RequestedFeatureView {
                    view: registry.get_feature_view(&parsed.feature_view)?,
                    features: Vec::new(),
                });
                requested.len() - 1
            }
        };

        let entry = &mut requested[idx];
        if entry.view.feature(&parsed.feature).is_none() {
            return Err(Error::InvalidFeatureRef(format!(
                "{} (feature view '{}' has no feature '{}')",
                reference.as_ref(),
                parsed.feature_view,
                parsed.feature
            )));
        }
        if !entry.features.contains(&parsed.feature) {
            entry.features.push(parsed.feature);
        }
    }
    Ok(requested)
}

/// Join keys of a view, in entity order
fn view_join_keys(registry: &dyn FeatureRegistry, view: &FeatureViewDef) -> Result<Vec<String>> {
    view.entities
        .iter()
        .map(|entity| registry.get_entity(entity).map(|e| e.join_key))
        .collect()
}

/// Every join key the requested views need from the entity data
pub fn expected_join_keys(
    registry: &dyn FeatureRegistry,
    views: &[RequestedFeatureView],
) -> Result<Vec<ExpectedJoinKey>> {
    let mut expected: Vec<ExpectedJoinKey> = Vec::new();
    for requested in views {
        for join_key in view_join_keys(registry, &requested.view)? {
            if !expected.iter().any(|e| e.join_key == join_key) {
                expected.push(ExpectedJoinKey::new(&requested.view.name, join_key));
            }
        }
    }
    Ok(expected)
}

/// Builds one query context per requested view
///
/// The data source's field mapping (source column → logical name) is
/// applied in reverse so that the compiler reads `source` columns and
/// exposes them under their logical names.
pub fn build_query_contexts(
    registry: &dyn FeatureRegistry,
    views: &[RequestedFeatureView],
) -> Result<Vec<FeatureViewQueryContext>> {
    views
        .iter()
        .map(|requested| {
            let view = &requested.view;
            let source = &view.source;
            let reverse: HashMap<&str, &str> = source
                .field_mapping
                .iter()
                .map(|(src, logical)| (logical.as_str(), src.as_str()))
                .collect();
            let source_column = |logical: &str| -> String {
                reverse.get(logical).copied().unwrap_or(logical).to_string()
            };

            let mut ctx = FeatureViewQueryContext::new(
                &view.name,
                source.table.clone(),
                source_column(&source.event_timestamp_column),
            )
            .with_ttl_seconds(view.ttl_seconds);
            if let Some(created) = &source.created_timestamp_column {
                ctx = ctx.with_created_timestamp_column(source_column(created));
            }
            for join_key in view_join_keys(registry, view)? {
                ctx = ctx.with_join_key(ColumnSelection::new(source_column(&join_key), join_key));
            }
            for feature in &requested.features {
                ctx = ctx.with_feature(ColumnSelection::new(source_column(feature), feature.as_str()));
            }
            Ok(ctx)
        })
        .collect()
}
