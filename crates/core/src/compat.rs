//! Legacy query façade mirroring the upstream layout API surface.
//!
//! Translates the older query vocabulary (return types, `Query` enum values,
//! integer filters, pluralized entity accessors) onto [`Layout`]. Entry
//! points with no implementation return a dedicated compatibility error.

use crate::bidspath::BidsPath;
use crate::error::{LayoutError, Result};
use crate::filter::{FilterSpec, FilterValue, Scope};
use crate::layout::Layout;
use crate::schema;
use crate::types::JsonMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Legacy query vocabulary
// ---------------------------------------------------------------------------

/// Enum values accepted wherever a filter value can appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// The entity must be defined, with any value.
    Any,
    /// Alias of [`Query::Any`].
    Required,
    /// The entity must not be defined.
    None,
    /// No constraint.
    Optional,
}

/// A filter value in the legacy vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyFilter {
    Text(String),
    /// Integers are matched by their decimal string form.
    Int(i64),
    Flag(bool),
    Query(Query),
    Many(Vec<LegacyFilter>),
}

impl From<&str> for LegacyFilter {
    fn from(value: &str) -> Self {
        LegacyFilter::Text(value.to_string())
    }
}

impl From<i64> for LegacyFilter {
    fn from(value: i64) -> Self {
        LegacyFilter::Int(value)
    }
}

impl From<bool> for LegacyFilter {
    fn from(value: bool) -> Self {
        LegacyFilter::Flag(value)
    }
}

impl From<Query> for LegacyFilter {
    fn from(value: Query) -> Self {
        LegacyFilter::Query(value)
    }
}

impl LegacyFilter {
    /// Translate into the engine's filter value.
    ///
    /// Non-scalar members of a list (flags, query enums) contribute nothing
    /// to the membership set.
    fn to_filter_value(&self) -> FilterValue {
        match self {
            LegacyFilter::Text(s) => FilterValue::Equal(s.clone()),
            LegacyFilter::Int(i) => FilterValue::Equal(i.to_string()),
            LegacyFilter::Flag(true) => FilterValue::Present,
            LegacyFilter::Flag(false) => FilterValue::Absent,
            LegacyFilter::Query(Query::Any) | LegacyFilter::Query(Query::Required) => {
                FilterValue::Present
            }
            LegacyFilter::Query(Query::None) => FilterValue::Absent,
            LegacyFilter::Query(Query::Optional) => FilterValue::Unconstrained,
            LegacyFilter::Many(items) => {
                let values: Vec<String> = items
                    .iter()
                    .filter_map(|item| match item {
                        LegacyFilter::Text(s) => Some(s.clone()),
                        LegacyFilter::Int(i) => Some(i.to_string()),
                        _ => None,
                    })
                    .collect();
                FilterValue::OneOf(values)
            }
        }
    }
}

/// What [`CompatLayout::get`] should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Object,
    File,
    Id,
}

/// Result of a legacy `get` call, shaped by its [`ReturnType`].
#[derive(Debug)]
pub enum GetResult {
    Objects(Vec<BidsPath>),
    Files(Vec<String>),
    Ids(Vec<String>),
}

// ---------------------------------------------------------------------------
// Façade
// ---------------------------------------------------------------------------

/// Compatibility wrapper exposing the legacy API over a [`Layout`].
#[derive(Debug, Clone)]
pub struct CompatLayout {
    layout: Layout,
}

impl CompatLayout {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn spec_from(scope: Option<Scope>, filters: &[(String, LegacyFilter)]) -> FilterSpec {
        let mut spec = FilterSpec::new();
        if let Some(scope) = scope {
            spec = spec.scope(scope);
        }
        for (name, value) in filters {
            spec = spec.entity(name, value.to_filter_value());
        }
        spec
    }

    /// Retrieve files matching the given filters.
    pub fn get(
        &self,
        return_type: ReturnType,
        target: Option<&str>,
        scope: Option<Scope>,
        filters: &[(String, LegacyFilter)],
    ) -> Result<GetResult> {
        let view = self.layout.filter(&Self::spec_from(scope, filters))?;
        match return_type {
            ReturnType::Object => Ok(GetResult::Objects(view.materialize()?)),
            ReturnType::File => Ok(GetResult::Files(
                view.materialize()?.iter().map(|p| p.to_string()).collect(),
            )),
            ReturnType::Id => {
                let Some(target) = target else {
                    return Err(LayoutError::Compatibility(
                        "get(return_type=Id) without a target entity".to_string(),
                    ));
                };
                let target = schema::short_to_long(target).to_string();
                view.materialize()?;
                let mut listing = view.get_entities(None, None)?;
                match listing.remove(&target) {
                    Some(values) => Ok(GetResult::Ids(values)),
                    None => Err(LayoutError::UnknownEntity(target)),
                }
            }
        }
    }

    /// Look up one file by absolute or root-relative path.
    pub fn get_file(&self, path: &Path, scope: Option<Scope>) -> Result<Option<BidsPath>> {
        let view = match scope {
            Some(scope) => self.layout.filter(&FilterSpec::new().scope(scope))?,
            None => self.layout.clone(),
        };
        Ok(view.get_file(path))
    }

    /// Metadata for the file at `path`, optionally merged with its filename
    /// entities.
    pub fn get_metadata(
        &self,
        path: &Path,
        include_entities: bool,
        scope: Option<Scope>,
    ) -> Result<JsonMap> {
        let Some(file) = self.get_file(path, scope)? else {
            return Err(LayoutError::FileNotFound(path.to_path_buf()));
        };
        let mut result = JsonMap::new();
        if include_entities {
            for (name, value) in file.entities().iter() {
                result.insert(name.to_string(), serde_json::Value::String(value.to_string()));
            }
        }
        for (key, value) in file.metadata() {
            result.insert(key, value);
        }
        Ok(result)
    }

    /// Dataset descriptions of the datasets selected by `scope`.
    ///
    /// With `all=false` only the first matching description is returned.
    pub fn get_dataset_description(
        &self,
        scope: Option<Scope>,
        all: bool,
    ) -> Result<Vec<JsonMap>> {
        let scope = scope.unwrap_or(Scope::This);
        let inner = self.layout.inner();
        let selected = self.layout.resolve_scope(&scope)?;

        let mut descriptions: Vec<JsonMap> = Vec::new();
        for i in selected {
            descriptions.push(inner.datasets[i].description.clone().unwrap_or_default());
        }
        if !all {
            descriptions.truncate(1);
        }
        Ok(descriptions)
    }

    /// Sorted unique values of one entity among matching files, accepting the
    /// legacy pluralized spelling (`subjects` -> `subject`).
    pub fn get_by_entity(
        &self,
        name: &str,
        filters: &[(String, LegacyFilter)],
    ) -> Result<Vec<String>> {
        let resolved = self.resolve_entity_name(name)?;
        let view = self.layout.filter(&Self::spec_from(None, filters))?;
        view.materialize()?;
        let mut listing = view.get_entities(None, None)?;
        Ok(listing.remove(&resolved).unwrap_or_default())
    }

    /// Map a possibly-pluralized accessor name onto a tracked entity.
    ///
    /// Mirrors the legacy singularization: strip `s`, strip `es`, or replace
    /// a trailing `ies` with `y`.
    fn resolve_entity_name(&self, name: &str) -> Result<String> {
        let known = self.layout.get_entities(None, None)?;
        let canonical = schema::short_to_long(name);
        if known.contains_key(canonical) {
            return Ok(canonical.to_string());
        }
        if name.ends_with('s') {
            let mut candidates = vec![name[..name.len() - 1].to_string()];
            if name.len() > 2 && name.ends_with("es") {
                candidates.push(name[..name.len() - 2].to_string());
            }
            if name.len() > 3 && name.ends_with("ies") {
                candidates.push(format!("{}y", &name[..name.len() - 3]));
            }
            for candidate in candidates {
                let canonical = schema::short_to_long(&candidate);
                if known.contains_key(canonical) {
                    return Ok(canonical.to_string());
                }
            }
        }
        Err(LayoutError::UnknownEntity(name.to_string()))
    }

    /// Best-effort per-entity match pattern. Experimental; see
    /// [`schema::entity_pattern`].
    pub fn entity_pattern(&self, name: &str) -> Option<String> {
        schema::entity_pattern(schema::short_to_long(name))
    }

    // -----------------------------------------------------------------------
    // Reserved entry points
    // -----------------------------------------------------------------------

    pub fn get_nearest(&self, _path: &Path) -> Result<Vec<BidsPath>> {
        Err(LayoutError::Compatibility("get_nearest()".to_string()))
    }

    pub fn get_bvec(&self, _path: &Path) -> Result<BidsPath> {
        Err(LayoutError::Compatibility("get_bvec()".to_string()))
    }

    pub fn get_bval(&self, _path: &Path) -> Result<BidsPath> {
        Err(LayoutError::Compatibility("get_bval()".to_string()))
    }

    pub fn get_fieldmap(&self, _path: &Path) -> Result<Vec<BidsPath>> {
        Err(LayoutError::Compatibility("get_fieldmap()".to_string()))
    }

    pub fn get_tr(&self, _filters: &[(String, LegacyFilter)]) -> Result<f64> {
        Err(LayoutError::Compatibility("get_tr()".to_string()))
    }

    pub fn build_path(&self, _entities: &crate::entities::Entities) -> Result<BidsPath> {
        Err(LayoutError::Compatibility("build_path()".to_string()))
    }

    pub fn copy_files(&self, _filters: &[(String, LegacyFilter)]) -> Result<()> {
        Err(LayoutError::Compatibility("copy_files()".to_string()))
    }

    pub fn write_to_file(&self, _entities: &crate::entities::Entities) -> Result<()> {
        Err(LayoutError::Compatibility("write_to_file()".to_string()))
    }

    pub fn to_df(&self) -> Result<()> {
        Err(LayoutError::Compatibility("to_df()".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_translation() {
        assert_eq!(LegacyFilter::from("rest").to_filter_value(), FilterValue::Equal("rest".into()));
        assert_eq!(LegacyFilter::from(2).to_filter_value(), FilterValue::Equal("2".into()));
        assert_eq!(LegacyFilter::from(true).to_filter_value(), FilterValue::Present);
        assert_eq!(LegacyFilter::from(false).to_filter_value(), FilterValue::Absent);
        assert_eq!(LegacyFilter::from(Query::Any).to_filter_value(), FilterValue::Present);
        assert_eq!(LegacyFilter::from(Query::Required).to_filter_value(), FilterValue::Present);
        assert_eq!(LegacyFilter::from(Query::None).to_filter_value(), FilterValue::Absent);
        assert_eq!(
            LegacyFilter::from(Query::Optional).to_filter_value(),
            FilterValue::Unconstrained
        );
    }

    #[test]
    fn test_list_translation_keeps_scalars() {
        let many = LegacyFilter::Many(vec![
            LegacyFilter::from("01"),
            LegacyFilter::from(2),
            LegacyFilter::from(Query::Any),
        ]);
        assert_eq!(
            many.to_filter_value(),
            FilterValue::OneOf(vec!["01".to_string(), "2".to_string()])
        );
    }
}
