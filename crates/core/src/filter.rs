//! Filter and scope algebra for composing scoped views over a layout.
//!
//! Filters narrow a layout's composed view without touching the underlying
//! datasets; chained filters intersect, so application order never matters.

use crate::schema;
use crate::types::{Dataset, EntityIndex, FileId};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Filter values
// ---------------------------------------------------------------------------

/// Constraint on a single entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// The entity must equal this value.
    Equal(String),
    /// The entity must equal one of these values.
    OneOf(Vec<String>),
    /// The entity must be present, any value.
    Present,
    /// The entity must not be present.
    Absent,
    /// No constraint.
    Unconstrained,
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Equal(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Equal(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        if value {
            FilterValue::Present
        } else {
            FilterValue::Absent
        }
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(values: Vec<String>) -> Self {
        FilterValue::OneOf(values)
    }
}

impl From<&[&str]> for FilterValue {
    fn from(values: &[&str]) -> Self {
        FilterValue::OneOf(values.iter().map(|v| v.to_string()).collect())
    }
}

// ---------------------------------------------------------------------------
// Scopes
// ---------------------------------------------------------------------------

/// Named subset of datasets a query runs over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every dataset.
    All,
    /// The primary dataset only.
    Raw,
    /// The primary dataset on a primary layout; the tracked pipelines on a
    /// derivative-only layout.
    This,
    /// The union of derivative datasets.
    Derivatives,
    /// One derivative pipeline by name.
    Pipeline(String),
    /// Union of several scopes.
    Union(Vec<Scope>),
}

impl Scope {
    /// Parse the string form used by queries: `all`, `raw`, `self`,
    /// `derivatives`, or a pipeline name.
    pub fn parse(s: &str) -> Scope {
        match s {
            "all" => Scope::All,
            "raw" => Scope::Raw,
            "self" => Scope::This,
            "derivatives" => Scope::Derivatives,
            name => Scope::Pipeline(name.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Filter specification
// ---------------------------------------------------------------------------

/// A composed set of entity constraints plus an optional scope.
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    pub scope: Option<Scope>,
    pub entities: Vec<(String, FilterValue)>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Add a constraint on an entity. Short tags are accepted and
    /// canonicalized to long names.
    pub fn entity(mut self, name: &str, value: impl Into<FilterValue>) -> Self {
        self.entities.push((schema::short_to_long(name).to_string(), value.into()));
        self
    }

    /// Shorthand for an equality constraint.
    pub fn eq(self, name: &str, value: &str) -> Self {
        self.entity(name, FilterValue::Equal(value.to_string()))
    }

    /// Shorthand for set membership.
    pub fn one_of(self, name: &str, values: &[&str]) -> Self {
        self.entity(name, FilterValue::OneOf(values.iter().map(|v| v.to_string()).collect()))
    }

    /// Shorthand for presence (ANY).
    pub fn present(self, name: &str) -> Self {
        self.entity(name, FilterValue::Present)
    }

    /// Shorthand for absence (NONE).
    pub fn absent(self, name: &str) -> Self {
        self.entity(name, FilterValue::Absent)
    }

    pub fn is_empty(&self) -> bool {
        self.scope.is_none() && self.entities.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Evaluation helpers
// ---------------------------------------------------------------------------

/// Ids matching `value` under one entity's inverted-index map.
///
/// `Absent` is evaluated against `visible`, the running view of the dataset.
pub fn matching_ids(
    index: Option<&EntityIndex>,
    name: &str,
    value: &FilterValue,
    visible: &BTreeSet<FileId>,
) -> BTreeSet<FileId> {
    let values = index.and_then(|idx| idx.get(name));
    let present: BTreeSet<FileId> = values
        .map(|by_value| by_value.values().flatten().copied().collect())
        .unwrap_or_default();

    match value {
        FilterValue::Unconstrained => visible.clone(),
        FilterValue::Present => &present & visible,
        FilterValue::Absent => visible - &present,
        FilterValue::Equal(v) => values
            .and_then(|by_value| by_value.get(v))
            .map(|ids| ids & visible)
            .unwrap_or_default(),
        FilterValue::OneOf(vs) => {
            let mut out = BTreeSet::new();
            if let Some(by_value) = values {
                for v in vs {
                    if let Some(ids) = by_value.get(v) {
                        out.extend(ids.iter().copied());
                    }
                }
            }
            &out & visible
        }
    }
}

/// True if `name` is indexed as a filename entity in any of the datasets.
pub fn is_filename_entity(datasets: &[Dataset], name: &str) -> bool {
    datasets.iter().any(|d| d.by_entity.contains_key(name))
}
