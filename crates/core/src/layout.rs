//! The layout aggregate: one indexed primary dataset plus zero or more
//! derivative datasets, with entity, metadata, and description queries.
//!
//! A layout is immutable after construction. Filtering clones a cheap view
//! (per-dataset id sets) over shared datasets; `add_derivatives` and
//! `index_metadata` return new layouts rather than mutating.

use crate::bidspath::BidsPath;
use crate::cache;
use crate::error::{LayoutError, Result};
use crate::filter::{self, FilterSpec, FilterValue, Scope};
use crate::index;
use crate::schema;
use crate::types::{CancelToken, Dataset, Derivatives, FileId, IndexConfig, JsonMap, MetadataIndex};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Shared immutable state
// ---------------------------------------------------------------------------

/// The frozen state shared by every view derived from one construction.
#[derive(Debug)]
pub struct LayoutInner {
    pub(crate) datasets: Vec<Dataset>,
    /// Index of the primary dataset; None for derivative-only layouts.
    pub(crate) primary: Option<usize>,
    /// Derivative dataset indices in tracking order.
    pub(crate) derivative_order: Vec<usize>,
    /// Ordered roots used at construction.
    pub(crate) roots: Vec<PathBuf>,
    /// Materialized metadata, when indexed.
    pub(crate) metadata: Option<MetadataIndex>,
    pub(crate) config: IndexConfig,
}

impl LayoutInner {
    /// Long names of every entity indexed from a filename anywhere.
    pub(crate) fn filename_entity_names(&self) -> BTreeSet<&str> {
        self.datasets.iter().flat_map(|d| d.by_entity.keys().map(|k| k.as_str())).collect()
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// A queryable view over one or more indexed datasets.
#[derive(Debug, Clone)]
pub struct Layout {
    inner: Arc<LayoutInner>,
    /// Visible ids per dataset (parallel to `inner.datasets`).
    view: Vec<BTreeSet<FileId>>,
    /// Entity names referenced by filters but found nowhere in scope.
    unknown: Vec<String>,
}

impl Layout {
    pub fn builder() -> LayoutBuilder {
        LayoutBuilder::default()
    }

    /// Index a dataset root with default options.
    pub fn new(root: impl Into<PathBuf>) -> Result<Layout> {
        Layout::builder().root(root).build()
    }

    /// Load a previously saved layout from a cache directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<Layout> {
        cache::load(dir.as_ref())
    }

    /// Save this layout to a cache directory.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        cache::save(self, dir.as_ref())
    }

    pub(crate) fn from_inner(inner: Arc<LayoutInner>) -> Layout {
        let view = inner
            .datasets
            .iter()
            .map(|d| if inner.config.validate { d.valid.clone() } else { d.all_ids() })
            .collect();
        Layout { inner, view, unknown: Vec::new() }
    }

    pub(crate) fn inner(&self) -> &Arc<LayoutInner> {
        &self.inner
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// The ordered dataset roots this layout was constructed from.
    pub fn roots(&self) -> Vec<&Path> {
        self.inner.roots.iter().map(|p| p.as_path()).collect()
    }

    /// The primary dataset root, if this layout has one.
    pub fn root(&self) -> Option<&Path> {
        self.inner.primary.map(|i| self.inner.datasets[i].root.as_path())
    }

    /// The primary dataset's parsed description, or the empty map.
    pub fn description(&self) -> JsonMap {
        self.inner
            .primary
            .and_then(|i| self.inner.datasets[i].description.clone())
            .unwrap_or_default()
    }

    /// Pipeline names of the tracked derivative datasets, in order.
    pub fn pipeline_names(&self) -> Vec<&str> {
        self.inner
            .derivative_order
            .iter()
            .filter_map(|&i| self.inner.datasets[i].pipeline.as_deref())
            .collect()
    }

    /// Recoverable problems collected per dataset during indexing.
    pub fn diagnostics(&self) -> Vec<&str> {
        self.inner
            .datasets
            .iter()
            .flat_map(|d| d.diagnostics.iter().map(|s| s.as_str()))
            .collect()
    }

    /// Entity names referenced by this view's filters but found nowhere.
    pub fn unknown_entities(&self) -> &[String] {
        &self.unknown
    }

    /// Number of files visible under the current view.
    pub fn file_count(&self) -> usize {
        self.view.iter().map(|set| set.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.file_count() == 0
    }

    /// True if metadata has been materialized for this layout.
    pub fn has_metadata(&self) -> bool {
        self.inner.metadata.is_some()
    }

    // -----------------------------------------------------------------------
    // Entity and metadata listings
    // -----------------------------------------------------------------------

    /// Filename entities visible under the current view, with sorted unique
    /// value lists.
    pub fn entities(&self) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (i, dataset) in self.inner.datasets.iter().enumerate() {
            for (name, by_value) in &dataset.by_entity {
                for (value, ids) in by_value {
                    if !ids.is_disjoint(&self.view[i]) {
                        out.entry(name.clone()).or_default().insert(value.clone());
                    }
                }
            }
        }
        out.into_iter().map(|(k, v)| (k, v.into_iter().collect())).collect()
    }

    /// Metadata-only keys (present in sidecars but never in a filename)
    /// visible under the current view, with sorted unique scalar values.
    pub fn metadata(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let Some(meta) = &self.inner.metadata else {
            return Err(LayoutError::MetadataNotIndexed("metadata".to_string()));
        };
        let filename_names = self.inner.filename_entity_names();
        let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (i, index) in meta.by_key.iter().enumerate() {
            for (key, by_value) in index {
                if filename_names.contains(key.as_str()) {
                    continue;
                }
                for (value, ids) in by_value {
                    if !ids.is_disjoint(&self.view[i]) {
                        out.entry(key.clone()).or_default().insert(value.clone());
                    }
                }
            }
        }
        Ok(out.into_iter().map(|(k, v)| (k, v.into_iter().collect())).collect())
    }

    /// Entity listing with optional metadata keys merged in.
    ///
    /// `Some(false)` returns filename entities only, `Some(true)` returns
    /// metadata-only keys, `None` returns the union. When metadata was never
    /// indexed, `None` silently skips the metadata half.
    pub fn get_entities(
        &self,
        scope: Option<Scope>,
        metadata: Option<bool>,
    ) -> Result<BTreeMap<String, Vec<String>>> {
        let scoped = match scope {
            Some(scope) => self.filter(&FilterSpec::new().scope(scope))?,
            None => self.clone(),
        };
        match metadata {
            Some(false) => Ok(scoped.entities()),
            Some(true) => scoped.metadata(),
            None => {
                let mut out = scoped.entities();
                if scoped.inner.metadata.is_some() {
                    out.extend(scoped.metadata()?);
                }
                Ok(out)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    /// Every visible file, in lexicographic path order.
    pub fn files(&self) -> Vec<BidsPath> {
        let mut files: Vec<BidsPath> = self
            .view
            .iter()
            .enumerate()
            .flat_map(|(i, ids)| {
                ids.iter().map(move |&id| BidsPath::from_layout(self.inner.clone(), i, id))
            })
            .collect();
        files.sort_by(|a, b| a.as_path().cmp(b.as_path()));
        files
    }

    /// Iterate the visible files in path order.
    pub fn iter(&self) -> impl Iterator<Item = BidsPath> {
        self.files().into_iter()
    }

    /// Look up one visible file by absolute or root-relative path.
    pub fn get_file(&self, path: &Path) -> Option<BidsPath> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root().map(|r| r.join(path))?
        };
        for (i, ids) in self.view.iter().enumerate() {
            let dataset = &self.inner.datasets[i];
            if let Ok(pos) = dataset.files.binary_search_by(|f| f.path.cmp(&absolute)) {
                let id = dataset.files[pos].id;
                if ids.contains(&id) {
                    return Some(BidsPath::from_layout(self.inner.clone(), i, id));
                }
            }
        }
        None
    }

    // -----------------------------------------------------------------------
    // Filtering
    // -----------------------------------------------------------------------

    /// Datasets selected by a scope, as indices into `inner.datasets`.
    pub(crate) fn resolve_scope(&self, scope: &Scope) -> Result<BTreeSet<usize>> {
        let inner = &self.inner;
        Ok(match scope {
            Scope::All => (0..inner.datasets.len()).collect(),
            Scope::Raw => inner.primary.into_iter().collect(),
            Scope::This => match inner.primary {
                Some(primary) => BTreeSet::from([primary]),
                None => inner.derivative_order.iter().copied().collect(),
            },
            Scope::Derivatives => inner.derivative_order.iter().copied().collect(),
            Scope::Pipeline(name) => {
                let found = inner
                    .derivative_order
                    .iter()
                    .copied()
                    .find(|&i| inner.datasets[i].pipeline.as_deref() == Some(name.as_str()));
                match found {
                    Some(i) => BTreeSet::from([i]),
                    None => return Err(LayoutError::UnknownScope(name.clone())),
                }
            }
            Scope::Union(scopes) => {
                let mut out = BTreeSet::new();
                for scope in scopes {
                    out.extend(self.resolve_scope(scope)?);
                }
                out
            }
        })
    }

    /// Apply a filter, producing a narrowed view over the same datasets.
    ///
    /// An entity found nowhere in scope empties the view and records a
    /// diagnostic rather than failing; [`Layout::get`] turns the diagnostic
    /// into an error.
    pub fn filter(&self, spec: &FilterSpec) -> Result<Layout> {
        let inner = &self.inner;
        let mut view = self.view.clone();
        let mut unknown = self.unknown.clone();

        if let Some(scope) = &spec.scope {
            let allowed = self.resolve_scope(scope)?;
            for (i, set) in view.iter_mut().enumerate() {
                if !allowed.contains(&i) {
                    set.clear();
                }
            }
        }

        for (name, value) in &spec.entities {
            if matches!(value, FilterValue::Unconstrained) {
                continue;
            }
            let in_filenames = filter::is_filename_entity(&inner.datasets, name);
            if in_filenames || schema::is_known(name) {
                for (i, set) in view.iter_mut().enumerate() {
                    *set =
                        filter::matching_ids(Some(&inner.datasets[i].by_entity), name, value, set);
                }
                continue;
            }

            match &inner.metadata {
                None => return Err(LayoutError::MetadataNotIndexed(name.clone())),
                Some(meta) if meta.keys().contains(name.as_str()) => {
                    for (i, set) in view.iter_mut().enumerate() {
                        *set = filter::matching_ids(Some(&meta.by_key[i]), name, value, set);
                    }
                }
                Some(_) => {
                    unknown.push(name.clone());
                    for set in view.iter_mut() {
                        set.clear();
                    }
                }
            }
        }

        Ok(Layout { inner: self.inner.clone(), view, unknown })
    }

    /// Filter and materialize in one step.
    ///
    /// Unlike [`Layout::filter`], a filter naming an unknown entity is an
    /// error here.
    pub fn get(&self, spec: &FilterSpec) -> Result<Vec<BidsPath>> {
        self.filter(spec)?.materialize()
    }

    /// The visible file set, failing if any chained filter referenced an
    /// unknown entity.
    pub fn materialize(&self) -> Result<Vec<BidsPath>> {
        if let Some(name) = self.unknown.first() {
            return Err(LayoutError::UnknownEntity(name.clone()));
        }
        Ok(self.files())
    }

    // -----------------------------------------------------------------------
    // Derived layouts
    // -----------------------------------------------------------------------

    /// Materialize metadata if construction deferred it, returning a layout
    /// that shares this one's view.
    pub fn index_metadata(&self) -> Result<Layout> {
        if self.inner.metadata.is_some() {
            return Ok(self.clone());
        }
        let mut datasets = self.inner.datasets.clone();
        let metadata = index::build_metadata(&mut datasets, None)?;
        let inner = LayoutInner {
            datasets,
            primary: self.inner.primary,
            derivative_order: self.inner.derivative_order.clone(),
            roots: self.inner.roots.clone(),
            metadata: Some(metadata),
            config: IndexConfig { index_metadata: true, ..self.inner.config.clone() },
        };
        Ok(Layout { inner: Arc::new(inner), view: self.view.clone(), unknown: self.unknown.clone() })
    }

    /// Track additional derivative datasets, returning an extended layout.
    /// The source layout is unchanged.
    pub fn add_derivatives<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Layout> {
        let config = &self.inner.config;
        let mut datasets = self.inner.datasets.clone();
        let mut derivative_order = self.inner.derivative_order.clone();
        let mut view = self.view.clone();

        for path in paths {
            for root in index::expand_derivative_path(path.as_ref()) {
                let dataset = index::index_dataset(&root, None, true, config.validate, None)?;
                if let Some(name) = &dataset.pipeline {
                    if datasets.iter().any(|d| d.pipeline.as_deref() == Some(name.as_str())) {
                        return Err(LayoutError::DuplicatePipeline(name.clone()));
                    }
                }
                view.push(if config.validate { dataset.valid.clone() } else { dataset.all_ids() });
                derivative_order.push(datasets.len());
                datasets.push(dataset);
            }
        }

        let metadata = if self.inner.metadata.is_some() {
            Some(index::build_metadata(&mut datasets, None)?)
        } else {
            None
        };
        let roots = datasets.iter().map(|d| d.root.clone()).collect();
        let inner = LayoutInner {
            datasets,
            primary: self.inner.primary,
            derivative_order,
            roots,
            metadata,
            config: config.clone(),
        };
        Ok(Layout { inner: Arc::new(inner), view, unknown: self.unknown.clone() })
    }
}

impl<'a> IntoIterator for &'a Layout {
    type Item = BidsPath;
    type IntoIter = std::vec::IntoIter<BidsPath>;

    fn into_iter(self) -> Self::IntoIter {
        self.files().into_iter()
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let root = self
            .root()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(derivatives only)".to_string());
        write!(f, "Layout: {root} | files: {}", self.file_count())?;
        for (name, values) in self.entities() {
            write!(f, " | {name}: {}", values.len())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures and constructs a [`Layout`].
#[derive(Debug, Clone, Default)]
pub struct LayoutBuilder {
    root: Option<PathBuf>,
    derivatives: Derivatives,
    validate: bool,
    no_metadata: bool,
    cache: Option<PathBuf>,
    reset_cache: bool,
    cancel: Option<CancelToken>,
}

impl LayoutBuilder {
    /// The primary dataset root.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Derivative datasets to track alongside the primary dataset.
    pub fn derivatives(mut self, derivatives: Derivatives) -> Self {
        self.derivatives = derivatives;
        self
    }

    /// Restrict the composed view to files conforming to the layout rules.
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Defer sidecar materialization; metadata queries will fail until
    /// [`Layout::index_metadata`] is called.
    pub fn skip_metadata(mut self) -> Self {
        self.no_metadata = true;
        self
    }

    /// Persist to (or load from) this cache directory.
    pub fn cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache = Some(dir.into());
        self
    }

    /// Delete an existing cache directory before indexing.
    pub fn reset_cache(mut self, reset: bool) -> Self {
        self.reset_cache = reset;
        self
    }

    /// Cooperative cancellation token checked during indexing.
    pub fn cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> Result<Layout> {
        if let Some(dir) = self.cache.clone() {
            if self.reset_cache && dir.exists() {
                fs::remove_dir_all(&dir)
                    .map_err(|source| LayoutError::Io { path: dir.clone(), source })?;
            }
            if dir.join(cache::MANIFEST_NAME).is_file() {
                return cache::load(&dir);
            }
            let layout = self.index()?;
            cache::save(&layout, &dir)?;
            return Ok(layout);
        }
        self.index()
    }

    fn index(&self) -> Result<Layout> {
        let cancel = self.cancel.as_ref();
        let mut datasets: Vec<Dataset> = Vec::new();
        let mut primary = None;

        if let Some(root) = &self.root {
            let dataset = index::index_dataset(root, None, false, self.validate, cancel)?;
            primary = Some(0);
            datasets.push(dataset);
        }

        // (fixed name, root) pairs for every derivative dataset to index.
        let mut derivative_roots: Vec<(Option<String>, PathBuf)> = Vec::new();
        match &self.derivatives {
            Derivatives::None => {}
            Derivatives::Discover => {
                if let Some(i) = primary {
                    for root in index::discover_derivatives(&datasets[i].root) {
                        derivative_roots.push((None, root));
                    }
                }
            }
            Derivatives::Paths(paths) => {
                for path in paths {
                    for root in index::expand_derivative_path(path) {
                        derivative_roots.push((None, root));
                    }
                }
            }
            Derivatives::Named(named) => {
                for (name, roots) in named {
                    for root in roots {
                        derivative_roots.push((Some(name.clone()), root.clone()));
                    }
                }
            }
        }

        let mut derivative_order = Vec::new();
        for (name, root) in derivative_roots {
            let dataset = index::index_dataset(&root, name, true, self.validate, cancel)?;
            if let Some(pipeline) = &dataset.pipeline {
                if datasets.iter().any(|d| d.pipeline.as_deref() == Some(pipeline.as_str())) {
                    return Err(LayoutError::DuplicatePipeline(pipeline.clone()));
                }
            }
            derivative_order.push(datasets.len());
            datasets.push(dataset);
        }

        let metadata = if self.no_metadata {
            None
        } else {
            Some(index::build_metadata(&mut datasets, cancel)?)
        };

        let roots = datasets.iter().map(|d| d.root.clone()).collect();
        let inner = LayoutInner {
            datasets,
            primary,
            derivative_order,
            roots,
            metadata,
            config: IndexConfig { validate: self.validate, index_metadata: !self.no_metadata },
        };
        Ok(Layout::from_inner(Arc::new(inner)))
    }
}
