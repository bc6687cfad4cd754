//! `BidsPath` — a plain path value carrying its parsed entities and dataset
//! root, with transformations that preserve both.
//!
//! Paths surfaced by a layout keep a shared handle to it so metadata resolves
//! against the materialized store; a transformed or standalone path falls back
//! to walking sidecar files on disk.

use crate::entities::Entities;
use crate::error::{LayoutError, Result};
use crate::layout::LayoutInner;
use crate::metadata;
use crate::parse;
use crate::types::{FileId, JsonMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A file path annotated with its entities and owning dataset root.
#[derive(Clone)]
pub struct BidsPath {
    path: PathBuf,
    entities: Entities,
    dataset_root: PathBuf,
    /// Set when this path was surfaced from a layout; lost on transformation.
    origin: Option<(Arc<LayoutInner>, usize, FileId)>,
}

impl BidsPath {
    /// Parse a standalone path with no layout context.
    ///
    /// The dataset root is probed from disk (nearest ancestor carrying a
    /// dataset_description.json) and falls back to the structural guess.
    pub fn parse(path: impl AsRef<Path>) -> BidsPath {
        let path = path.as_ref().to_path_buf();
        let parsed = parse::parse_path(&path);
        let dataset_root = parse::guess_dataset_root(&path).unwrap_or_default();
        BidsPath { path, entities: parsed.entities, dataset_root, origin: None }
    }

    /// Assemble a path from explicit parts.
    ///
    /// Empty entity names or values are rejected: the parser never produces
    /// them, and downstream inheritance rules assume non-empty pairs.
    pub fn from_parts(
        path: impl Into<PathBuf>,
        entities: Entities,
        dataset_root: impl Into<PathBuf>,
    ) -> Result<BidsPath> {
        for (name, value) in entities.iter() {
            if name.is_empty() || value.is_empty() {
                return Err(LayoutError::InvalidEntityValue(name.to_string()));
            }
        }
        Ok(BidsPath {
            path: path.into(),
            entities,
            dataset_root: dataset_root.into(),
            origin: None,
        })
    }

    pub(crate) fn from_layout(inner: Arc<LayoutInner>, dataset: usize, id: FileId) -> BidsPath {
        let file = &inner.datasets[dataset].files[id as usize];
        BidsPath {
            path: file.path.clone(),
            entities: file.entities.clone(),
            dataset_root: inner.datasets[dataset].root.clone(),
            origin: Some((inner.clone(), dataset, id)),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.path.clone()
    }

    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    pub fn dataset_root(&self) -> &Path {
        &self.dataset_root
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Resolve this file's metadata through sidecar inheritance.
    ///
    /// Uses the layout's materialized store when available; otherwise walks
    /// directory listings at call time.
    pub fn metadata(&self) -> JsonMap {
        if let Some((inner, dataset, id)) = &self.origin {
            if let Some(meta) = &inner.metadata {
                let dataset = &inner.datasets[*dataset];
                let file = &dataset.files[*id as usize];
                return metadata::resolve_indexed(dataset, file, &meta.bodies);
            }
        }
        metadata::resolve_on_disk(&self.path, &self.entities, &self.dataset_root)
    }

    /// Read and parse this file as JSON.
    pub fn read_json(&self) -> Result<serde_json::Value> {
        let content = fs::read_to_string(&self.path)
            .map_err(|source| LayoutError::Io { path: self.path.clone(), source })?;
        serde_json::from_str(&content).map_err(|err| LayoutError::InvalidJson {
            path: self.path.clone(),
            reason: err.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Transformations (entities and dataset root carry over)
    // -----------------------------------------------------------------------

    fn with_path(&self, path: PathBuf) -> BidsPath {
        BidsPath {
            path,
            entities: self.entities.clone(),
            dataset_root: self.dataset_root.clone(),
            origin: None,
        }
    }

    pub fn join(&self, segment: impl AsRef<Path>) -> BidsPath {
        self.with_path(self.path.join(segment))
    }

    pub fn parent(&self) -> Option<BidsPath> {
        self.path.parent().map(|p| self.with_path(p.to_path_buf()))
    }

    /// Every ancestor directory, nearest first.
    pub fn parents(&self) -> Vec<BidsPath> {
        self.path.ancestors().skip(1).map(|p| self.with_path(p.to_path_buf())).collect()
    }

    pub fn with_file_name(&self, name: impl AsRef<Path>) -> BidsPath {
        self.with_path(self.path.with_file_name(name.as_ref()))
    }

    pub fn with_extension(&self, extension: &str) -> BidsPath {
        self.with_path(self.path.with_extension(extension))
    }

    pub fn relative_to(&self, base: impl AsRef<Path>) -> Option<BidsPath> {
        self.path.strip_prefix(base.as_ref()).ok().map(|p| self.with_path(p.to_path_buf()))
    }

    /// Absolute form of this path (joined onto the current directory when
    /// relative; no symlink resolution).
    pub fn absolute(&self) -> Result<BidsPath> {
        if self.path.is_absolute() {
            return Ok(self.clone());
        }
        let cwd = std::env::current_dir()
            .map_err(|source| LayoutError::Io { path: self.path.clone(), source })?;
        Ok(self.with_path(cwd.join(&self.path)))
    }

    /// Canonical form with symlinks resolved.
    pub fn resolve(&self) -> Result<BidsPath> {
        let canonical = fs::canonicalize(&self.path)
            .map_err(|source| LayoutError::Io { path: self.path.clone(), source })?;
        Ok(self.with_path(canonical))
    }

    /// List a directory's entries as annotated paths.
    pub fn iterdir(&self) -> Result<Vec<BidsPath>> {
        let entries = fs::read_dir(&self.path)
            .map_err(|source| LayoutError::Io { path: self.path.clone(), source })?;
        let mut out: Vec<BidsPath> =
            entries.filter_map(|e| e.ok()).map(|e| self.with_path(e.path())).collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }
}

impl fmt::Display for BidsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl fmt::Debug for BidsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BidsPath")
            .field("path", &self.path)
            .field("entities", &self.entities)
            .field("dataset_root", &self.dataset_root)
            .finish()
    }
}

impl PartialEq for BidsPath {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.entities == other.entities
            && self.dataset_root == other.dataset_root
    }
}

impl Eq for BidsPath {}

impl AsRef<Path> for BidsPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}
