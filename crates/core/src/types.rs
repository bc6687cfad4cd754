//! Core data model: indexed files, datasets, index configuration, and the
//! frozen metadata store.

use crate::entities::Entities;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Free-form JSON document body (dataset descriptions, sidecar contents).
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Stable primary key of a file within its dataset. Ids are assigned in
/// lexicographic path order, so ascending id order is path order.
pub type FileId = u32;

/// Per-entity inverted index: entity name -> value -> set of file ids.
pub type EntityIndex = BTreeMap<String, BTreeMap<String, BTreeSet<FileId>>>;

// ---------------------------------------------------------------------------
// Indexed files
// ---------------------------------------------------------------------------

/// Classification assigned to every indexed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileClass {
    /// A recognized data file.
    Data,
    /// A recognized `.json` sidecar contributing metadata.
    SidecarJson,
    /// The dataset_description.json at a dataset root.
    DatasetDescription,
    /// Anything the parser did not recognize.
    Other,
}

/// One record per physical path in a dataset.
#[derive(Debug, Clone)]
pub struct IndexedFile {
    /// Absolute path.
    pub path: PathBuf,
    /// Parsed entities; empty when the filename is unrecognized.
    pub entities: Entities,
    pub class: FileClass,
    pub id: FileId,
}

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

/// One indexed tree: a raw dataset or a single derivative pipeline.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub root: PathBuf,
    /// Parsed dataset_description.json contents, when present.
    pub description: Option<JsonMap>,
    /// Pipeline name for derivative datasets.
    pub pipeline: Option<String>,
    pub is_derivative: bool,
    /// Files sorted by path; `files[id as usize].id == id`.
    pub files: Vec<IndexedFile>,
    pub by_entity: EntityIndex,
    /// Ids that passed validation at index time; empty when validate=false.
    pub valid: BTreeSet<FileId>,
    /// Recoverable per-file problems encountered during the walk.
    pub diagnostics: Vec<String>,
}

impl Dataset {
    /// Assemble a dataset from classified files, assigning ids in path order
    /// and building the inverted index.
    pub fn assemble(
        root: PathBuf,
        description: Option<JsonMap>,
        pipeline: Option<String>,
        is_derivative: bool,
        mut classified: Vec<(PathBuf, Entities, FileClass)>,
        diagnostics: Vec<String>,
    ) -> Self {
        classified.sort_by(|a, b| a.0.cmp(&b.0));

        let mut files = Vec::with_capacity(classified.len());
        let mut by_entity: EntityIndex = BTreeMap::new();
        for (i, (path, entities, class)) in classified.into_iter().enumerate() {
            let id = i as FileId;
            for (name, value) in entities.iter() {
                by_entity
                    .entry(name.to_string())
                    .or_default()
                    .entry(value.to_string())
                    .or_default()
                    .insert(id);
            }
            files.push(IndexedFile { path, entities, class, id });
        }

        Dataset {
            root,
            description,
            pipeline,
            is_derivative,
            files,
            by_entity,
            valid: BTreeSet::new(),
            diagnostics,
        }
    }

    /// The full id set of this dataset.
    pub fn all_ids(&self) -> BTreeSet<FileId> {
        (0..self.files.len() as FileId).collect()
    }

    /// Ids of every file whose entity map contains `name`, any value.
    pub fn ids_with_entity(&self, name: &str) -> BTreeSet<FileId> {
        self.by_entity
            .get(name)
            .map(|values| values.values().flatten().copied().collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Index configuration
// ---------------------------------------------------------------------------

/// Which derivative datasets to index alongside the primary one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Derivatives {
    /// Skip the derivatives/ subtree entirely.
    #[default]
    None,
    /// Auto-discover every subdirectory of derivatives/ that carries a
    /// dataset_description.json.
    Discover,
    /// Index exactly these roots as derivative datasets.
    Paths(Vec<PathBuf>),
    /// Index these roots with fixed pipeline names.
    Named(Vec<(String, Vec<PathBuf>)>),
}

/// Indexer behavior knobs, kept by the layout for add_derivatives.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub validate: bool,
    pub index_metadata: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { validate: false, index_metadata: true }
    }
}

/// Cooperative cancellation handle checked during long-running indexing.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Metadata store
// ---------------------------------------------------------------------------

/// Frozen metadata store built by the indexer's metadata pass.
///
/// `bodies` holds every sidecar's parsed contents; `by_key` is a per-dataset
/// inverted index over each data file's *resolved* (inheritance-merged)
/// metadata, with scalar values rendered as strings.
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    pub bodies: HashMap<PathBuf, JsonMap>,
    pub by_key: Vec<EntityIndex>,
}

impl MetadataIndex {
    /// All metadata keys observed across every dataset.
    pub fn keys(&self) -> BTreeSet<&str> {
        self.by_key.iter().flat_map(|idx| idx.keys().map(|k| k.as_str())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn entities(pairs: &[(&str, &str)]) -> Entities {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_assemble_sorts_and_assigns_ids() {
        let ds = Dataset::assemble(
            PathBuf::from("/data"),
            None,
            None,
            false,
            vec![
                (PathBuf::from("/data/b.nii"), entities(&[("suffix", "bold")]), FileClass::Data),
                (PathBuf::from("/data/a.nii"), entities(&[("suffix", "T1w")]), FileClass::Data),
            ],
            vec![],
        );
        assert_eq!(ds.files[0].path, Path::new("/data/a.nii"));
        assert_eq!(ds.files[0].id, 0);
        assert_eq!(ds.files[1].path, Path::new("/data/b.nii"));
        assert_eq!(ds.files[1].id, 1);
    }

    #[test]
    fn test_inverted_index_soundness() {
        let ds = Dataset::assemble(
            PathBuf::from("/data"),
            None,
            None,
            false,
            vec![
                (
                    PathBuf::from("/data/sub-01_T1w.nii"),
                    entities(&[("subject", "01"), ("suffix", "T1w")]),
                    FileClass::Data,
                ),
                (
                    PathBuf::from("/data/sub-02_T1w.nii"),
                    entities(&[("subject", "02"), ("suffix", "T1w")]),
                    FileClass::Data,
                ),
            ],
            vec![],
        );
        // Every (name, value) of every file appears in the index.
        for f in &ds.files {
            for (name, value) in f.entities.iter() {
                assert!(ds.by_entity[name][value].contains(&f.id));
            }
        }
        assert_eq!(ds.ids_with_entity("subject").len(), 2);
        assert!(ds.ids_with_entity("session").is_empty());
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
