//! Indexer — walks dataset roots, parses and classifies every file, and
//! builds the per-dataset inverted indexes and the metadata store.
//!
//! The walk across one dataset is parallel; the join point sorts by path so
//! file-id assignment is deterministic regardless of worker count.

use crate::entities::Entities;
use crate::error::{LayoutError, Result};
use crate::metadata;
use crate::parse::parse_path;
use crate::types::{
    CancelToken, Dataset, EntityIndex, FileClass, FileId, IndexedFile, JsonMap, MetadataIndex,
};
use dashmap::DashMap;
use ignore::{WalkBuilder, WalkState};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Dataset descriptions
// ---------------------------------------------------------------------------

/// Read and parse `dataset_description.json` at a dataset root.
///
/// A missing file yields None; an unparseable one yields None plus a
/// diagnostic (it never aborts indexing).
pub fn read_description(root: &Path) -> (Option<JsonMap>, Vec<String>) {
    let path = root.join("dataset_description.json");
    if !path.is_file() {
        return (None, Vec::new());
    }
    match metadata::read_json_map(&path) {
        Some(map) => (Some(map), Vec::new()),
        None => {
            (None, vec![format!("unparseable dataset description at {}", path.display())])
        }
    }
}

/// Pipeline name for a derivative dataset: `Name`, else the first
/// `GeneratedBy` entry's `Name`, else the root directory name.
pub fn pipeline_name(description: Option<&JsonMap>, root: &Path) -> String {
    if let Some(desc) = description {
        if let Some(name) = desc.get("Name").and_then(|v| v.as_str()) {
            return name.to_string();
        }
        let generated_by = desc
            .get("GeneratedBy")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .and_then(|g| g.get("Name"))
            .and_then(|v| v.as_str());
        if let Some(name) = generated_by {
            return name.to_string();
        }
    }
    root.file_name().and_then(|n| n.to_str()).unwrap_or("derivative").to_string()
}

// ---------------------------------------------------------------------------
// Derivative discovery
// ---------------------------------------------------------------------------

/// Immediate subdirectories of `<root>/derivatives` carrying a
/// dataset_description.json, in path order.
pub fn discover_derivatives(root: &Path) -> Vec<PathBuf> {
    let derivatives = root.join("derivatives");
    let Ok(entries) = fs::read_dir(&derivatives) else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.join("dataset_description.json").is_file())
        .collect();
    found.sort();
    found
}

/// Expand one user-supplied derivative path into pipeline roots.
///
/// A path that is itself a dataset (carries a description) is taken as-is;
/// otherwise its dataset-bearing subdirectories are used (a `derivatives/`
/// folder holding several pipelines).
pub fn expand_derivative_path(path: &Path) -> Vec<PathBuf> {
    if path.join("dataset_description.json").is_file() {
        return vec![path.to_path_buf()];
    }
    let Ok(entries) = fs::read_dir(path) else {
        return vec![path.to_path_buf()];
    };
    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.join("dataset_description.json").is_file())
        .collect();
    if found.is_empty() {
        return vec![path.to_path_buf()];
    }
    found.sort();
    found
}

// ---------------------------------------------------------------------------
// Walking
// ---------------------------------------------------------------------------

/// Enumerate files under a dataset root with a parallel walk.
///
/// Hidden entries at the root are skipped, as is the `derivatives/` subtree
/// when `skip_derivatives` is set (it is indexed as separate datasets).
/// Unreadable directories are collected as diagnostics, not errors.
fn walk_dataset(
    root: &Path,
    skip_derivatives: bool,
    cancel: Option<&CancelToken>,
) -> Result<(Vec<PathBuf>, Vec<String>)> {
    let files: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());
    let diagnostics: Mutex<Vec<String>> = Mutex::new(Vec::new());

    WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .threads(rayon::current_num_threads().min(12))
        .filter_entry(move |entry| {
            if entry.depth() == 1 {
                let name = entry.file_name().to_string_lossy();
                if name.starts_with('.') {
                    return false;
                }
                if skip_derivatives
                    && name == "derivatives"
                    && entry.file_type().is_some_and(|ft| ft.is_dir())
                {
                    return false;
                }
            }
            true
        })
        .build_parallel()
        .run(|| {
            Box::new(|entry| {
                if cancel.is_some_and(|c| c.is_cancelled()) {
                    return WalkState::Quit;
                }
                let entry = match entry {
                    Ok(e) => e,
                    Err(err) => {
                        warn!(error = %err, "Skipping unreadable entry");
                        diagnostics.lock().unwrap().push(err.to_string());
                        return WalkState::Continue;
                    }
                };
                if entry.file_type().is_some_and(|ft| ft.is_file()) {
                    files.lock().unwrap().push(entry.path().to_path_buf());
                }
                WalkState::Continue
            })
        });

    if cancel.is_some_and(|c| c.is_cancelled()) {
        return Err(LayoutError::Cancelled);
    }
    Ok((files.into_inner().unwrap(), diagnostics.into_inner().unwrap()))
}

// ---------------------------------------------------------------------------
// Classification and validation
// ---------------------------------------------------------------------------

fn classify(root: &Path, path: &Path, entities: &Entities) -> FileClass {
    if path == root.join("dataset_description.json") {
        return FileClass::DatasetDescription;
    }
    if entities.is_empty() {
        return FileClass::Other;
    }
    if entities.get("extension") == Some(".json") {
        return FileClass::SidecarJson;
    }
    FileClass::Data
}

/// Layout-conformance check applied when `validate=true`.
///
/// A valid file parses to a non-empty entity map with suffix and extension,
/// and its subject/session entities agree with the enclosing `sub-*`/`ses-*`
/// directories.
fn file_is_valid(file: &IndexedFile, root: &Path) -> bool {
    let e = &file.entities;
    if e.is_empty() || !e.contains_key("suffix") || !e.contains_key("extension") {
        return false;
    }

    let relative = file.path.strip_prefix(root).unwrap_or(&file.path);
    let dir_segments: Vec<String> = relative
        .parent()
        .map(|p| {
            p.components()
                .filter_map(|c| match c {
                    std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    for (entity, tag) in [("subject", "sub"), ("session", "ses")] {
        let dir_value = dir_segments.iter().rev().find_map(|s| {
            s.strip_prefix(&format!("{tag}-")).map(str::to_string)
        });
        match (e.get(entity), dir_value) {
            (Some(value), Some(dir_value)) if value != dir_value => return false,
            (None, Some(_)) => return false,
            _ => {}
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Dataset indexing
// ---------------------------------------------------------------------------

/// Walk and index a single dataset root.
pub fn index_dataset(
    root: &Path,
    pipeline: Option<String>,
    is_derivative: bool,
    validate: bool,
    cancel: Option<&CancelToken>,
) -> Result<Dataset> {
    if !root.is_dir() {
        return Err(LayoutError::NotADataset(root.to_path_buf()));
    }
    let root = fs::canonicalize(root)
        .map_err(|source| LayoutError::Io { path: root.to_path_buf(), source })?;

    let (description, mut diagnostics) = read_description(&root);
    if validate && is_derivative && description.is_none() {
        return Err(LayoutError::MissingDescription(root));
    }
    let pipeline = if is_derivative {
        Some(pipeline.unwrap_or_else(|| pipeline_name(description.as_ref(), &root)))
    } else {
        None
    };

    let (paths, walk_diags) = walk_dataset(&root, !is_derivative, cancel)?;
    diagnostics.extend(walk_diags);

    // Parse relative to the dataset root so directories above it can never
    // contribute entities.
    let classified: Vec<(PathBuf, Entities, FileClass)> = paths
        .into_par_iter()
        .map(|path| {
            let relative = path.strip_prefix(&root).unwrap_or(&path);
            let entities = parse_path(relative).entities;
            let class = classify(&root, &path, &entities);
            (path, entities, class)
        })
        .collect();

    if cancel.is_some_and(|c| c.is_cancelled()) {
        return Err(LayoutError::Cancelled);
    }

    let mut dataset =
        Dataset::assemble(root, description, pipeline, is_derivative, classified, diagnostics);
    if validate {
        let root = dataset.root.clone();
        dataset.valid = dataset
            .files
            .iter()
            .filter(|f| file_is_valid(f, &root))
            .map(|f| f.id)
            .collect::<BTreeSet<FileId>>();
    }

    info!(
        root = %dataset.root.display(),
        files = dataset.files.len(),
        pipeline = dataset.pipeline.as_deref().unwrap_or("-"),
        "Indexed dataset"
    );
    Ok(dataset)
}

// ---------------------------------------------------------------------------
// Metadata materialization
// ---------------------------------------------------------------------------

/// Open every indexed sidecar, materialize its body, and build the
/// per-dataset inverted index over each data file's resolved metadata.
///
/// Unparseable sidecars get an empty body and a dataset diagnostic.
pub fn build_metadata(
    datasets: &mut [Dataset],
    cancel: Option<&CancelToken>,
) -> Result<MetadataIndex> {
    let sidecars: Vec<(usize, PathBuf)> = datasets
        .iter()
        .enumerate()
        .flat_map(|(i, ds)| {
            ds.files
                .iter()
                .filter(|f| f.class == FileClass::SidecarJson)
                .map(move |f| (i, f.path.clone()))
        })
        .collect();

    let bodies: DashMap<PathBuf, JsonMap> = DashMap::new();
    let failures: Mutex<Vec<(usize, String)>> = Mutex::new(Vec::new());
    sidecars.par_iter().for_each(|(ds_idx, path)| {
        match metadata::read_json_map(path) {
            Some(body) => {
                bodies.insert(path.clone(), body);
            }
            None => {
                bodies.insert(path.clone(), JsonMap::new());
                failures
                    .lock()
                    .unwrap()
                    .push((*ds_idx, format!("unparseable sidecar at {}", path.display())));
            }
        }
    });
    for (ds_idx, diag) in failures.into_inner().unwrap() {
        datasets[ds_idx].diagnostics.push(diag);
    }

    if cancel.is_some_and(|c| c.is_cancelled()) {
        return Err(LayoutError::Cancelled);
    }

    let bodies: std::collections::HashMap<PathBuf, JsonMap> = bodies.into_iter().collect();
    let index = metadata_index_from_bodies(datasets, bodies);
    debug!(sidecars = index.bodies.len(), "Metadata store materialized");
    Ok(index)
}

/// Build the per-dataset resolved-metadata index over already-parsed sidecar
/// bodies. Shared by the indexing path and cache load.
pub fn metadata_index_from_bodies(
    datasets: &[Dataset],
    bodies: std::collections::HashMap<PathBuf, JsonMap>,
) -> MetadataIndex {
    let mut by_key: Vec<EntityIndex> = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        let resolved: Vec<(FileId, Vec<(String, String)>)> = dataset
            .files
            .par_iter()
            .filter(|f| f.class == FileClass::Data)
            .map(|f| {
                let merged = metadata::resolve_indexed(dataset, f, &bodies);
                let pairs = merged
                    .iter()
                    .filter_map(|(k, v)| metadata::scalar_string(v).map(|s| (k.clone(), s)))
                    .collect();
                (f.id, pairs)
            })
            .collect();

        let mut index = EntityIndex::new();
        for (id, pairs) in resolved {
            for (key, value) in pairs {
                index.entry(key).or_default().entry(value).or_default().insert(id);
            }
        }
        by_key.push(index);
    }
    MetadataIndex { bodies, by_key }
}
