//! On-disk cache — persists a layout so reopening a dataset skips the walk.
//!
//! The cache is a self-describing directory: `layout.json` captures every
//! dataset's root, description, and per-file entities and classification;
//! `metadata.json` captures sidecar bodies when metadata was materialized.
//! Inverted indexes are rebuilt on load, so a loaded layout is equivalent to
//! the indexed one modulo file-id renumbering.

use crate::entities::Entities;
use crate::error::{LayoutError, Result};
use crate::index;
use crate::layout::{Layout, LayoutInner};
use crate::types::{Dataset, FileClass, FileId, IndexConfig, JsonMap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub const MANIFEST_NAME: &str = "layout.json";
pub const METADATA_NAME: &str = "metadata.json";

const FORMAT: &str = "bidscope-cache";
const VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Serialized forms
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct CacheManifest {
    format: String,
    version: u32,
    validate: bool,
    datasets: Vec<CacheDataset>,
}

#[derive(Serialize, Deserialize)]
struct CacheDataset {
    root: PathBuf,
    is_primary: bool,
    pipeline: Option<String>,
    description: Option<JsonMap>,
    diagnostics: Vec<String>,
    files: Vec<CacheFile>,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    path: PathBuf,
    class: FileClass,
    entities: Entities,
    valid: bool,
}

#[derive(Serialize, Deserialize)]
struct CacheMetadata {
    bodies: BTreeMap<PathBuf, JsonMap>,
}

// ---------------------------------------------------------------------------
// Save
// ---------------------------------------------------------------------------

/// Write a layout's full state into `dir`.
pub fn save(layout: &Layout, dir: &Path) -> Result<()> {
    let io_err = |source| LayoutError::Io { path: dir.to_path_buf(), source };
    fs::create_dir_all(dir).map_err(io_err)?;

    let inner = layout.inner();
    let datasets = inner
        .datasets
        .iter()
        .enumerate()
        .map(|(i, ds)| CacheDataset {
            root: ds.root.clone(),
            is_primary: inner.primary == Some(i),
            pipeline: ds.pipeline.clone(),
            description: ds.description.clone(),
            diagnostics: ds.diagnostics.clone(),
            files: ds
                .files
                .iter()
                .map(|f| CacheFile {
                    path: f.path.clone(),
                    class: f.class,
                    entities: f.entities.clone(),
                    valid: ds.valid.contains(&f.id),
                })
                .collect(),
        })
        .collect();

    let manifest = CacheManifest {
        format: FORMAT.to_string(),
        version: VERSION,
        validate: inner.config.validate,
        datasets,
    };
    let body = serde_json::to_string_pretty(&manifest).expect("manifest serialization");
    fs::write(dir.join(MANIFEST_NAME), body).map_err(io_err)?;

    if let Some(meta) = &inner.metadata {
        let bodies: BTreeMap<PathBuf, JsonMap> =
            meta.bodies.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let body = serde_json::to_string_pretty(&CacheMetadata { bodies })
            .expect("metadata serialization");
        fs::write(dir.join(METADATA_NAME), body).map_err(io_err)?;
    }

    info!(dir = %dir.display(), datasets = inner.datasets.len(), "Saved layout cache");
    Ok(())
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

fn corrupt(dir: &Path, reason: impl Into<String>) -> LayoutError {
    LayoutError::CacheCorrupt { path: dir.to_path_buf(), reason: reason.into() }
}

/// Reconstruct a layout from a cache directory written by [`save`].
pub fn load(dir: &Path) -> Result<Layout> {
    let manifest_path = dir.join(MANIFEST_NAME);
    let body = fs::read_to_string(&manifest_path)
        .map_err(|err| corrupt(dir, format!("missing {MANIFEST_NAME}: {err}")))?;
    let manifest: CacheManifest =
        serde_json::from_str(&body).map_err(|err| corrupt(dir, err.to_string()))?;

    if manifest.format != FORMAT {
        return Err(corrupt(dir, format!("unrecognized format '{}'", manifest.format)));
    }
    if manifest.version != VERSION {
        return Err(corrupt(dir, format!("unsupported version {}", manifest.version)));
    }

    let mut datasets = Vec::with_capacity(manifest.datasets.len());
    let mut primary = None;
    let mut derivative_order = Vec::new();
    for cached in manifest.datasets {
        let valid_paths: Vec<PathBuf> =
            cached.files.iter().filter(|f| f.valid).map(|f| f.path.clone()).collect();
        let classified =
            cached.files.into_iter().map(|f| (f.path, f.entities, f.class)).collect();

        let is_derivative = !cached.is_primary;
        let mut dataset = Dataset::assemble(
            cached.root,
            cached.description,
            cached.pipeline,
            is_derivative,
            classified,
            cached.diagnostics,
        );
        // Ids may have been renumbered by assemble; recover the valid set by path.
        dataset.valid = dataset
            .files
            .iter()
            .filter(|f| valid_paths.contains(&f.path))
            .map(|f| f.id)
            .collect::<BTreeSet<FileId>>();

        if cached.is_primary {
            primary = Some(datasets.len());
        } else {
            derivative_order.push(datasets.len());
        }
        datasets.push(dataset);
    }

    let metadata_path = dir.join(METADATA_NAME);
    let metadata = if metadata_path.is_file() {
        let body = fs::read_to_string(&metadata_path)
            .map_err(|err| corrupt(dir, err.to_string()))?;
        let cached: CacheMetadata =
            serde_json::from_str(&body).map_err(|err| corrupt(dir, err.to_string()))?;
        let bodies: HashMap<PathBuf, JsonMap> = cached.bodies.into_iter().collect();
        Some(index::metadata_index_from_bodies(&datasets, bodies))
    } else {
        None
    };

    let roots = datasets.iter().map(|d| d.root.clone()).collect();
    let has_metadata = metadata.is_some();
    let inner = LayoutInner {
        datasets,
        primary,
        derivative_order,
        roots,
        metadata,
        config: IndexConfig { validate: manifest.validate, index_metadata: has_metadata },
    };
    info!(dir = %dir.display(), "Loaded layout cache");
    Ok(Layout::from_inner(Arc::new(inner)))
}
