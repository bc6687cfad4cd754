//! Metadata inheritance resolver.
//!
//! A sidecar applies to a target file when the sidecar's entity set (minus
//! `extension`) is a subset of the target's and shares at least one pair with
//! it. Applicable sidecars are merged from the dataset root down to the
//! target's directory, with closer files overriding farther ones.

use crate::entities::Entities;
use crate::parse::parse_path;
use crate::types::{Dataset, FileClass, IndexedFile, JsonMap};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Inheritance applicability rule.
pub fn sidecar_applies(sidecar: &Entities, target: &Entities) -> bool {
    let ours = target.without(&["extension"]);
    let theirs = sidecar.without(&["extension"]);
    theirs.is_subset_of(&ours) && theirs.intersects(&ours)
}

// ---------------------------------------------------------------------------
// Resolution against the materialized store
// ---------------------------------------------------------------------------

/// Resolve a file's metadata from a dataset's indexed sidecars.
///
/// Sidecar bodies come from `bodies` (the store built during indexing); a
/// sidecar absent from the store contributes nothing.
pub fn resolve_indexed(
    dataset: &Dataset,
    target: &IndexedFile,
    bodies: &HashMap<PathBuf, JsonMap>,
) -> JsonMap {
    let Some(target_dir) = target.path.parent() else {
        return JsonMap::new();
    };

    // dataset.files is path-sorted, so the stable depth sort keeps sidecars
    // within one directory in path order. A sidecar applies to itself, so a
    // queried .json file resolves to (at least) its own body.
    let mut applicable: Vec<&IndexedFile> = dataset
        .files
        .iter()
        .filter(|f| f.class == FileClass::SidecarJson)
        .filter(|f| f.path.parent().is_some_and(|d| target_dir.starts_with(d)))
        .filter(|f| sidecar_applies(&f.entities, &target.entities))
        .collect();
    applicable.sort_by_key(|f| f.path.components().count());

    let mut merged = JsonMap::new();
    for sidecar in applicable {
        if let Some(body) = bodies.get(&sidecar.path) {
            for (key, value) in body {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

// ---------------------------------------------------------------------------
// Lazy resolution via directory listings
// ---------------------------------------------------------------------------

/// Resolve a file's metadata by walking directories on disk.
///
/// Used when no store was materialized (`index_metadata=false`, or a path that
/// was never indexed). Unreadable directories and unparseable sidecars are
/// skipped with a warning.
pub fn resolve_on_disk(path: &Path, entities: &Entities, dataset_root: &Path) -> JsonMap {
    let Some(parent) = path.parent() else {
        return JsonMap::new();
    };

    // Ancestor chain from the dataset root down to the parent, inclusive.
    let mut chain: Vec<&Path> = Vec::new();
    if !dataset_root.as_os_str().is_empty() && parent.starts_with(dataset_root) {
        let mut current = parent;
        loop {
            chain.push(current);
            if current == dataset_root {
                break;
            }
            match current.parent() {
                Some(up) => current = up,
                None => break,
            }
        }
        chain.reverse();
    } else {
        chain.push(parent);
    }

    let mut merged = JsonMap::new();
    for dir in chain {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "Skipping unreadable directory");
                continue;
            }
        };
        let mut sidecars: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        sidecars.sort();

        for sidecar in sidecars {
            let relative = sidecar.strip_prefix(dataset_root).unwrap_or(&sidecar);
            let parsed = parse_path(relative).entities;
            if parsed.is_empty() || !sidecar_applies(&parsed, entities) {
                continue;
            }
            match read_json_map(&sidecar) {
                Some(body) => {
                    for (key, value) in body {
                        merged.insert(key, value);
                    }
                }
                None => continue,
            }
        }
    }
    merged
}

/// Read and parse a JSON object file, warning and returning None on failure.
pub fn read_json_map(path: &Path) -> Option<JsonMap> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Could not read JSON file");
            return None;
        }
    };
    match serde_json::from_str::<JsonMap>(&content) {
        Ok(map) => Some(map),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Could not parse JSON file");
            None
        }
    }
}

/// Render a scalar JSON value as the string form used by the metadata index.
pub fn scalar_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
