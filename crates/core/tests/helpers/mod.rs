//! Test harness for layout integration tests.
//!
//! Builds throwaway BIDS trees in a temp dir; each helper returns the fixture
//! so the TempDir lives for the duration of the test.

// Not every test binary uses every helper.
#![allow(dead_code)]

use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct Fixture {
    temp_dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture { temp_dir: TempDir::new().expect("Failed to create temp dir") }
    }

    /// Canonicalized dataset root (temp dirs may sit behind symlinks).
    pub fn root(&self) -> PathBuf {
        fs::canonicalize(self.temp_dir.path()).expect("canonicalize temp dir")
    }

    /// Create a file (and its parents) with the given contents.
    pub fn file(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).expect("create fixture dirs");
        fs::write(&path, contents).expect("write fixture file");
        path
    }

    /// Create a JSON file from a value.
    pub fn json(&self, rel: &str, value: serde_json::Value) -> PathBuf {
        self.file(rel, &serde_json::to_string_pretty(&value).unwrap())
    }

    /// Path of an existing fixture entry, relative to the canonical root.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }
}

/// One subject, one anatomical image, a description — the smallest dataset.
pub fn basic_dataset() -> Fixture {
    let fx = Fixture::new();
    fx.json("dataset_description.json", json!({"Name": "basic", "BIDSVersion": "1.8.0"}));
    fx.file("sub-01/anat/sub-01_T1w.nii.gz", "");
    fx
}

/// `basic_dataset` plus a sidecar for the T1w image.
pub fn dataset_with_sidecar() -> Fixture {
    let fx = basic_dataset();
    fx.json("sub-01/anat/sub-01_T1w.json", json!({"RepetitionTime": 2.0}));
    fx
}

/// Five subjects with one session each.
pub fn multi_subject_dataset() -> Fixture {
    let fx = Fixture::new();
    fx.json("dataset_description.json", json!({"Name": "multi", "BIDSVersion": "1.8.0"}));
    for subject in ["001", "002", "003", "004", "005"] {
        fx.file(&format!("sub-{subject}/ses-1/anat/sub-{subject}_ses-1_T1w.nii.gz"), "");
    }
    fx
}

/// A raw dataset with two derivative pipelines under derivatives/.
pub fn dataset_with_derivatives() -> Fixture {
    let fx = Fixture::new();
    fx.json("dataset_description.json", json!({"Name": "study", "BIDSVersion": "1.8.0"}));
    fx.file("sub-01/func/sub-01_task-rest_bold.nii.gz", "");
    fx.json(
        "derivatives/fmriprep/dataset_description.json",
        json!({"Name": "fmriprep", "DatasetType": "derivative"}),
    );
    fx.file("derivatives/fmriprep/sub-01/func/sub-01_task-rest_desc-preproc_bold.nii.gz", "");
    fx.json(
        "derivatives/mriqc/dataset_description.json",
        json!({"DatasetType": "derivative", "GeneratedBy": [{"Name": "mriqc"}]}),
    );
    fx.file("derivatives/mriqc/sub-01/func/sub-01_task-rest_qc-group_bold.nii.gz", "");
    fx
}

/// Root-level and subject-level sidecars with overlapping keys.
pub fn inheritance_pyramid() -> Fixture {
    let fx = Fixture::new();
    fx.json("dataset_description.json", json!({"Name": "pyramid", "BIDSVersion": "1.8.0"}));
    fx.json("task-rest_bold.json", json!({"RepetitionTime": 2.0, "EchoTime": 0.05}));
    fx.file("sub-01/func/sub-01_task-rest_bold.nii.gz", "");
    fx.json("sub-01/func/sub-01_task-rest_bold.json", json!({"EchoTime": 0.1}));
    fx
}

/// Sorted path strings for a file list.
pub fn path_strings(files: &[bidscope_core::BidsPath]) -> Vec<String> {
    files.iter().map(|f| f.to_string()).collect()
}

/// Assert two file lists contain the same paths, ignoring order.
pub fn assert_same_files(a: &[bidscope_core::BidsPath], b: &[bidscope_core::BidsPath]) {
    let mut a = path_strings(a);
    let mut b = path_strings(b);
    a.sort();
    b.sort();
    assert_eq!(a, b);
}
