//! End-to-end layout construction and query tests over fixture trees.

mod helpers;

use bidscope_core::{CancelToken, FilterSpec, FilterValue, Layout, LayoutError};
use helpers::*;
use std::path::Path;

#[test]
fn test_single_subject_entities() {
    let fx = basic_dataset();
    let layout = Layout::new(fx.root()).unwrap();

    let entities = layout.entities();
    assert_eq!(entities["subject"], vec!["01"]);
    assert_eq!(entities["datatype"], vec!["anat"]);
    assert_eq!(entities["suffix"], vec!["T1w"]);
    assert_eq!(entities["extension"], vec![".nii.gz"]);
}

#[test]
fn test_multi_subject_query_sorted() {
    let fx = multi_subject_dataset();
    let layout = Layout::new(fx.root()).unwrap();

    let files = layout
        .get(
            &FilterSpec::new()
                .one_of("subject", &["001", "002", "003", "004", "005"])
                .eq("suffix", "T1w")
                .eq("session", "1"),
        )
        .unwrap();
    assert_eq!(files.len(), 5);

    let paths = path_strings(&files);
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted, "query results must be path-sorted");
    assert!(paths[0].ends_with("sub-001_ses-1_T1w.nii.gz"));
}

#[test]
fn test_absent_value_yields_empty() {
    let fx = basic_dataset();
    let layout = Layout::new(fx.root()).unwrap();

    let files = layout.get(&FilterSpec::new().eq("subject", "999")).unwrap();
    assert!(files.is_empty());
}

#[test]
fn test_unknown_entity_is_an_error_on_get() {
    let fx = basic_dataset();
    let layout = Layout::new(fx.root()).unwrap();

    let err = layout.get(&FilterSpec::new().eq("badentity", "x")).unwrap_err();
    assert!(matches!(err, LayoutError::UnknownEntity(name) if name == "badentity"));
}

#[test]
fn test_unknown_entity_records_diagnostic_on_filter() {
    let fx = basic_dataset();
    let layout = Layout::new(fx.root()).unwrap();

    let filtered = layout.filter(&FilterSpec::new().eq("badentity", "x")).unwrap();
    assert_eq!(filtered.unknown_entities(), &["badentity".to_string()]);
    assert!(filtered.is_empty());
}

#[test]
fn test_filter_commutativity() {
    let fx = multi_subject_dataset();
    let layout = Layout::new(fx.root()).unwrap();

    let f1 = FilterSpec::new().one_of("subject", &["001", "002"]);
    let f2 = FilterSpec::new().eq("suffix", "T1w");

    let a = layout.filter(&f1).unwrap().filter(&f2).unwrap().materialize().unwrap();
    let b = layout.filter(&f2).unwrap().filter(&f1).unwrap().materialize().unwrap();
    assert_eq!(path_strings(&a), path_strings(&b));
    assert_eq!(a.len(), 2);
}

#[test]
fn test_inverted_index_soundness_and_completeness() {
    let fx = multi_subject_dataset();
    let layout = Layout::new(fx.root()).unwrap();

    // Soundness: every (k, v) of every file finds that file again.
    for file in layout.files() {
        for (name, value) in file.entities().iter() {
            let hits = layout.get(&FilterSpec::new().eq(name, value)).unwrap();
            assert!(hits.iter().any(|f| f == &file), "{file} not found via {name}={value}");
        }
    }

    // Completeness: every hit for subject=003 actually carries that value.
    for file in layout.get(&FilterSpec::new().eq("subject", "003")).unwrap() {
        assert_eq!(file.entities().get("subject"), Some("003"));
    }

    // Present / absent agree with the entity map.
    for file in layout.get(&FilterSpec::new().present("session")).unwrap() {
        assert!(file.entities().contains_key("session"));
    }
    for file in layout.get(&FilterSpec::new().absent("session")).unwrap() {
        assert!(!file.entities().contains_key("session"));
    }
}

#[test]
fn test_present_and_absent_conflict_is_empty() {
    let fx = multi_subject_dataset();
    let layout = Layout::new(fx.root()).unwrap();

    let files = layout
        .get(
            &FilterSpec::new()
                .entity("session", FilterValue::Present)
                .entity("session", FilterValue::Absent),
        )
        .unwrap();
    assert!(files.is_empty());
}

#[test]
fn test_short_tag_filters_match_long_names() {
    let fx = basic_dataset();
    let layout = Layout::new(fx.root()).unwrap();

    let via_short = layout.get(&FilterSpec::new().eq("sub", "01")).unwrap();
    let via_long = layout.get(&FilterSpec::new().eq("subject", "01")).unwrap();
    assert_same_files(&via_short, &via_long);
    assert_eq!(via_short.len(), 1);
}

#[test]
fn test_iteration_matches_files() {
    let fx = multi_subject_dataset();
    let layout = Layout::new(fx.root()).unwrap();

    let from_iter: Vec<_> = (&layout).into_iter().collect();
    assert_eq!(path_strings(&from_iter), path_strings(&layout.files()));
}

#[test]
fn test_get_file_lookup() {
    let fx = basic_dataset();
    let layout = Layout::new(fx.root()).unwrap();

    let by_relative = layout.get_file(Path::new("sub-01/anat/sub-01_T1w.nii.gz")).unwrap();
    assert_eq!(by_relative.entities().get("subject"), Some("01"));

    let by_absolute = layout.get_file(&fx.path("sub-01/anat/sub-01_T1w.nii.gz")).unwrap();
    assert_eq!(by_absolute, by_relative);

    assert!(layout.get_file(Path::new("sub-99/anat/missing.nii.gz")).is_none());
}

#[test]
fn test_description_and_roots() {
    let fx = basic_dataset();
    let layout = Layout::new(fx.root()).unwrap();

    assert_eq!(layout.description()["Name"], "basic");
    assert_eq!(layout.root().unwrap(), fx.root());
    assert_eq!(layout.roots(), vec![fx.root().as_path()]);
}

#[test]
fn test_repr_mentions_root_and_counts() {
    let fx = basic_dataset();
    let layout = Layout::new(fx.root()).unwrap();

    let repr = layout.to_string();
    assert!(repr.contains(&fx.root().display().to_string()));
    assert!(repr.contains("files: 2"), "unexpected repr: {repr}");
    assert!(repr.contains("subject: 1"));
}

#[test]
fn test_missing_root_is_fatal() {
    let err = Layout::new("/definitely/not/a/dataset").unwrap_err();
    assert!(matches!(err, LayoutError::NotADataset(_)));
}

#[test]
fn test_cancelled_construction() {
    let fx = multi_subject_dataset();
    let token = CancelToken::new();
    token.cancel();

    let err = Layout::builder().root(fx.root()).cancel(token).build().unwrap_err();
    assert!(matches!(err, LayoutError::Cancelled));
}

#[test]
fn test_validate_excludes_nonconforming_files() {
    let fx = basic_dataset();
    fx.file("sub-01/anat/scans_notes.txt", "free text");
    fx.file("sub-01/anat/sub-02_T1w.nii.gz", "");

    let relaxed = Layout::new(fx.root()).unwrap();
    let strict = Layout::builder().root(fx.root()).validate(true).build().unwrap();

    let relaxed_paths = path_strings(&relaxed.files());
    assert!(relaxed_paths.iter().any(|p| p.ends_with("scans_notes.txt")));

    let strict_paths = path_strings(&strict.files());
    assert!(!strict_paths.iter().any(|p| p.ends_with("scans_notes.txt")));
    // Subject entity disagrees with the sub-01 directory.
    assert!(!strict_paths.iter().any(|p| p.ends_with("sub-02_T1w.nii.gz")));
    assert!(strict_paths.iter().any(|p| p.ends_with("sub-01_T1w.nii.gz")));
}

#[test]
fn test_hidden_root_entries_skipped() {
    let fx = basic_dataset();
    fx.file(".datalad/config", "hidden");
    fx.file(".bidsignore", "*.bak");

    let layout = Layout::new(fx.root()).unwrap();
    let paths = path_strings(&layout.files());
    assert!(!paths.iter().any(|p| p.contains(".datalad") || p.ends_with(".bidsignore")));
}
