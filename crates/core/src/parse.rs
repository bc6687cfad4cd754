//! Filename parser — maps a path to its ordered entity map.
//!
//! Parsing is total: a path that does not follow the naming convention yields
//! an empty entity map, never an error. Directory segments contribute
//! `subject`, `session`, and `datatype`; the basename contributes `key-value`
//! tokens, the trailing `suffix`, and the `extension`.

use crate::entities::Entities;
use crate::schema;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// `<key>-<value>` with both sides alphanumeric.
fn keyval_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z0-9]+)-([A-Za-z0-9]+)$").unwrap())
}

/// A bare alphanumeric token (suffix position).
fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap())
}

/// Result of parsing a single path.
#[derive(Debug, Clone, Default)]
pub struct ParsedPath {
    /// Ordered entity map; empty for unrecognized paths.
    pub entities: Entities,
    /// Parent of the `sub-*` directory, when one exists in the path.
    ///
    /// This is only a structural hint; the indexer always knows the true
    /// dataset root and overrides it.
    pub root_guess: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Path parsing
// ---------------------------------------------------------------------------

/// Parse a path into its entity map and dataset-root hint.
pub fn parse_path(path: &Path) -> ParsedPath {
    let segments: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let Some((basename, dirs)) = segments.split_last() else {
        return ParsedPath::default();
    };

    // Innermost datatype directory wins.
    let datatype_idx = dirs.iter().rposition(|d| schema::is_datatype(d));
    let datatype = datatype_idx.map(|i| dirs[i].clone());

    // sub-/ses- directory segments above the datatype directory; innermost of
    // each kind wins.
    let upper = &dirs[..datatype_idx.unwrap_or(dirs.len())];
    let mut subject: Option<String> = None;
    let mut session: Option<String> = None;
    let mut sub_dir_idx: Option<usize> = None;
    for (i, seg) in upper.iter().enumerate() {
        if let Some(cap) = keyval_re().captures(seg) {
            match &cap[1] {
                "sub" => {
                    subject = Some(cap[2].to_string());
                    sub_dir_idx = Some(i);
                }
                "ses" => session = Some(cap[2].to_string()),
                _ => {}
            }
        }
    }

    let Some((stem_tokens, extension)) = tokenize_basename(basename) else {
        return ParsedPath::default();
    };

    let mut entities = Entities::new();
    if let Some(sub) = &subject {
        entities.insert("subject", sub.clone());
    }
    if let Some(ses) = &session {
        entities.insert("session", ses.clone());
    }
    if let Some(dt) = &datatype {
        entities.insert("datatype", dt.clone());
    }

    let (pairs, suffix) = match split_stem(&stem_tokens) {
        Some(parts) => parts,
        None => return ParsedPath::default(),
    };
    for (key, value) in pairs {
        entities.insert(schema::short_to_long(&key), value);
    }
    if let Some(suffix) = suffix {
        entities.insert("suffix", suffix);
    }
    entities.insert("extension", extension);

    let root_guess = sub_dir_idx.map(|i| {
        let mut p = PathBuf::new();
        if path.is_absolute() {
            p.push(Component::RootDir);
        }
        for seg in &dirs[..i] {
            p.push(seg);
        }
        p
    });

    ParsedPath { entities, root_guess }
}

/// Split a basename on its first `.` into stem tokens and the full extension.
///
/// The extension keeps every trailing dot (`foo.nii.gz` -> `.nii.gz`). A
/// basename with no dot, or with an empty stem, does not follow the grammar.
fn tokenize_basename(basename: &str) -> Option<(Vec<String>, String)> {
    let dot = basename.find('.')?;
    let (stem, extension) = basename.split_at(dot);
    if stem.is_empty() {
        return None;
    }
    Some((stem.split('_').map(str::to_string).collect(), extension.to_string()))
}

/// Classify stem tokens into `key-value` pairs and an optional suffix.
///
/// The last token is the suffix unless it contains a `-`; every other token
/// must be a well-formed `key-value` pair. Returns None on any malformed
/// token, which degrades the whole parse to empty.
fn split_stem(tokens: &[String]) -> Option<(Vec<(String, String)>, Option<String>)> {
    let (last, rest) = tokens.split_last()?;

    let suffix = if last.contains('-') { None } else { Some(last.clone()) };
    if suffix.is_some() && !token_re().is_match(last) {
        return None;
    }

    let mut pairs = Vec::with_capacity(tokens.len());
    let keyed = if suffix.is_some() { rest } else { tokens };
    for tok in keyed {
        let cap = keyval_re().captures(tok)?;
        pairs.push((cap[1].to_string(), cap[2].to_string()));
    }
    Some((pairs, suffix))
}

// ---------------------------------------------------------------------------
// Dataset root probing
// ---------------------------------------------------------------------------

/// Highest ancestor of `path` carrying a `dataset_description.json`, falling
/// back to the structural guess from the path itself.
///
/// The only parser-adjacent function that touches the filesystem; used by the
/// standalone [`crate::parse`] helper, never by the indexer.
pub fn guess_dataset_root(path: &Path) -> Option<PathBuf> {
    let mut found: Option<PathBuf> = None;
    for ancestor in path.ancestors().skip(1) {
        if ancestor.join("dataset_description.json").is_file() {
            found = Some(ancestor.to_path_buf());
        }
    }
    found.or_else(|| parse_path(path).root_guess)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity_vec(parsed: &ParsedPath) -> Vec<(String, String)> {
        parsed.entities.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    /// Synthesize a relative path from an entity map, inverse of `parse_path`.
    fn build_path(entities: &Entities) -> String {
        let mut dirs = String::new();
        if let Some(sub) = entities.get("subject") {
            dirs.push_str(&format!("sub-{sub}/"));
        }
        if let Some(ses) = entities.get("session") {
            dirs.push_str(&format!("ses-{ses}/"));
        }
        if let Some(dt) = entities.get("datatype") {
            dirs.push_str(&format!("{dt}/"));
        }

        let mut tokens: Vec<String> = Vec::new();
        for (name, value) in entities.iter() {
            if matches!(name, "datatype" | "suffix" | "extension") {
                continue;
            }
            tokens.push(format!("{}-{}", schema::long_to_short(name), value));
        }
        if let Some(suffix) = entities.get("suffix") {
            tokens.push(suffix.to_string());
        }
        let ext = entities.get("extension").unwrap_or("");
        format!("{dirs}{}{ext}", tokens.join("_"))
    }

    #[test]
    fn test_parse_anat_t1w() {
        let parsed = parse_path(Path::new("sub-01/anat/sub-01_T1w.nii.gz"));
        assert_eq!(
            entity_vec(&parsed),
            vec![
                ("subject".into(), "01".into()),
                ("datatype".into(), "anat".into()),
                ("suffix".into(), "T1w".into()),
                ("extension".into(), ".nii.gz".into()),
            ]
        );
    }

    #[test]
    fn test_parse_func_bold_with_session() {
        let parsed =
            parse_path(Path::new("sub-01/ses-1/func/sub-01_ses-1_task-rest_run-2_bold.nii.gz"));
        let e = &parsed.entities;
        assert_eq!(e.get("subject"), Some("01"));
        assert_eq!(e.get("session"), Some("1"));
        assert_eq!(e.get("datatype"), Some("func"));
        assert_eq!(e.get("task"), Some("rest"));
        assert_eq!(e.get("run"), Some("2"));
        assert_eq!(e.get("suffix"), Some("bold"));
        assert_eq!(e.get("extension"), Some(".nii.gz"));
    }

    #[test]
    fn test_short_tags_canonicalized() {
        let parsed = parse_path(Path::new("sub-01/anat/sub-01_acq-highres_T1w.nii.gz"));
        assert_eq!(parsed.entities.get("acquisition"), Some("highres"));
        assert!(!parsed.entities.contains_key("acq"));
    }

    #[test]
    fn test_extension_keeps_all_dots() {
        let parsed = parse_path(Path::new("sub-01_T1w.nii.gz"));
        assert_eq!(parsed.entities.get("extension"), Some(".nii.gz"));
        let parsed = parse_path(Path::new("sub-01_T1w.json"));
        assert_eq!(parsed.entities.get("extension"), Some(".json"));
    }

    #[test]
    fn test_no_suffix_when_last_token_keyed() {
        let parsed = parse_path(Path::new("task-rest.json"));
        assert_eq!(parsed.entities.get("task"), Some("rest"));
        assert!(!parsed.entities.contains_key("suffix"));
        assert_eq!(parsed.entities.get("extension"), Some(".json"));
    }

    #[test]
    fn test_innermost_datatype_wins() {
        let parsed = parse_path(Path::new("anat/sub-01/func/sub-01_bold.nii"));
        assert_eq!(parsed.entities.get("datatype"), Some("func"));
    }

    #[test]
    fn test_malformed_token_degrades_to_empty() {
        assert!(parse_path(Path::new("sub-01/anat/a-b-c_bold.nii")).entities.is_empty());
        assert!(parse_path(Path::new("sub-01/anat/bad token_bold.nii")).entities.is_empty());
        assert!(parse_path(Path::new("dataset_description.json")).entities.is_empty());
    }

    #[test]
    fn test_no_extension_degrades_to_empty() {
        assert!(parse_path(Path::new("sub-01/anat/README")).entities.is_empty());
    }

    #[test]
    fn test_hidden_file_degrades_to_empty() {
        assert!(parse_path(Path::new(".bidsignore")).entities.is_empty());
    }

    #[test]
    fn test_user_defined_key_preserved() {
        let parsed = parse_path(Path::new("sub-01/anat/sub-01_weird-file_T1w.nii")).entities;
        assert_eq!(parsed.get("weird"), Some("file"));
    }

    #[test]
    fn test_root_guess_is_parent_of_subject_dir() {
        let parsed = parse_path(Path::new("/data/study/sub-01/anat/sub-01_T1w.nii.gz"));
        assert_eq!(parsed.root_guess, Some(PathBuf::from("/data/study")));

        let parsed = parse_path(Path::new("sub-01/anat/sub-01_T1w.nii.gz"));
        assert_eq!(parsed.root_guess, Some(PathBuf::from("")));
    }

    #[test]
    fn test_build_parse_round_trip() {
        let cases: Vec<Vec<(&str, &str)>> = vec![
            vec![("subject", "01"), ("suffix", "T1w"), ("extension", ".nii.gz")],
            vec![
                ("subject", "01"),
                ("session", "1"),
                ("datatype", "func"),
                ("task", "rest"),
                ("run", "01"),
                ("suffix", "bold"),
                ("extension", ".nii.gz"),
            ],
            vec![("task", "rest"), ("suffix", "bold"), ("extension", ".json")],
            vec![
                ("subject", "A12"),
                ("datatype", "anat"),
                ("acquisition", "mprage"),
                ("suffix", "T1w"),
                ("extension", ".nii"),
            ],
            vec![("subject", "01"), ("task", "motor"), ("extension", ".json")],
        ];
        for case in cases {
            let entities: Entities =
                case.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            let path = build_path(&entities);
            let parsed = parse_path(Path::new(&path));
            assert_eq!(parsed.entities, entities, "round trip failed for {path}");
        }
    }
}
