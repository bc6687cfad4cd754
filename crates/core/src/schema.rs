//! Static entity schema — the table of recognized entity names, their short
//! filename tags, canonical ordering, and the closed datatype set.
//!
//! The table is fixed at compile time; unknown names pass through unchanged
//! and are treated as user-defined.

// ---------------------------------------------------------------------------
// Entity table
// ---------------------------------------------------------------------------

/// (long name, short tag) pairs in canonical filename order.
///
/// The order mirrors the position each entity takes in a compliant basename;
/// it is used when synthesizing paths and when comparing filename tokens.
pub const ENTITIES: &[(&str, &str)] = &[
    ("subject", "sub"),
    ("session", "ses"),
    ("sample", "sample"),
    ("task", "task"),
    ("tracksys", "tracksys"),
    ("acquisition", "acq"),
    ("ceagent", "ce"),
    ("tracer", "trc"),
    ("stain", "stain"),
    ("reconstruction", "rec"),
    ("direction", "dir"),
    ("run", "run"),
    ("modality", "mod"),
    ("echo", "echo"),
    ("flip", "flip"),
    ("inversion", "inv"),
    ("mtransfer", "mt"),
    ("part", "part"),
    ("processing", "proc"),
    ("hemisphere", "hemi"),
    ("space", "space"),
    ("split", "split"),
    ("recording", "recording"),
    ("measurement", "meas"),
    ("chunk", "chunk"),
    ("segmentation", "seg"),
    ("resolution", "res"),
    ("density", "den"),
    ("atlas", "atlas"),
    ("roi", "roi"),
    ("from", "from"),
    ("to", "to"),
    ("label", "label"),
    ("description", "desc"),
];

/// Entities parsed from path structure rather than `key-value` tokens.
pub const STRUCTURAL: &[&str] = &["datatype", "suffix", "extension"];

/// The closed set of datatype directory names.
pub const DATATYPES: &[&str] = &[
    "anat", "beh", "dwi", "eeg", "fmap", "func", "ieeg", "meg", "micr", "motion", "nirs", "perf",
    "pet",
];

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

/// True if `segment` is one of the recognized datatype directory names.
pub fn is_datatype(segment: &str) -> bool {
    DATATYPES.contains(&segment)
}

/// Map a short filename tag to its long entity name.
///
/// Total: unknown tags map to themselves (user-defined entities are preserved).
pub fn short_to_long(tag: &str) -> &str {
    for (long, short) in ENTITIES {
        if *short == tag {
            return long;
        }
    }
    tag
}

/// Map a long entity name to its short filename tag.
///
/// Total: unknown names map to themselves.
pub fn long_to_short(name: &str) -> &str {
    for (long, short) in ENTITIES {
        if *long == name {
            return short;
        }
    }
    name
}

/// True if `name` is a recognized long entity name (including the structural
/// datatype/suffix/extension entities).
pub fn is_known(name: &str) -> bool {
    STRUCTURAL.contains(&name) || ENTITIES.iter().any(|(long, _)| *long == name)
}

/// Position of `name` in the canonical basename ordering, if it has one.
pub fn canonical_order(name: &str) -> Option<usize> {
    ENTITIES.iter().position(|(long, _)| *long == name)
}

// ---------------------------------------------------------------------------
// Per-entity match patterns (experimental)
// ---------------------------------------------------------------------------

/// Best-effort regex for locating an entity's value inside a full path.
///
/// Experimental: the returned patterns are heuristics retained for the legacy
/// API surface only. The parser itself never consults them.
pub fn entity_pattern(name: &str) -> Option<String> {
    if !is_known(name) {
        return None;
    }
    let pattern = match name {
        "suffix" => r"(?:^|[_/\\])([a-zA-Z0-9]+)\.[^/\\]+$".to_string(),
        "extension" => r"[^./\\](\.[^/\\]+)$".to_string(),
        "datatype" => format!(r"[/\\]+({})[/\\]+", DATATYPES.join("|")),
        _ => format!(r"[_/\\]+{}-([a-zA-Z0-9]+)", long_to_short(name)),
    };
    Some(pattern)
}
