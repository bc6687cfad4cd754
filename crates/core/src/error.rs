//! Error taxonomy for layout construction, querying, and cache I/O.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by layout construction, queries, and the cache.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// A root passed to the indexer is not a directory.
    #[error("not a dataset: '{0}' is not a directory")]
    NotADataset(PathBuf),

    /// A dataset indexed with validation lacks a dataset_description.json.
    #[error("dataset at '{0}' has no dataset_description.json")]
    MissingDescription(PathBuf),

    /// A filter referenced an entity that exists nowhere in scope.
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    /// A scope referenced a pipeline name that is not tracked.
    #[error("unknown scope '{0}'")]
    UnknownScope(String),

    /// A metadata key was queried before metadata was indexed.
    #[error("'{0}' requires indexed metadata; call index_metadata() first")]
    MetadataNotIndexed(String),

    /// Two derivative datasets resolved to the same pipeline name.
    #[error("pipeline '{0}' is already tracked")]
    DuplicatePipeline(String),

    /// The cache directory exists but cannot be parsed.
    #[error("cache at '{path}' could not be loaded: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    /// A documented legacy API entry point with no implementation.
    #[error("{0} is not implemented")]
    Compatibility(String),

    /// Indexing was interrupted via the cancellation token.
    #[error("indexing was cancelled")]
    Cancelled,

    /// An entity value that the parser can never produce (e.g. empty string).
    #[error("invalid value for entity '{0}': values must be non-empty")]
    InvalidEntityValue(String),

    /// A path-based lookup that matched no indexed file.
    #[error("no indexed file at '{0}'")]
    FileNotFound(PathBuf),

    /// A JSON document that was asked for explicitly and does not parse.
    #[error("invalid JSON at '{path}': {reason}")]
    InvalidJson { path: PathBuf, reason: String },

    /// I/O failure outside the per-file suppression rules (roots, cache).
    #[error("i/o error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LayoutError {
    /// Exit code for the command-line surface: 2 for invalid queries,
    /// 3 for index/cache I/O failures, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            LayoutError::UnknownEntity(_)
            | LayoutError::UnknownScope(_)
            | LayoutError::MetadataNotIndexed(_)
            | LayoutError::InvalidEntityValue(_) => 2,
            LayoutError::Io { .. } | LayoutError::CacheCorrupt { .. } => 3,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, LayoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(LayoutError::UnknownEntity("badentity".into()).exit_code(), 2);
        assert_eq!(LayoutError::UnknownScope("nope".into()).exit_code(), 2);
        assert_eq!(
            LayoutError::CacheCorrupt { path: "/tmp/x".into(), reason: "truncated".into() }
                .exit_code(),
            3
        );
        assert_eq!(LayoutError::Cancelled.exit_code(), 1);
        assert_eq!(LayoutError::Compatibility("to_df()".into()).exit_code(), 1);
    }
}
