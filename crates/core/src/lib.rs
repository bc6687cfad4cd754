//! bidscope-core — a fast, queryable in-memory index over BIDS-convention
//! datasets.
//!
//! Point [`Layout`] at a dataset root and it walks the tree, parses every
//! filename into entity tags, records sidecar relationships, and answers
//! entity, file, and metadata queries over composable scoped views. A layout
//! can be persisted to a cache directory and reopened without a rewalk.
//!
//! ```no_run
//! use bidscope_core::{FilterSpec, Layout};
//!
//! let layout = Layout::new("/data/ds000117")?;
//! let bolds = layout.get(&FilterSpec::new().eq("subject", "01").eq("suffix", "bold"))?;
//! for file in &bolds {
//!     println!("{file}: {:?}", file.metadata().get("RepetitionTime"));
//! }
//! # Ok::<(), bidscope_core::LayoutError>(())
//! ```

pub mod bidspath;
pub mod cache;
pub mod compat;
pub mod entities;
pub mod error;
pub mod filter;
pub mod index;
pub mod layout;
pub mod metadata;
pub mod parse;
pub mod schema;
pub mod types;

pub use bidspath::BidsPath;
pub use entities::Entities;
pub use error::{LayoutError, Result};
pub use filter::{FilterSpec, FilterValue, Scope};
pub use layout::{Layout, LayoutBuilder};
pub use types::{CancelToken, Derivatives, FileClass};

use std::path::Path;

/// Parse a single path into an annotated [`BidsPath`] with no layout context.
pub fn parse(path: impl AsRef<Path>) -> BidsPath {
    BidsPath::parse(path)
}
