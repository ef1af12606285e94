//! # quill-core: versioned document engine
//!
//! A two-layer segment store for a single shared Markdown document:
//!
//! ```text
//! committed layer   ──  canonical text of the current version
//!       │ clone on first edit
//!       ▼
//! working layer     ──  committed clones + pending inserts + delete markers
//!       │ commit()
//!       ▼
//! committed layer   ──  version + 1
//! ```
//!
//! Every edit in a batch addresses positions in the committed baseline:
//! pending insertions are invisible to position arithmetic until commit,
//! so concurrent commands issued against the same version compose without
//! shifting each other's coordinates.
//!
//! ## Modules
//!
//! - [`segment`]: text segments and their commit states
//! - [`document`]: the two-layer store: insert, delete, commit, flatten
//! - [`markdown`]: position-validated Markdown edit commands

pub mod document;
pub mod markdown;
pub mod segment;

pub use document::{Document, EditError};
pub use segment::{Segment, SegmentState};
