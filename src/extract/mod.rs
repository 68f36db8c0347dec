//! Content extraction: raw email HTML in, heading-attributed blocks out.
//!
//! Two ordered passes. [`sanitize`] strips everything invisible or
//! presentational from the raw body; [`Segmenter`] then splits the cleaned
//! markup into [`ContentBlock`]s ready for relevance scoring.

pub mod sanitize;
pub mod segment;

pub use sanitize::sanitize;
pub use segment::{ContentBlock, Segmenter, DEFAULT_BLOCK_MARKER, DEFAULT_HEADING_MARKER};
