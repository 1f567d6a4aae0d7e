//! Balanced-tag span scanning for markup-like documents.
//!
//! This module is the span-acquisition layer: it locates an anchor
//! substring, scans forward for the first balanced nested element, and
//! splices replacement text over the resulting byte span. All functions
//! here are pure over `&str`; file I/O lives in [`crate::edit`].

pub mod errors;
pub mod locator;
pub mod preview;
pub mod replacer;
pub mod scanner;

pub use errors::ScanError;
pub use locator::{locate, MarkerMatch};
pub use preview::preview;
pub use replacer::{patch, splice};
pub use scanner::{scan, Span, TokenPair};
