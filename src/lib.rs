//! Markup Patcher: structural patching for markup-like documents
//!
//! A patching system built on a balanced-tag span scanner and a verified
//! byte-span replacement primitive. Given an anchor substring and a pair
//! of literal token prefixes (`<div` / `</div`), it finds where the first
//! nested element after the anchor truly ends, despite further nested
//! elements of the same shape, and substitutes that span.
//!
//! # Architecture
//!
//! All edit operations compile down to a single primitive: [`Edit`], a
//! verified byte-span replacement. Intelligence lives in span acquisition
//! (the marker locator and balance scanner in [`markup`]), not in the
//! application logic.
//!
//! # Safety
//!
//! - All edits verify expected before-text before applying
//! - Atomic file writes (tempfile + fsync + rename)
//! - Workspace boundary enforcement
//! - UTF-8 validation
//! - Idempotent operations
//!
//! # Example
//!
//! ```
//! use markup_patcher::markup::{patch, TokenPair};
//!
//! let document = "A<div><div>B</div></div>C";
//! let patched = patch(document, "A", &TokenPair::element("div"), "X").unwrap();
//! assert_eq!(patched, "AXC");
//! ```

pub mod config;
pub mod edit;
pub mod markup;
pub mod safety;

// Re-exports
pub use config::{
    apply_patches, check_patches, load_from_path, load_from_str, read_project_version,
    ApplicationError, ConfigError, PatchConfig, PatchResult, VersionError,
};
pub use edit::{Edit, EditError, EditResult, EditVerification};
pub use markup::{locate, patch, preview, scan, splice, MarkerMatch, ScanError, Span, TokenPair};
pub use safety::{SafetyError, WorkspaceGuard};
