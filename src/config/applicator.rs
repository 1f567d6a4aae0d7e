//! Patch applicator - applies patch definitions with idempotency checks
//!
//! This module provides high-level patch application that:
//! - Filters patch sets by version constraints
//! - Resolves and guards target paths against the workspace boundary
//! - Acquires byte spans through the marker locator and balance scanner
//! - Applies all edits for a file as one atomic batch
//! - Reports detailed results for each patch

use crate::config::schema::{Operation, PatchConfig, PatchDefinition, Query};
use crate::config::version::{matches_requirement, VersionError};
use crate::edit::{Edit, EditError, EditResult};
use crate::markup::{self, ScanError, Span};
use crate::safety::WorkspaceGuard;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of applying a single patch
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult should be checked for success/failure"]
pub enum PatchResult {
    /// Patch was successfully applied
    Applied { file: PathBuf },
    /// Patch was already applied (idempotent check passed)
    AlreadyApplied { file: PathBuf },
    /// Patch was skipped due to version constraint
    SkippedVersion { reason: String },
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Applied { file } => {
                write!(f, "Applied patch to {}", file.display())
            }
            PatchResult::AlreadyApplied { file } => {
                write!(f, "Already applied to {}", file.display())
            }
            PatchResult::SkippedVersion { reason } => {
                write!(f, "Skipped (version): {}", reason)
            }
        }
    }
}

/// Errors during patch application
#[derive(Debug)]
pub enum ApplicationError {
    /// Version filtering error
    Version(VersionError),
    /// File I/O error
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Edit application error
    Edit(EditError),
    /// Target path escaped the workspace or hit a forbidden directory
    Safety { file: PathBuf, reason: String },
    /// Marker locate / balance scan failure
    Scan { file: PathBuf, source: ScanError },
    /// Query matched no locations
    NoMatch { file: PathBuf },
    /// Text query matched multiple locations (ambiguous)
    AmbiguousMatch { file: PathBuf, count: usize },
    /// A whole-file batch failed; individual attribution is lost
    Batch { file: PathBuf, reason: String },
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Version(e) => write!(f, "version error: {}", e),
            ApplicationError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            ApplicationError::Edit(e) => write!(f, "edit error: {}", e),
            ApplicationError::Safety { file, reason } => {
                write!(f, "unsafe target path {}: {}", file.display(), reason)
            }
            ApplicationError::Scan { file, source } => {
                write!(f, "scan failed in {}: {}", file.display(), source)
            }
            ApplicationError::NoMatch { file } => {
                write!(f, "query matched no locations in {}", file.display())
            }
            ApplicationError::AmbiguousMatch { file, count } => {
                write!(
                    f,
                    "ambiguous query match in {} ({} matches, expected 1)",
                    file.display(),
                    count
                )
            }
            ApplicationError::Batch { file, reason } => {
                write!(f, "batch edit failed on {}: {}", file.display(), reason)
            }
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Version(e) => Some(e),
            ApplicationError::Io { source, .. } => Some(source),
            ApplicationError::Edit(e) => Some(e),
            ApplicationError::Scan { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<VersionError> for ApplicationError {
    fn from(e: VersionError) -> Self {
        ApplicationError::Version(e)
    }
}

impl From<EditError> for ApplicationError {
    fn from(e: EditError) -> Self {
        ApplicationError::Edit(e)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Write edits into the workspace.
    Apply,
    /// Simulate edits against temp copies; the workspace is untouched.
    Check,
}

/// Apply a patch configuration to a workspace
///
/// # Arguments
///
/// * `config` - The patch configuration to apply
/// * `workspace_root` - Root directory of the workspace
/// * `project_version` - Version of the target project (from package.json)
///
/// # Returns
///
/// A vector of results, one per patch, in config order
pub fn apply_patches(
    config: &PatchConfig,
    workspace_root: &Path,
    project_version: &str,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    run_gated(config, workspace_root, project_version, Mode::Apply)
}

/// Check patch status without mutating the workspace.
///
/// Mirrors `apply_patches` result semantics (`Applied` means "would
/// apply"), while running all edit operations against temporary copies.
pub fn check_patches(
    config: &PatchConfig,
    workspace_root: &Path,
    project_version: &str,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    run_gated(config, workspace_root, project_version, Mode::Check)
}

fn run_gated(
    config: &PatchConfig,
    workspace_root: &Path,
    project_version: &str,
    mode: Mode,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    match matches_requirement(project_version, config.meta.version_range.as_deref()) {
        Ok(true) => run_batched(config, workspace_root, mode),
        Ok(false) => {
            let req = config.meta.version_range.as_deref().unwrap_or("").trim();
            let reason = if req.is_empty() {
                format!("project version {project_version} does not satisfy patch version constraints")
            } else {
                format!("project version {project_version} does not satisfy version_range {req}")
            };
            config
                .patches
                .iter()
                .map(|patch| {
                    (
                        patch.id.clone(),
                        Ok(PatchResult::SkippedVersion {
                            reason: reason.clone(),
                        }),
                    )
                })
                .collect()
        }
        Err(e) => config
            .patches
            .iter()
            .map(|patch| (patch.id.clone(), Err(ApplicationError::Version(e.clone()))))
            .collect(),
    }
}

/// Batch driver shared by apply and check: group patches by resolved
/// file, read each file once, compute every edit through the pure core,
/// then apply (or simulate) one batch per file.
fn run_batched(
    config: &PatchConfig,
    workspace_root: &Path,
    mode: Mode,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    let guard = match WorkspaceGuard::new(workspace_root) {
        Ok(guard) => guard,
        Err(e) => {
            let reason = e.to_string();
            return config
                .patches
                .iter()
                .map(|patch| {
                    (
                        patch.id.clone(),
                        Err(ApplicationError::Safety {
                            file: workspace_root.to_path_buf(),
                            reason: reason.clone(),
                        }),
                    )
                })
                .collect();
        }
    };

    // Group patches by resolved file path
    let mut patches_by_file: HashMap<PathBuf, Vec<&PatchDefinition>> = HashMap::new();
    for patch in &config.patches {
        let file_path = if config.meta.workspace_relative {
            workspace_root.join(&patch.file)
        } else {
            PathBuf::from(&patch.file)
        };
        patches_by_file.entry(file_path).or_default().push(patch);
    }

    let mut all_results = Vec::new();

    for (file_path, patches) in patches_by_file {
        if !file_path.exists() {
            for patch in patches {
                all_results.push((
                    patch.id.clone(),
                    Err(ApplicationError::NoMatch {
                        file: file_path.clone(),
                    }),
                ));
            }
            continue;
        }

        // Boundary check before any content is read
        let file_path = match guard.validate_path(&file_path) {
            Ok(canonical) => canonical,
            Err(e) => {
                let reason = e.to_string();
                for patch in patches {
                    all_results.push((
                        patch.id.clone(),
                        Err(ApplicationError::Safety {
                            file: file_path.clone(),
                            reason: reason.clone(),
                        }),
                    ));
                }
                continue;
            }
        };

        let content = match fs::read_to_string(&file_path) {
            Ok(c) => c,
            Err(source) => {
                // std::io::Error is not Clone; reconstruct one per patch
                // from the original error's kind and text.
                let kind = source.kind();
                let msg = source.to_string();
                for patch in patches {
                    all_results.push((
                        patch.id.clone(),
                        Err(ApplicationError::Io {
                            path: file_path.clone(),
                            source: std::io::Error::new(kind, msg.clone()),
                        }),
                    ));
                }
                continue;
            }
        };

        let mut edits_with_ids = Vec::new();
        let mut patch_errors = Vec::new();

        for patch in patches {
            match compute_edit_for_patch(patch, &file_path, &content) {
                Ok(edit) => edits_with_ids.push((patch.id.clone(), edit)),
                Err(e) => patch_errors.push((patch.id.clone(), Err(e))),
            }
        }

        if !edits_with_ids.is_empty() {
            // apply_batch sorts by span start descending internally.
            // Sort the same way here so zip() aligns ids with results.
            edits_with_ids.sort_by(|(_, a), (_, b)| b.span.start.cmp(&a.span.start));

            let batch_result = match mode {
                Mode::Apply => {
                    let edits: Vec<Edit> =
                        edits_with_ids.iter().map(|(_, e)| e.clone()).collect();
                    Edit::apply_batch(edits)
                }
                Mode::Check => simulate_batch_edits(&content, &edits_with_ids),
            };

            match batch_result {
                Ok(results) => {
                    for ((patch_id, _), result) in edits_with_ids.iter().zip(results.iter()) {
                        let patch_result = match result {
                            EditResult::Applied { .. } => Ok(PatchResult::Applied {
                                file: file_path.clone(),
                            }),
                            EditResult::AlreadyApplied { .. } => Ok(PatchResult::AlreadyApplied {
                                file: file_path.clone(),
                            }),
                        };
                        all_results.push((patch_id.clone(), patch_result));
                    }
                }
                Err(e) => {
                    // EditError is not Clone; fan the message out instead.
                    let reason = e.to_string();
                    for (patch_id, _) in &edits_with_ids {
                        all_results.push((
                            patch_id.clone(),
                            Err(ApplicationError::Batch {
                                file: file_path.clone(),
                                reason: reason.clone(),
                            }),
                        ));
                    }
                }
            }
        }

        all_results.extend(patch_errors);
    }

    // Restore config.patches order; HashMap iteration is unordered.
    let patch_order: HashMap<&str, usize> = config
        .patches
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id.as_str(), i))
        .collect();
    all_results.sort_by_key(|(id, _)| patch_order.get(id.as_str()).copied().unwrap_or(usize::MAX));

    all_results
}

/// Run a batch against a temporary copy of the file, preserving result
/// semantics. Assumes `edits_with_ids` is sorted descending by start.
fn simulate_batch_edits(
    content: &str,
    edits_with_ids: &[(String, Edit)],
) -> Result<Vec<EditResult>, EditError> {
    let temp_dir = tempfile::tempdir().map_err(EditError::Io)?;
    let temp_file = temp_dir.path().join("patch-check.tmp");
    fs::write(&temp_file, content).map_err(EditError::Io)?;

    let simulated: Vec<Edit> = edits_with_ids
        .iter()
        .map(|(_, edit)| {
            let mut edit = edit.clone();
            edit.file = temp_file.clone();
            edit
        })
        .collect();

    Edit::apply_batch(simulated)
}

/// Compute an Edit for a patch without applying it.
fn compute_edit_for_patch(
    patch: &PatchDefinition,
    file_path: &Path,
    content: &str,
) -> Result<Edit, ApplicationError> {
    match &patch.query {
        Query::Marker {
            anchor,
            open_prefix,
            close_prefix,
        } => compute_marker_edit(patch, file_path, content, anchor, open_prefix, close_prefix),
        Query::Text { search } => compute_text_edit(patch, file_path, content, search),
    }
}

fn replacement_text(operation: &Operation) -> &str {
    match operation {
        Operation::Replace { text } => text,
        Operation::Delete => "",
    }
}

/// An edit that validates as already-applied, for idempotency short-circuits.
fn noop_edit(file_path: &Path) -> Edit {
    Edit::new(file_path, Span::new(0, 0), "", "")
}

/// Locate the anchor, scan the balanced element after it, and build the
/// span edit.
fn compute_marker_edit(
    patch: &PatchDefinition,
    file_path: &Path,
    content: &str,
    anchor: &str,
    open_prefix: &str,
    close_prefix: &str,
) -> Result<Edit, ApplicationError> {
    let pair = crate::markup::TokenPair::new(open_prefix, close_prefix);

    let span = markup::locate(content, anchor)
        .and_then(|marker| markup::scan(content, marker.end(), &pair));

    match span {
        Ok(span) => Ok(Edit::new(
            file_path,
            span,
            replacement_text(&patch.operation),
            span.slice(content),
        )),
        Err(source) => {
            // A replace patch whose target shape is gone can still be
            // already applied if the replacement text is present.
            if let Operation::Replace { text } = &patch.operation {
                if content.contains(text.as_str()) {
                    return Ok(noop_edit(file_path));
                }
            }
            Err(ApplicationError::Scan {
                file: file_path.to_path_buf(),
                source,
            })
        }
    }
}

/// Build an edit for a unique exact-substring query.
fn compute_text_edit(
    patch: &PatchDefinition,
    file_path: &Path,
    content: &str,
    search: &str,
) -> Result<Edit, ApplicationError> {
    if !content.contains(search) {
        // Idempotency: replacement already present, or the text a delete
        // patch removes is already gone.
        match &patch.operation {
            Operation::Replace { text } if content.contains(text.as_str()) => {
                return Ok(noop_edit(file_path));
            }
            Operation::Delete => return Ok(noop_edit(file_path)),
            _ => {}
        }
        return Err(ApplicationError::NoMatch {
            file: file_path.to_path_buf(),
        });
    }

    // O(1) ambiguity check: bail if more than one match exists
    let mut occurrences = content.match_indices(search);
    let first = occurrences.next();
    if first.is_some() && occurrences.next().is_some() {
        return Err(ApplicationError::AmbiguousMatch {
            file: file_path.to_path_buf(),
            count: content.matches(search).count(), // full count only for the message
        });
    }

    let start = first.map(|(i, _)| i).unwrap_or_default();
    let span = Span::new(start, start + search.len());
    Ok(Edit::new(
        file_path,
        span,
        replacement_text(&patch.operation),
        search,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_from_str;

    const DOCUMENT: &str = concat!(
        "export function Card() {\n",
        "    return (\n",
        "        {/* Actions Row */}\n",
        "        <div className=\"outer\">\n",
        "            <div className=\"inner\">content</div>\n",
        "        </div>\n",
        "    );\n",
        "}\n"
    );

    fn workspace_with_document() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{ "name": "demo", "version": "0.5.0" }"#,
        )
        .unwrap();
        fs::write(dir.path().join("Card.tsx"), DOCUMENT).unwrap();
        dir
    }

    fn marker_config() -> PatchConfig {
        load_from_str(
            r#"
[meta]
name = "card-patches"
workspace_relative = true

[[patches]]
id = "actions-row"
file = "Card.tsx"

[patches.query]
type = "marker"
anchor = "{/* Actions Row */}"

[patches.operation]
type = "replace"
text = "<div className=\"replaced\" />"
"#,
        )
        .unwrap()
    }

    #[test]
    fn marker_patch_replaces_balanced_region() {
        let dir = workspace_with_document();
        let results = apply_patches(&marker_config(), dir.path(), "0.5.0");

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].1, Ok(PatchResult::Applied { .. })));

        let patched = fs::read_to_string(dir.path().join("Card.tsx")).unwrap();
        assert!(patched.contains("{/* Actions Row */}"));
        assert!(patched.contains(r#"<div className="replaced" />"#));
        assert!(!patched.contains("inner"));
    }

    #[test]
    fn second_apply_reports_already_applied() {
        let dir = workspace_with_document();
        let config = marker_config();

        let first = apply_patches(&config, dir.path(), "0.5.0");
        assert!(matches!(first[0].1, Ok(PatchResult::Applied { .. })));

        let second = apply_patches(&config, dir.path(), "0.5.0");
        assert!(matches!(
            second[0].1,
            Ok(PatchResult::AlreadyApplied { .. })
        ));
    }

    #[test]
    fn check_does_not_mutate_the_workspace() {
        let dir = workspace_with_document();
        let results = check_patches(&marker_config(), dir.path(), "0.5.0");

        assert!(matches!(results[0].1, Ok(PatchResult::Applied { .. })));
        assert_eq!(
            fs::read_to_string(dir.path().join("Card.tsx")).unwrap(),
            DOCUMENT
        );
    }

    #[test]
    fn version_gate_skips_out_of_range_sets() {
        let dir = workspace_with_document();
        let mut config = marker_config();
        config.meta.version_range = Some(">=0.9".to_string());

        let results = apply_patches(&config, dir.path(), "0.5.0");
        assert!(matches!(
            results[0].1,
            Ok(PatchResult::SkippedVersion { .. })
        ));
        assert_eq!(
            fs::read_to_string(dir.path().join("Card.tsx")).unwrap(),
            DOCUMENT
        );
    }

    #[test]
    fn missing_target_file_is_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let results = apply_patches(&marker_config(), dir.path(), "0.5.0");
        assert!(matches!(
            results[0].1,
            Err(ApplicationError::NoMatch { .. })
        ));
    }

    #[test]
    fn missing_anchor_is_a_scan_error() {
        let dir = workspace_with_document();
        let mut config = marker_config();
        if let Query::Marker { anchor, .. } = &mut config.patches[0].query {
            *anchor = "{/* Missing Row */}".to_string();
        }

        let results = apply_patches(&config, dir.path(), "0.5.0");
        match &results[0].1 {
            Err(ApplicationError::Scan { source, .. }) => {
                assert!(matches!(source, ScanError::MarkerNotFound { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn ambiguous_text_query_is_rejected() {
        let dir = workspace_with_document();
        let config = load_from_str(
            r#"
[meta]
workspace_relative = true

[[patches]]
id = "dup"
file = "Card.tsx"

[patches.query]
type = "text"
search = "className"

[patches.operation]
type = "replace"
text = "klass"
"#,
        )
        .unwrap();

        let results = apply_patches(&config, dir.path(), "0.5.0");
        assert!(matches!(
            results[0].1,
            Err(ApplicationError::AmbiguousMatch { count: 2, .. })
        ));
    }

    #[test]
    fn text_delete_of_absent_text_is_already_applied() {
        let dir = workspace_with_document();
        let config = load_from_str(
            r#"
[meta]
workspace_relative = true

[[patches]]
id = "drop-debug"
file = "Card.tsx"

[patches.query]
type = "text"
search = "console.log(debug);"

[patches.operation]
type = "delete"
"#,
        )
        .unwrap();

        let results = apply_patches(&config, dir.path(), "0.5.0");
        assert!(matches!(
            results[0].1,
            Ok(PatchResult::AlreadyApplied { .. })
        ));
    }

    #[test]
    fn results_preserve_config_order() {
        let dir = workspace_with_document();
        let config = load_from_str(
            r#"
[meta]
workspace_relative = true

[[patches]]
id = "first"
file = "Card.tsx"

[patches.query]
type = "text"
search = "export function Card"

[patches.operation]
type = "replace"
text = "export default function Card"

[[patches]]
id = "second"
file = "Card.tsx"

[patches.query]
type = "marker"
anchor = "{/* Actions Row */}"

[patches.operation]
type = "delete"
"#,
        )
        .unwrap();

        let results = apply_patches(&config, dir.path(), "0.5.0");
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["first", "second"]);
        assert!(results.iter().all(|(_, r)| r.is_ok()));

        let patched = fs::read_to_string(dir.path().join("Card.tsx")).unwrap();
        assert!(patched.contains("export default function Card"));
        assert!(!patched.contains("outer"));
    }
}
