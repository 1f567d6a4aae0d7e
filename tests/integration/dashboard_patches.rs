//! Integration tests for the dashboard actions-row patch set.
//!
//! Exercises a realistic multi-patch file against a mock React dashboard:
//! a marker patch that swaps a sliding-effect row for discrete buttons, a
//! delete patch for a debug overlay, and a text patch on an import line.

use markup_patcher::config::{
    apply_patches, check_patches, load_from_str, ApplicationError, PatchResult,
};
use markup_patcher::markup::ScanError;
use std::fs;
use tempfile::TempDir;

fn setup_mock_dashboard_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();

    fs::create_dir_all(dir.path().join("src/features/dashboard")).unwrap();

    fs::write(
        dir.path().join("package.json"),
        r#"{ "name": "nodeimage-dashboard", "version": "0.5.2" }"#,
    )
    .unwrap();

    // Dashboard.tsx, sliding-effect era markup
    fs::write(
        dir.path().join("src/features/dashboard/Dashboard.tsx"),
        r#"import { Link, Code } from 'lucide-react';

export function Dashboard({ files }) {
    return (
        <section>
            {files.map((file) => (
                <article key={file.key}>
                    {/* Actions Row - NodeImage Sliding Effect */}
                    <div className="relative flex items-center bg-gray-50 h-11">
                        <div className="relative flex-1 overflow-hidden">
                            <span className="slider-thumb">url</span>
                        </div>
                    </div>
                    {/* Debug Overlay */}
                    <div className="debug-overlay">
                        <div className="debug-grid">{file.key}</div>
                    </div>
                </article>
            ))}
        </section>
    );
}
"#,
    )
    .unwrap();

    dir
}

const DASHBOARD_PATCH_SET: &str = r#"
[meta]
name = "dashboard-0.5"
description = "Discrete copy-format buttons for the dashboard"
version_range = ">=0.5.0, <0.6.0"
workspace_relative = true

[[patches]]
id = "actions-row-discrete-buttons"
file = "src/features/dashboard/Dashboard.tsx"

[patches.query]
type = "marker"
anchor = "{/* Actions Row - NodeImage Sliding Effect */}"

[patches.operation]
type = "replace"
text = """<div className="flex items-center justify-between gap-1 px-1">
                        {(['url', 'html', 'markdown', 'bbcode'] as const).map((fmt) => (
                            <button key={fmt} className="h-9 flex-1 rounded-xl">
                                {fmt.toUpperCase()}
                            </button>
                        ))}
                    </div>"""

[[patches]]
id = "drop-debug-overlay"
file = "src/features/dashboard/Dashboard.tsx"

[patches.query]
type = "marker"
anchor = "{/* Debug Overlay */}"

[patches.operation]
type = "delete"

[[patches]]
id = "import-filetext-icon"
file = "src/features/dashboard/Dashboard.tsx"

[patches.query]
type = "text"
search = "import { Link, Code } from 'lucide-react';"

[patches.operation]
type = "replace"
text = "import { Link, Code, FileText } from 'lucide-react';"
"#;

fn dashboard_content(dir: &TempDir) -> String {
    fs::read_to_string(dir.path().join("src/features/dashboard/Dashboard.tsx")).unwrap()
}

#[test]
fn patch_set_applies_all_three_patches() {
    let workspace = setup_mock_dashboard_workspace();
    let config = load_from_str(DASHBOARD_PATCH_SET).unwrap();

    let results = apply_patches(&config, workspace.path(), "0.5.2");
    assert_eq!(results.len(), 3);
    for (id, result) in &results {
        assert!(
            matches!(result, Ok(PatchResult::Applied { .. })),
            "patch {id} did not apply: {result:?}"
        );
    }

    let patched = dashboard_content(&workspace);

    // Marker patch: discrete buttons replace the sliding row, anchor kept.
    assert!(patched.contains("{/* Actions Row - NodeImage Sliding Effect */}"));
    assert!(patched.contains("'url', 'html', 'markdown', 'bbcode'"));
    assert!(!patched.contains("slider-thumb"));
    assert!(!patched.contains("overflow-hidden"));

    // Delete patch: overlay and its nested grid are gone.
    assert!(!patched.contains("debug-overlay"));
    assert!(!patched.contains("debug-grid"));

    // Text patch: import line extended.
    assert!(patched.contains("import { Link, Code, FileText } from 'lucide-react';"));

    // Untouched structure survives byte-for-byte.
    assert!(patched.contains("<article key={file.key}>"));
    assert!(patched.ends_with("    );\n}\n"));
}

#[test]
fn results_come_back_in_config_order() {
    let workspace = setup_mock_dashboard_workspace();
    let config = load_from_str(DASHBOARD_PATCH_SET).unwrap();

    let results = apply_patches(&config, workspace.path(), "0.5.2");
    let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(
        ids,
        [
            "actions-row-discrete-buttons",
            "drop-debug-overlay",
            "import-filetext-icon",
        ]
    );
}

#[test]
fn reapply_is_idempotent_for_replace_and_loud_for_delete() {
    let workspace = setup_mock_dashboard_workspace();
    let config = load_from_str(DASHBOARD_PATCH_SET).unwrap();

    apply_patches(&config, workspace.path(), "0.5.2");
    let after_first = dashboard_content(&workspace);

    let second = apply_patches(&config, workspace.path(), "0.5.2");
    for (id, result) in &second {
        match id.as_str() {
            // Replace patches recognize their own output.
            "actions-row-discrete-buttons" | "import-filetext-icon" => assert!(
                matches!(result, Ok(PatchResult::AlreadyApplied { .. })),
                "patch {id} not recognized as applied: {result:?}"
            ),
            // A delete leaves nothing to recognize. Its anchor now fronts
            // the closing </article> tag, which is not an opening token,
            // so the scanner reports the mismatch instead of deleting a
            // neighboring element.
            "drop-debug-overlay" => match result {
                Err(ApplicationError::Scan { source, .. }) => {
                    assert!(matches!(source, ScanError::UnexpectedToken { .. }));
                }
                other => panic!("unexpected result for {id}: {other:?}"),
            },
            other => panic!("unknown patch id {other}"),
        }
    }

    // The failed delete must not have touched the document.
    assert_eq!(after_first, dashboard_content(&workspace));
}

#[test]
fn check_patches_predicts_apply_without_writing() {
    let workspace = setup_mock_dashboard_workspace();
    let config = load_from_str(DASHBOARD_PATCH_SET).unwrap();
    let before = dashboard_content(&workspace);

    let results = check_patches(&config, workspace.path(), "0.5.2");
    assert!(results
        .iter()
        .all(|(_, r)| matches!(r, Ok(PatchResult::Applied { .. }))));

    assert_eq!(before, dashboard_content(&workspace));
}

#[test]
fn wrong_app_version_applies_nothing() {
    let workspace = setup_mock_dashboard_workspace();
    let config = load_from_str(DASHBOARD_PATCH_SET).unwrap();
    let before = dashboard_content(&workspace);

    let results = apply_patches(&config, workspace.path(), "0.4.9");
    assert!(results
        .iter()
        .all(|(_, r)| matches!(r, Ok(PatchResult::SkippedVersion { .. }))));

    assert_eq!(before, dashboard_content(&workspace));
}
