use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use markup_patcher::config::{
    apply_patches, check_patches, load_from_path, read_project_version, ApplicationError,
    PatchResult,
};
use markup_patcher::markup::{self, ScanError, TokenPair};
use similar::{ChangeTag, TextDiff};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "markup-patcher")]
#[command(about = "Structural patching for markup-like documents", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patches to a workspace
    Apply {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific patch file to apply (otherwise applies all in patches/)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Dry run - simulate against temp copies without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Check status of patches without applying
    Status {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },

    /// Verify patches are applied to the current workspace
    Verify {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },

    /// Show where an anchor lands in a document before patching it
    Preview {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Document file, relative to the workspace root
        file: PathBuf,

        /// Anchor substring to locate
        #[arg(short, long)]
        anchor: String,

        /// Number of bytes of context to show after the anchor
        #[arg(long, default_value_t = 240)]
        window: usize,

        /// Opening token prefix for the balance scan
        #[arg(long, default_value = "<div")]
        open_prefix: String,

        /// Closing token prefix for the balance scan
        #[arg(long, default_value = "</div")]
        close_prefix: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            workspace,
            patches,
            dry_run,
            diff,
        } => cmd_apply(workspace, patches, dry_run, diff),

        Commands::Status { workspace } => cmd_status(workspace),

        Commands::Verify { workspace } => cmd_verify(workspace),

        Commands::Preview {
            workspace,
            file,
            anchor,
            window,
            open_prefix,
            close_prefix,
        } => cmd_preview(workspace, file, anchor, window, open_prefix, close_prefix),
    }
}

/// Everything status/verify/apply need to know about one workspace.
struct Target {
    root: PathBuf,
    version: String,
    patch_files: Vec<PathBuf>,
}

impl Target {
    fn resolve(cli_workspace: Option<PathBuf>, patch_file: Option<PathBuf>) -> Result<Self> {
        let root = resolve_workspace(cli_workspace)?;

        let patch_files = match patch_file {
            Some(path) => vec![path],
            None => discover_patch_files(&root)?,
        };

        let version = read_project_version(&root).unwrap_or_else(|| {
            eprintln!(
                "{}",
                "Warning: Could not read version from package.json, using 0.0.0".yellow()
            );
            "0.0.0".to_string()
        });

        Ok(Self {
            root,
            version,
            patch_files,
        })
    }

    fn print_header(&self, title: &str) {
        if !title.is_empty() {
            println!("{}", title.bold());
        }
        println!("Workspace: {}", self.root.display());
        println!("Version: {}", self.version);
        println!();
    }
}

/// Discover .toml patch files, preferring `<workspace>/patches` and
/// falling back to `./patches` (typical when running from the patch
/// repository rather than the target app).
fn discover_patch_files(workspace: &Path) -> Result<Vec<PathBuf>> {
    let mut candidates = vec![workspace.join("patches")];
    if let Ok(cwd) = env::current_dir() {
        candidates.push(cwd.join("patches"));
    }

    for dir in &candidates {
        if !dir.is_dir() {
            continue;
        }

        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("toml"))
            .collect();

        files.sort();
        if !files.is_empty() {
            return Ok(files);
        }
    }

    bail!(
        "No .toml patch files found in either ./patches or {}/patches",
        workspace.display()
    )
}

/// Workspace resolution ladder: --workspace flag, then MARKUP_WORKSPACE,
/// then the nearest ancestor directory holding a package.json.
fn resolve_workspace(cli_workspace: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return path
            .canonicalize()
            .with_context(|| format!("workspace not accessible: {}", path.display()));
    }

    if let Ok(env_path) = env::var("MARKUP_WORKSPACE") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!("Warning: MARKUP_WORKSPACE points to a missing path: {env_path}").yellow()
        );
    }

    let cwd = env::current_dir()?;
    if let Some(root) = cwd.ancestors().find(|a| a.join("package.json").exists()) {
        println!(
            "{}",
            format!("Auto-detected workspace: {}", root.display()).dimmed()
        );
        return Ok(root.to_path_buf());
    }

    bail!(
        "{}\n{}\n  {}\n  {}\n  {}",
        "Could not find a target workspace.".red(),
        "Try one of:".bold(),
        "1. cd into the project: cd /path/to/app && markup-patcher apply",
        "2. Specify explicitly: markup-patcher apply --workspace /path/to/app",
        "3. Set environment variable: export MARKUP_WORKSPACE=/path/to/app"
    )
}

/// Unified diff between the document before and after a patch run.
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!();
    println!("{}", format!("--- {} (original)", file.display()).dimmed());
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    for change in TextDiff::from_lines(original, modified).iter_all_changes() {
        match change.tag() {
            ChangeTag::Delete => print!("{}", format!("-{change}").red()),
            ChangeTag::Insert => print!("{}", format!("+{change}").green()),
            ChangeTag::Equal => print!(" {change}"),
        }
    }
}

/// Conflict diagnostics for a failed patch, with enough context to fix
/// the patch file rather than re-run and hope.
fn display_failure_hints(error: &ApplicationError) {
    match error {
        ApplicationError::Scan { file, source } => {
            match source {
                ScanError::MarkerNotFound { suggestion, .. } => {
                    eprintln!("  {}", "CONFLICT: Anchor not found".red());
                    if let Some(line) = suggestion {
                        eprintln!("  Closest line: {}", line);
                        eprintln!("  The marker comment may have been edited or reindented");
                    }
                }
                ScanError::NoTagAfterMarker { .. } => {
                    eprintln!("  {}", "CONFLICT: No element follows the anchor".red());
                    eprintln!("  The region after the marker may already be rewritten");
                }
                ScanError::UnexpectedToken { found, .. } => {
                    eprintln!(
                        "  {}",
                        format!("CONFLICT: A different element follows the anchor ({found:?})")
                            .red()
                    );
                    eprintln!("  Action: adjust open_prefix/close_prefix for that element");
                }
                ScanError::UnbalancedStructure { .. } => {
                    eprintln!("  {}", "CONFLICT: Element is never closed".red());
                    eprintln!("  The document may be truncated or hand-edited mid-element");
                }
            }
            eprintln!("  File: {}", file.display());
        }
        ApplicationError::NoMatch { file } => {
            eprintln!("  {}", "CONFLICT: Query matched no locations".red());
            eprintln!("  File: {}", file.display());
        }
        ApplicationError::AmbiguousMatch { file, count } => {
            eprintln!(
                "  {}",
                format!("CONFLICT: Query matched {count} locations (expected 1)").red()
            );
            eprintln!("  File: {}", file.display());
            eprintln!("  Action: lengthen the search text until it is unique");
        }
        ApplicationError::Edit(edit_err) => {
            eprintln!("  Edit error: {}", edit_err);
        }
        _ => {}
    }
}

#[derive(Default)]
struct Totals {
    applied: usize,
    already_applied: usize,
    skipped: usize,
    failed: usize,
}

impl Totals {
    fn print_summary(&self) {
        println!("{}", "Summary:".bold());
        println!("  {} applied", self.applied.to_string().green());
        println!(
            "  {} already applied",
            self.already_applied.to_string().yellow()
        );
        println!("  {} skipped", self.skipped.to_string().cyan());
        println!("  {} failed", self.failed.to_string().red());
    }
}

fn cmd_apply(
    workspace: Option<PathBuf>,
    patches: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let target = Target::resolve(workspace, patches)?;
    target.print_header("");

    let mut totals = Totals::default();

    for patch_file in &target.patch_files {
        println!("Loading patches from {}...", patch_file.display());
        let config = load_from_path(patch_file)?;

        // Snapshot the targeted documents so --diff can show what changed.
        let mut before: HashMap<PathBuf, String> = HashMap::new();
        if show_diff && !dry_run {
            for patch in &config.patches {
                let path = if config.meta.workspace_relative {
                    target.root.join(&patch.file)
                } else {
                    PathBuf::from(&patch.file)
                };
                if let Ok(canonical) = path.canonicalize() {
                    if let Ok(content) = fs::read_to_string(&canonical) {
                        before.insert(canonical, content);
                    }
                }
            }
        }

        let results = if dry_run {
            println!("{}", "  [DRY RUN - simulating against temp copies]".cyan());
            check_patches(&config, &target.root, &target.version)
        } else {
            apply_patches(&config, &target.root, &target.version)
        };

        for (patch_id, result) in results {
            match result {
                Ok(PatchResult::Applied { ref file }) => {
                    let verb = if dry_run { "Would apply to" } else { "Applied to" };
                    println!("{} {}: {} {}", "✓".green(), patch_id, verb, file.display());
                    totals.applied += 1;

                    if let Some(original) = before.get(file) {
                        if let Ok(patched) = fs::read_to_string(file) {
                            if original != &patched {
                                display_diff(file, original, &patched);
                            }
                        }
                    }
                }
                Ok(PatchResult::AlreadyApplied { file }) => {
                    println!(
                        "{} {}: Already applied to {}",
                        "⊙".yellow(),
                        patch_id,
                        file.display()
                    );
                    totals.already_applied += 1;
                }
                Ok(PatchResult::SkippedVersion { reason }) => {
                    println!("{} {}: Skipped ({})", "⊘".cyan(), patch_id, reason);
                    totals.skipped += 1;
                }
                Err(e) => {
                    eprintln!("{} {}: Error - {}", "✗".red(), patch_id, e);
                    totals.failed += 1;
                    display_failure_hints(&e);
                }
            }
        }

        println!();
    }

    totals.print_summary();

    if totals.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// Read-only evaluation shared by status and verify: each patch mapped to
/// a short disposition.
enum Disposition {
    /// The patch output is in place.
    Current,
    /// The patch would change the workspace, or cannot land; the string
    /// says why.
    Pending(String),
    /// Out of version range.
    Skipped(String),
}

fn evaluate_patches(target: &Target) -> Result<Vec<(String, Disposition)>> {
    let mut dispositions = Vec::new();

    for patch_file in &target.patch_files {
        let config = load_from_path(patch_file)?;

        for (patch_id, result) in check_patches(&config, &target.root, &target.version) {
            let disposition = match result {
                Ok(PatchResult::AlreadyApplied { .. }) => Disposition::Current,
                Ok(PatchResult::Applied { .. }) => {
                    Disposition::Pending("target found but was not applied".to_string())
                }
                Ok(PatchResult::SkippedVersion { reason }) => Disposition::Skipped(reason),
                Err(e) => Disposition::Pending(e.to_string()),
            };
            dispositions.push((patch_id, disposition));
        }
    }

    Ok(dispositions)
}

fn cmd_status(workspace: Option<PathBuf>) -> Result<()> {
    let target = Target::resolve(workspace, None)?;
    target.print_header("Patch Status Report");

    let dispositions = evaluate_patches(&target)?;

    let current: Vec<_> = dispositions
        .iter()
        .filter(|(_, d)| matches!(d, Disposition::Current))
        .collect();
    if !current.is_empty() {
        println!(
            "{} {} ({} patches)",
            "✓".green(),
            "APPLIED".green().bold(),
            current.len()
        );
        for (id, _) in &current {
            println!("  - {}", id);
        }
        println!();
    }

    let pending: Vec<_> = dispositions
        .iter()
        .filter_map(|(id, d)| match d {
            Disposition::Pending(reason) => Some((id, reason)),
            _ => None,
        })
        .collect();
    if !pending.is_empty() {
        println!(
            "{} {} ({} patches)",
            "⊙".yellow(),
            "NOT APPLIED".yellow().bold(),
            pending.len()
        );
        for (id, reason) in &pending {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
    }

    let skipped: Vec<_> = dispositions
        .iter()
        .filter_map(|(id, d)| match d {
            Disposition::Skipped(reason) => Some((id, reason)),
            _ => None,
        })
        .collect();
    if !skipped.is_empty() {
        println!(
            "{} {} ({} patches)",
            "⊘".cyan(),
            "SKIPPED".cyan().bold(),
            skipped.len()
        );
        for (id, reason) in &skipped {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
    }

    Ok(())
}

fn cmd_verify(workspace: Option<PathBuf>) -> Result<()> {
    let target = Target::resolve(workspace, None)?;
    target.print_header("Verifying patches...");

    let mut verified = 0;
    let mut mismatch = 0;
    let mut skipped = 0;

    for (patch_id, disposition) in evaluate_patches(&target)? {
        match disposition {
            Disposition::Current => {
                println!("{} {}: Verified (already applied)", "✓".green(), patch_id);
                verified += 1;
            }
            Disposition::Pending(reason) => {
                eprintln!("{} {}: MISMATCH ({})", "✗".red(), patch_id, reason);
                mismatch += 1;
            }
            Disposition::Skipped(reason) => {
                println!("{} {}: Skipped ({})", "⊘".cyan(), patch_id, reason);
                skipped += 1;
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} verified", verified.to_string().green());
    println!("  {} mismatch", mismatch.to_string().red());
    println!("  {} skipped", skipped.to_string().cyan());

    if mismatch > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_preview(
    workspace: Option<PathBuf>,
    file: PathBuf,
    anchor: String,
    window: usize,
    open_prefix: String,
    close_prefix: String,
) -> Result<()> {
    let root = resolve_workspace(workspace)?;
    let path = root.join(&file);
    let document = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let marker = match markup::locate(&document, &anchor) {
        Ok(marker) => marker,
        Err(ScanError::MarkerNotFound { suggestion, .. }) => {
            eprintln!("{} anchor not found in {}", "✗".red(), path.display());
            if let Some(line) = suggestion {
                eprintln!("  Closest line: {}", line);
            }
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    println!(
        "{} anchor at byte {} in {}",
        "✓".green(),
        marker.byte_start,
        path.display()
    );
    println!();
    println!("{}", "Context after anchor:".bold());
    println!("{}", markup::preview(&document, marker.end(), window));
    println!();

    let pair = TokenPair::new(open_prefix, close_prefix);
    match markup::scan(&document, marker.end(), &pair) {
        Ok(span) => {
            println!(
                "{} balanced element spans bytes {}..{} ({} bytes)",
                "✓".green(),
                span.start,
                span.end,
                span.len()
            );
            println!("{}", "A replace patch would substitute:".bold());
            println!("{}", span.slice(&document).dimmed());
        }
        Err(e) => {
            println!("{} scan from anchor failed: {}", "✗".red(), e);
        }
    }

    Ok(())
}
