use std::path::{Path, PathBuf};
use thiserror::Error;

/// Workspace safety checks to prevent patching files outside the target
/// project tree.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Absolute path to workspace root
    workspace_root: PathBuf,
    /// Canonical paths to forbidden directories
    forbidden_paths: Vec<PathBuf>,
}

/// Generated or vendored subtrees inside a workspace that patches must
/// never touch. Edits there are either lost on the next build or corrupt
/// third-party sources.
const FORBIDDEN_SUBDIRS: &[&str] = &["node_modules", ".git", "dist", "build"];

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl WorkspaceGuard {
    /// Create a new workspace guard with the given root.
    ///
    /// The workspace root is canonicalized to handle symlinks correctly.
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let workspace_root = workspace_root.as_ref().canonicalize()?;

        let mut forbidden_paths = Vec::new();

        for dir in FORBIDDEN_SUBDIRS {
            if let Ok(path) = workspace_root.join(dir).canonicalize() {
                forbidden_paths.push(path);
            }
        }

        // User-level package caches: editing these corrupts shared
        // installs for every project on the machine.
        if let Some(home) = home::home_dir() {
            for dir in [".npm", ".nvm"] {
                if let Ok(path) = home.join(dir).canonicalize() {
                    forbidden_paths.push(path);
                }
            }
        }

        Ok(Self {
            workspace_root,
            forbidden_paths,
        })
    }

    /// Check if a path is safe to edit.
    ///
    /// Relative paths resolve against the workspace root. Returns the
    /// canonicalized absolute path if safe.
    ///
    /// Note: canonicalization happens at validation time. For maximum
    /// TOCTOU safety, call [`WorkspaceGuard::revalidate`] immediately
    /// before the write.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };

        let canonical = absolute.canonicalize()?;
        self.check_canonical(&canonical)?;

        Ok(canonical)
    }

    /// Re-validate a previously-validated canonical path.
    ///
    /// Closes the TOCTOU window: the path is re-canonicalized and
    /// re-checked against workspace and forbidden boundaries.
    pub fn revalidate(&self, path: &Path) -> Result<PathBuf, SafetyError> {
        let canonical = path.canonicalize()?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        if !canonical.starts_with(&self.workspace_root) {
            return Err(SafetyError::OutsideWorkspace {
                path: canonical.to_path_buf(),
                workspace: self.workspace_root.clone(),
            });
        }

        for forbidden in &self.forbidden_paths {
            if canonical.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: canonical.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn accepts_file_inside_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("index.html");
        fs::write(&file, "<html></html>").unwrap();

        let guard = WorkspaceGuard::new(dir.path()).unwrap();
        assert!(guard.validate_path("index.html").is_ok());
        assert!(guard.validate_path(&file).is_ok());
    }

    #[test]
    fn rejects_file_outside_workspace() {
        let workspace = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let file = elsewhere.path().join("stray.html");
        fs::write(&file, "x").unwrap();

        let guard = WorkspaceGuard::new(workspace.path()).unwrap();
        let result = guard.validate_path(&file);
        assert!(matches!(result, Err(SafetyError::OutsideWorkspace { .. })));
    }

    #[test]
    fn rejects_node_modules() {
        let dir = tempfile::tempdir().unwrap();
        let nm = dir.path().join("node_modules/pkg");
        fs::create_dir_all(&nm).unwrap();
        let file = nm.join("index.js");
        fs::write(&file, "x").unwrap();

        let guard = WorkspaceGuard::new(dir.path()).unwrap();
        let result = guard.validate_path(&file);
        assert!(matches!(result, Err(SafetyError::ForbiddenPath { .. })));
    }

    #[test]
    fn rejects_parent_escape() {
        let outer = tempfile::tempdir().unwrap();
        let inner = outer.path().join("project");
        fs::create_dir(&inner).unwrap();
        let sibling = outer.path().join("secret.txt");
        fs::write(&sibling, "x").unwrap();

        let guard = WorkspaceGuard::new(&inner).unwrap();
        let result = guard.validate_path("../secret.txt");
        assert!(matches!(result, Err(SafetyError::OutsideWorkspace { .. })));
    }

    #[test]
    fn missing_path_fails_canonicalization() {
        let dir = tempfile::tempdir().unwrap();
        let guard = WorkspaceGuard::new(dir.path()).unwrap();
        let result = guard.validate_path("does-not-exist.html");
        assert!(matches!(result, Err(SafetyError::Canonicalize(_))));
    }
}
