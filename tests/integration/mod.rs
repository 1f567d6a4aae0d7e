//! Merged scenario patch sets run against realistic mock workspaces.

mod dashboard_patches;
