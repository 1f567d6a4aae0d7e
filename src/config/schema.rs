use serde::Deserialize;
use std::fmt;

use crate::markup::TokenPair;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Semver range checked against the workspace's package.json version.
    #[serde(default)]
    pub version_range: Option<String>,
    /// When true, patch file paths resolve against the workspace root.
    #[serde(default)]
    pub workspace_relative: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    pub file: String,
    pub query: Query,
    pub operation: Operation,
}

fn default_open_prefix() -> String {
    "<div".to_string()
}

fn default_close_prefix() -> String {
    "</div".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Query {
    /// Anchor substring followed by a balanced-tag scan. The prefixes
    /// default to the `<div` / `</div` pair most markup patches target.
    Marker {
        anchor: String,
        #[serde(default = "default_open_prefix")]
        open_prefix: String,
        #[serde(default = "default_close_prefix")]
        close_prefix: String,
    },
    /// Exact substring that must occur exactly once in the file.
    Text { search: String },
}

impl Query {
    /// Token pair for marker queries; text queries have none.
    pub fn token_pair(&self) -> Option<TokenPair> {
        match self {
            Query::Marker {
                open_prefix,
                close_prefix,
                ..
            } => Some(TokenPair::new(open_prefix.clone(), close_prefix.clone())),
            Query::Text { .. } => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Operation {
    /// Substitute the located span with the given text.
    Replace { text: String },
    /// Remove the located span.
    Delete,
}

impl PatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        for patch in &self.patches {
            if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
            }
            if patch.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: Some(patch.id.clone()),
                    field: "file",
                });
            }

            match &patch.query {
                Query::Marker {
                    anchor,
                    open_prefix,
                    close_prefix,
                } => {
                    if anchor.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: Some(patch.id.clone()),
                            field: "query.anchor",
                        });
                    }
                    if open_prefix.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: Some(patch.id.clone()),
                            field: "query.open_prefix",
                        });
                    }
                    if close_prefix.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: Some(patch.id.clone()),
                            field: "query.close_prefix",
                        });
                    }
                    // An opening match takes precedence at any position,
                    // so a closing prefix that begins with the opening
                    // prefix could never be counted.
                    if !open_prefix.is_empty() && close_prefix.starts_with(open_prefix.as_str()) {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: Some(patch.id.clone()),
                            message: "close_prefix must not begin with open_prefix".to_string(),
                        });
                    }
                }
                Query::Text { search } => {
                    if search.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: Some(patch.id.clone()),
                            field: "query.search",
                        });
                    }
                }
            }

            if let Operation::Replace { text } = &patch.operation {
                if text.is_empty() {
                    issues.push(ValidationIssue::InvalidCombo {
                        patch_id: Some(patch.id.clone()),
                        message: "replace with empty text; use a delete operation".to_string(),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch config contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker_patch() -> PatchDefinition {
        PatchDefinition {
            id: "p1".to_string(),
            file: "src/App.tsx".to_string(),
            query: Query::Marker {
                anchor: "{/* row */}".to_string(),
                open_prefix: default_open_prefix(),
                close_prefix: default_close_prefix(),
            },
            operation: Operation::Replace {
                text: "<div>new</div>".to_string(),
            },
        }
    }

    #[test]
    fn valid_config_passes() {
        let config = PatchConfig {
            meta: Metadata::default(),
            patches: vec![marker_patch()],
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_patch_list_is_invalid() {
        let config = PatchConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err.issues[0], ValidationIssue::EmptyPatchList));
    }

    #[test]
    fn empty_anchor_is_invalid() {
        let mut patch = marker_patch();
        patch.query = Query::Marker {
            anchor: String::new(),
            open_prefix: default_open_prefix(),
            close_prefix: default_close_prefix(),
        };
        let config = PatchConfig {
            meta: Metadata::default(),
            patches: vec![patch],
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err.issues[0],
            ValidationIssue::MissingField {
                field: "query.anchor",
                ..
            }
        ));
    }

    #[test]
    fn identical_prefixes_are_invalid() {
        let mut patch = marker_patch();
        patch.query = Query::Marker {
            anchor: "m".to_string(),
            open_prefix: "<div".to_string(),
            close_prefix: "<div".to_string(),
        };
        let config = PatchConfig {
            meta: Metadata::default(),
            patches: vec![patch],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_replacement_is_invalid() {
        let mut patch = marker_patch();
        patch.operation = Operation::Replace {
            text: String::new(),
        };
        let config = PatchConfig {
            meta: Metadata::default(),
            patches: vec![patch],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn marker_query_yields_token_pair() {
        let pair = marker_patch().query.token_pair().unwrap();
        assert_eq!(pair.open, "<div");
        assert_eq!(pair.close, "</div");
    }
}
