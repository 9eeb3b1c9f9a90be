use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

use crate::engine::EngineOptions;

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub workspace: WorkspaceSection,
    #[serde(default)]
    pub lint: Option<LintSection>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        for dir in &self.workspace.forbidden {
            if dir.trim().is_empty() {
                issues.push(ValidationIssue::EmptyValue {
                    field: "workspace.forbidden",
                });
            } else if PathBuf::from(dir).is_absolute() {
                issues.push(ValidationIssue::InvalidValue {
                    field: "workspace.forbidden",
                    message: format!("`{dir}` must be relative to the workspace root"),
                });
            }
        }

        if let Some(lint) = &self.lint {
            if lint.command.trim().is_empty() {
                issues.push(ValidationIssue::EmptyValue {
                    field: "lint.command",
                });
            }
            if lint.max_lines == 0 {
                issues.push(ValidationIssue::InvalidValue {
                    field: "lint.max_lines",
                    message: "must be at least 1".to_string(),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            strict_line_count: self.engine.strict_line_count,
            preserve_line_endings: self.engine.preserve_line_endings,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Treat a post-apply line count mismatch as a failure.
    #[serde(default)]
    pub strict_line_count: bool,
    #[serde(default = "default_true")]
    pub preserve_line_endings: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            strict_line_count: false,
            preserve_line_endings: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceSection {
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Directories (relative to the root) that may never be edited.
    #[serde(default = "default_forbidden")]
    pub forbidden: Vec<String>,
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            root: None,
            forbidden: default_forbidden(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LintSection {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
}

fn default_true() -> bool {
    true
}

fn default_forbidden() -> Vec<String> {
    vec!["target".to_string(), ".git".to_string()]
}

fn default_max_lines() -> usize {
    20
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
    EmptyValue {
        field: &'static str,
    },
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyValue { field } => write!(f, "`{field}` must not be empty"),
            ValidationIssue::InvalidValue { field, message } => {
                write!(f, "invalid `{field}`: {message}")
            }
        }
    }
}
