//! Host side of the edit tool: files, locks, and write-back around the
//! pure [`PatchEngine`].
//!
//! ```text
//! edit_file(path, declared, directives)
//!   -> guard.validate_path -> locks.try_lock -> read + fingerprint
//!   -> engine.patch -> re-read + compare fingerprint -> atomic_write -> lint
//! ```

pub mod lint;
pub mod locks;
pub mod tools;

pub use lint::{CommandLinter, LintDiagnostic, Linter};
pub use locks::{FileLock, FileLocks};
pub use tools::{ToolCall, ToolResponse};

use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::edit::{atomic_write, fingerprint, PatchResult, WriteError};
use crate::engine::{PatchEngine, PatchError};
use crate::lines::{self, Numbering};
use crate::safety::{SafetyError, WorkspaceGuard};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error("{path} is already being edited by another request; re-read it and retry")]
    Busy { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("{path} changed on disk while the edit was being applied; re-read it and retry")]
    ChangedOnDisk { path: PathBuf },

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl DispatchError {
    /// Machine-readable name of the step that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            DispatchError::Safety(_) => "workspace",
            DispatchError::Busy { .. } => "busy",
            DispatchError::Read { .. } => "read",
            DispatchError::Patch(e) => e.kind().as_str(),
            DispatchError::ChangedOnDisk { .. } => "changed_on_disk",
            DispatchError::Write(_) => "write",
        }
    }

    /// Message relayed to the agent.
    pub fn diagnostic(&self) -> String {
        match self {
            DispatchError::Patch(e) => e.diagnostic(),
            other => other.to_string(),
        }
    }
}

/// Result of [`Dispatcher::edit_file`] or [`Dispatcher::preview_edit`].
#[derive(Debug, Clone, Serialize)]
pub struct EditOutcome {
    /// Path relative to the workspace root.
    pub path: PathBuf,
    /// Original content, kept for diff rendering.
    #[serde(skip)]
    pub original: String,
    pub result: PatchResult,
    pub written: bool,
    pub lint: Vec<LintDiagnostic>,
}

impl fmt::Display for EditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.written {
            "applied"
        } else if self.result.changed() {
            "would apply"
        } else {
            "no change from"
        };
        write!(
            f,
            "{verb} {} edit(s) to {}: +{} -{} lines, now {} lines",
            self.result.directives_applied,
            self.path.display(),
            self.result.lines_added,
            self.result.lines_removed,
            self.result.line_count
        )
    }
}

/// A numbered page of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileView {
    pub path: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
    /// Total lines in the file; echo this back as the declared line count.
    pub total_lines: usize,
    pub content: String,
}

struct Prepared {
    path: PathBuf,
    original: String,
    result: PatchResult,
}

pub struct Dispatcher {
    engine: PatchEngine,
    guard: WorkspaceGuard,
    locks: FileLocks,
    linter: Option<Box<dyn Linter>>,
}

impl Dispatcher {
    pub fn new(engine: PatchEngine, guard: WorkspaceGuard) -> Self {
        Self {
            engine,
            guard,
            locks: FileLocks::new(),
            linter: None,
        }
    }

    /// Build a dispatcher for `root` from loaded config.
    pub fn from_config(config: &Config, root: &Path) -> Result<Self, DispatchError> {
        let guard = WorkspaceGuard::new(root, &config.workspace.forbidden)?;
        let mut dispatcher = Self::new(PatchEngine::new(config.engine_options()), guard);
        if let Some(lint) = &config.lint {
            dispatcher = dispatcher.with_linter(CommandLinter::from_config(lint));
        }
        Ok(dispatcher)
    }

    pub fn with_linter(mut self, linter: impl Linter + 'static) -> Self {
        self.linter = Some(Box::new(linter));
        self
    }

    pub fn engine(&self) -> &PatchEngine {
        &self.engine
    }

    pub fn guard(&self) -> &WorkspaceGuard {
        &self.guard
    }

    pub fn locks(&self) -> &FileLocks {
        &self.locks
    }

    /// Apply `directives` to the file at `path` and write the result back.
    pub fn edit_file(
        &self,
        path: impl AsRef<Path>,
        declared_line_count: usize,
        directives: &str,
    ) -> Result<EditOutcome, DispatchError> {
        let path = self.guard.validate_path(path)?;
        let _lock = self.lock(&path)?;

        let prepared = self.prepare(&path, declared_line_count, directives)?;
        let written = self.commit(&prepared)?;

        let lint = match &self.linter {
            Some(linter) if written => linter.lint(&prepared.path),
            _ => Vec::new(),
        };

        Ok(self.outcome(prepared, written, lint))
    }

    /// Same checks as [`Dispatcher::edit_file`] without writing.
    pub fn preview_edit(
        &self,
        path: impl AsRef<Path>,
        declared_line_count: usize,
        directives: &str,
    ) -> Result<EditOutcome, DispatchError> {
        let path = self.guard.validate_path(path)?;
        let _lock = self.lock(&path)?;
        let prepared = self.prepare(&path, declared_line_count, directives)?;
        Ok(self.outcome(prepared, false, Vec::new()))
    }

    /// Numbered view of lines `start..=end` (whole file by default).
    pub fn read_file(
        &self,
        path: impl AsRef<Path>,
        start_line: Option<usize>,
        end_line: Option<usize>,
    ) -> Result<FileView, DispatchError> {
        let path = self.guard.validate_path(path)?;
        let content = read(&path)?;
        let total_lines = lines::count_lines(&content);

        let start_line = start_line.unwrap_or(1).max(1);
        let end_line = end_line.unwrap_or(total_lines).min(total_lines);
        let page = if start_line > end_line {
            String::new()
        } else {
            let text = lines::fragment(&content, start_line, end_line);
            lines::add_line_numbers_with(&text, Numbering::starting_at(start_line))
        };

        Ok(FileView {
            path: self.guard.display_path(&path).to_path_buf(),
            start_line,
            end_line,
            total_lines,
            content: page,
        })
    }

    pub fn count_lines(&self, path: impl AsRef<Path>) -> Result<usize, DispatchError> {
        let path = self.guard.validate_path(path)?;
        Ok(lines::count_lines(&read(&path)?))
    }

    fn lock(&self, path: &Path) -> Result<FileLock, DispatchError> {
        self.locks.try_lock(path).ok_or_else(|| DispatchError::Busy {
            path: self.guard.display_path(path).to_path_buf(),
        })
    }

    fn prepare(
        &self,
        path: &Path,
        declared_line_count: usize,
        directives: &str,
    ) -> Result<Prepared, DispatchError> {
        let original = read(path)?;
        let result = self.engine.patch(&original, declared_line_count, directives)?;
        Ok(Prepared {
            path: path.to_path_buf(),
            original,
            result,
        })
    }

    /// Write the patched content unless the file moved under us.
    /// Returns whether anything was written.
    fn commit(&self, prepared: &Prepared) -> Result<bool, DispatchError> {
        let path = self.guard.revalidate(&prepared.path)?;
        let on_disk = read(&path)?;
        if fingerprint(&on_disk) != prepared.result.original_hash {
            return Err(DispatchError::ChangedOnDisk {
                path: self.guard.display_path(&path).to_path_buf(),
            });
        }

        if !prepared.result.changed() {
            debug!(path = %path.display(), "content unchanged, skipping write");
            return Ok(false);
        }

        atomic_write(&path, prepared.result.final_content.as_bytes())?;
        info!(
            path = %path.display(),
            lines = prepared.result.line_count,
            "wrote patched file"
        );
        Ok(true)
    }

    fn outcome(&self, prepared: Prepared, written: bool, lint: Vec<LintDiagnostic>) -> EditOutcome {
        EditOutcome {
            path: self.guard.display_path(&prepared.path).to_path_buf(),
            original: prepared.original,
            result: prepared.result,
            written,
            lint,
        }
    }
}

fn read(path: &Path) -> Result<String, DispatchError> {
    fs::read_to_string(path).map_err(|source| DispatchError::Read {
        path: path.to_path_buf(),
        source,
    })
}
