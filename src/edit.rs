use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

use crate::lines;

/// Placement of inserted content relative to its anchor line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Before,
    After,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Before => f.write_str("before"),
            Position::After => f.write_str("after"),
        }
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "before" => Ok(Position::Before),
            "after" => Ok(Position::After),
            other => Err(format!("expected `before` or `after`, found {other:?}")),
        }
    }
}

/// One atomic instruction against a file snapshot.
///
/// Line numbers are 1-based and always refer to the snapshot the batch was
/// prepared against, never to positions produced by other directives in
/// the same batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditDirective {
    /// Replace the inclusive range `[start_line, end_line]`. Empty content
    /// deletes the range.
    ReplaceRange {
        start_line: usize,
        end_line: usize,
        new_content: String,
    },
    /// Insert content immediately before or after `anchor_line`.
    InsertAnchored {
        anchor_line: usize,
        position: Position,
        new_content: String,
    },
    /// Insert content after `after_line`.
    InsertAfter {
        after_line: usize,
        new_content: String,
    },
}

impl EditDirective {
    pub fn replace(start_line: usize, end_line: usize, new_content: impl Into<String>) -> Self {
        EditDirective::ReplaceRange {
            start_line,
            end_line,
            new_content: new_content.into(),
        }
    }

    pub fn delete(start_line: usize, end_line: usize) -> Self {
        Self::replace(start_line, end_line, "")
    }

    pub fn insert(anchor_line: usize, position: Position, new_content: impl Into<String>) -> Self {
        EditDirective::InsertAnchored {
            anchor_line,
            position,
            new_content: new_content.into(),
        }
    }

    pub fn insert_after(after_line: usize, new_content: impl Into<String>) -> Self {
        EditDirective::InsertAfter {
            after_line,
            new_content: new_content.into(),
        }
    }

    /// Inclusive line range for range directives.
    pub fn range(&self) -> Option<(usize, usize)> {
        match self {
            EditDirective::ReplaceRange {
                start_line,
                end_line,
                ..
            } => Some((*start_line, *end_line)),
            _ => None,
        }
    }

    /// Anchor line and placement for insertion directives.
    pub fn anchor(&self) -> Option<(usize, Position)> {
        match self {
            EditDirective::InsertAnchored {
                anchor_line,
                position,
                ..
            } => Some((*anchor_line, *position)),
            EditDirective::InsertAfter { after_line, .. } => Some((*after_line, Position::After)),
            EditDirective::ReplaceRange { .. } => None,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            EditDirective::ReplaceRange { new_content, .. }
            | EditDirective::InsertAnchored { new_content, .. }
            | EditDirective::InsertAfter { new_content, .. } => new_content,
        }
    }

    /// Content split into lines. Empty content yields no lines and a single
    /// trailing line break does not add an empty one.
    pub fn content_lines(&self) -> Vec<String> {
        lines::split_lines(self.content())
    }
}

impl fmt::Display for EditDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditDirective::ReplaceRange {
                start_line,
                end_line,
                new_content,
            } => {
                let verb = if new_content.is_empty() {
                    "delete"
                } else {
                    "replace"
                };
                if start_line == end_line {
                    write!(f, "{verb} line {start_line}")
                } else {
                    write!(f, "{verb} lines {start_line}-{end_line}")
                }
            }
            EditDirective::InsertAnchored {
                anchor_line,
                position,
                ..
            } => write!(f, "insert {position} line {anchor_line}"),
            EditDirective::InsertAfter { after_line, .. } => {
                write!(f, "insert after line {after_line}")
            }
        }
    }
}

/// The directives submitted together against one declared snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditBatch {
    /// Line count the caller saw when it prepared the batch.
    pub declared_line_count: usize,
    pub directives: Vec<EditDirective>,
}

impl EditBatch {
    pub fn new(declared_line_count: usize, directives: Vec<EditDirective>) -> Self {
        Self {
            declared_line_count,
            directives,
        }
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

/// Outcome of a successful patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[must_use = "PatchResult carries the new content; it must be written back to take effect"]
pub struct PatchResult {
    /// New full file content, without line markers.
    pub final_content: String,
    pub line_count: usize,
    pub lines_added: usize,
    pub lines_removed: usize,
    pub directives_applied: usize,
    /// Non-fatal diagnostics raised while applying.
    pub warnings: Vec<String>,
    /// xxh3 of the content the batch was applied to.
    pub original_hash: u64,
    /// xxh3 of `final_content`.
    pub final_hash: u64,
}

impl PatchResult {
    pub fn changed(&self) -> bool {
        self.original_hash != self.final_hash
    }
}

/// xxh3 fingerprint used to detect content changes between read and write.
pub fn fingerprint(content: &str) -> u64 {
    xxh3_64(content.as_bytes())
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Path has no parent directory: {0}")]
    NoParent(PathBuf),

    #[error("File I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Atomic file write: tempfile + fsync + rename, then bump mtime.
///
/// Either the full write succeeds or the file is left untouched.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), WriteError> {
    let io_err = |source: io::Error| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };

    // Same directory keeps the rename on one filesystem
    let parent = path
        .parent()
        .ok_or_else(|| WriteError::NoParent(path.to_path_buf()))?;

    // Existing files keep their mode; new files get the tempfile default
    let permissions = match fs::metadata(path) {
        Ok(metadata) => Some(metadata.permissions()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(io_err(e)),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    temp.write_all(content).map_err(io_err)?;
    if let Some(permissions) = permissions {
        temp.as_file().set_permissions(permissions).map_err(io_err)?;
    }
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;

    filetime::set_file_mtime(path, filetime::FileTime::now()).map_err(io_err)?;

    Ok(())
}
