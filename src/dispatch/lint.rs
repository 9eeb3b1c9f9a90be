//! External lint collaborator run after a successful write-back.
//!
//! Lint output is advisory: a failing or missing linter yields diagnostics
//! (or nothing) but never fails the edit that triggered it.

use serde::Serialize;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::config::LintSection;

/// One line of linter output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintDiagnostic {
    pub message: String,
}

pub trait Linter: Send + Sync {
    fn lint(&self, path: &Path) -> Vec<LintDiagnostic>;
}

/// Runs `command args... <path>` and collects its output lines.
#[derive(Debug, Clone)]
pub struct CommandLinter {
    command: String,
    args: Vec<String>,
    max_lines: usize,
}

impl CommandLinter {
    pub fn new(command: impl Into<String>, args: Vec<String>, max_lines: usize) -> Self {
        Self {
            command: command.into(),
            args,
            max_lines,
        }
    }

    pub fn from_config(section: &LintSection) -> Self {
        Self::new(section.command.clone(), section.args.clone(), section.max_lines)
    }
}

impl Linter for CommandLinter {
    fn lint(&self, path: &Path) -> Vec<LintDiagnostic> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = path.parent() {
            cmd.current_dir(dir);
        }

        let output = match cmd.output() {
            Ok(output) => output,
            Err(e) => {
                warn!(command = %self.command, error = %e, "failed to spawn linter");
                return Vec::new();
            }
        };
        debug!(command = %self.command, status = %output.status, "linter finished");

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        collect_lines(stdout.lines().chain(stderr.lines()), self.max_lines)
    }
}

fn collect_lines<'a>(lines: impl Iterator<Item = &'a str>, max_lines: usize) -> Vec<LintDiagnostic> {
    lines
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .take(max_lines)
        .map(|line| LintDiagnostic {
            message: line.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_skips_blank_lines_and_caps() {
        let text = "first\n\n   \nsecond  \nthird\nfourth";
        let diags = collect_lines(text.lines(), 3);
        let messages: Vec<_> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, ["first", "second", "third"]);
    }

    #[test]
    fn test_missing_command_yields_nothing() {
        let linter = CommandLinter::new("line-patcher-no-such-linter", vec![], 5);
        assert!(linter.lint(Path::new("/tmp/x.txt")).is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_command_receives_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("a.txt");
        std::fs::write(&file, "one\ntwo\n").unwrap();

        let linter = CommandLinter::new("cat", vec![], 10);
        let diags = linter.lint(&file);
        let messages: Vec<_> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, ["one", "two"]);
    }
}
