use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Confines file access to one workspace directory.
///
/// Every path handed to the dispatcher is canonicalized and must land inside
/// the root and outside each forbidden directory.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    root: PathBuf,
    forbidden: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("{path} is outside the workspace {workspace}")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("{path} is inside the protected directory {forbidden}")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("cannot resolve {path}: {source}")]
    Unresolvable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceGuard {
    /// Guard `root`, refusing the given root-relative directories as well as
    /// the toolchain caches under the home directory.
    pub fn new<S: AsRef<str>>(root: impl AsRef<Path>, forbidden: &[S]) -> Result<Self, SafetyError> {
        let root = canonical(root.as_ref())?;

        let mut guarded: Vec<PathBuf> = forbidden
            .iter()
            .map(|dir| resolve_if_present(&root.join(dir.as_ref())))
            .collect();

        if let Some(home) = home::home_dir() {
            for cache in [".cargo/registry", ".cargo/git", ".rustup"] {
                if let Ok(path) = home.join(cache).canonicalize() {
                    guarded.push(path);
                }
            }
        }

        debug!(root = %root.display(), forbidden = guarded.len(), "workspace guard ready");
        Ok(Self {
            root,
            forbidden: guarded,
        })
    }

    /// Resolve `path` (relative paths are taken from the root) and check it.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let resolved = canonical(&absolute)?;
        self.check(&resolved)?;
        Ok(resolved)
    }

    /// Re-check an already validated path right before it is written.
    pub fn revalidate(&self, path: &Path) -> Result<PathBuf, SafetyError> {
        let resolved = canonical(path)?;
        self.check(&resolved)?;
        Ok(resolved)
    }

    fn check(&self, resolved: &Path) -> Result<(), SafetyError> {
        if !resolved.starts_with(&self.root) {
            return Err(SafetyError::OutsideWorkspace {
                path: resolved.to_path_buf(),
                workspace: self.root.clone(),
            });
        }
        if let Some(forbidden) = self.forbidden.iter().find(|dir| resolved.starts_with(dir)) {
            return Err(SafetyError::ForbiddenPath {
                path: resolved.to_path_buf(),
                forbidden: forbidden.clone(),
            });
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path relative to the root, for messages.
    pub fn display_path<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

fn canonical(path: &Path) -> Result<PathBuf, SafetyError> {
    path.canonicalize().map_err(|source| SafetyError::Unresolvable {
        path: path.to_path_buf(),
        source,
    })
}

// Forbidden directories need not exist yet.
fn resolve_if_present(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
