//! Working-directory scoping for file tools.
//!
//! Paths from the model are resolved against the working directory: `.` and
//! `..` components are folded lexically, then the deepest existing ancestor
//! is canonicalized so symlinks are followed before the containment check.
//! With confinement on, anything that lands outside the root is rejected as a
//! validation error.

use crate::{AgentError, Result};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    confine: bool,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, confine: bool) -> Self {
        let root = root.into();
        let absolute = normalize(&std::path::absolute(&root).unwrap_or(root));
        Self {
            root: canonicalize_existing(&absolute).unwrap_or(absolute),
            confine,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_confined(&self) -> bool {
        self.confine
    }

    /// Resolve a model-supplied path to an absolute path.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.trim().is_empty() {
            return Err(AgentError::Validation("path must not be empty".into()));
        }
        let lexical = normalize(&self.root.join(path));
        if !self.confine {
            return Ok(lexical);
        }
        match canonicalize_existing(&lexical) {
            Some(resolved) if resolved.starts_with(&self.root) => Ok(resolved),
            _ => Err(AgentError::Validation(format!(
                "path '{path}' is outside the working directory"
            ))),
        }
    }

    /// Render `path` relative to the root when it lies inside it.
    pub fn display(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".into(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => path.display().to_string(),
        }
    }
}

/// Fold `.` and `..` components without consulting the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the
/// components that do not exist yet. `None` when an existing component
/// cannot be resolved, e.g. a dangling or looping symlink.
fn canonicalize_existing(path: &Path) -> Option<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(canonical) => {
                return Some(missing.iter().rev().fold(canonical, |acc, part| acc.join(part)));
            }
            Err(_) if existing.symlink_metadata().is_ok() => return None,
            Err(_) => {
                missing.push(existing.file_name()?.to_os_string());
                existing = existing.parent()?;
            }
        }
    }
}
