//! Path resolution confined to the served root.
//!
//! Every filesystem operation goes through a [`ResolvedPath`], which can only
//! be produced by [`Sandbox`] after the containment checks pass.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{error, warn};

use crate::error::FileServerError;

/// The served root directory. Cheap to clone; never mutated after construction.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: Arc<PathBuf>,
}

/// An absolute path proven to lie within the served root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    path: PathBuf,
    logical: String,
}

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Normalized path relative to the served root, `/`-separated, empty for the root.
    pub fn logical(&self) -> &str {
        &self.logical
    }

    pub fn is_root(&self) -> bool {
        self.logical.is_empty()
    }

    /// Final component of the path, if any.
    pub fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
    }

    /// Logical path of the containing directory; `None` for the root.
    pub fn parent_logical(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        Some(match self.logical.rfind('/') {
            Some(idx) => &self.logical[..idx],
            None => "",
        })
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// True when any `/`- or `\`-separated segment of `raw` is `..`.
pub fn has_parent_segment(raw: &str) -> bool {
    raw.split(['/', '\\']).any(|segment| segment == "..")
}

/// Separator-aware containment: `candidate` equals `root` or lies below it.
///
/// `Path::starts_with` compares whole components, so `/data2` is not within `/data`.
pub fn is_within(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root)
}

/// Join two logical paths with a single `/`, ignoring empty sides.
pub fn join_logical(base: &str, name: &str) -> String {
    let base = base.trim_matches('/');
    let name = name.trim_start_matches('/');
    match (base.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{name}"),
    }
}

impl Sandbox {
    /// Create a sandbox for `root`, which must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, FileServerError> {
        let root = root.as_ref();
        let canonical = root.canonicalize().map_err(|_| {
            FileServerError::NotFound(format!(
                "Root directory does not exist: {}",
                root.display()
            ))
        })?;

        if !canonical.is_dir() {
            return Err(FileServerError::InvalidInput(format!(
                "Root path is not a directory: {}",
                canonical.display()
            )));
        }

        Ok(Self {
            root: Arc::new(canonical),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a URL-encoded logical path (as it appears in a request URI).
    pub fn resolve_encoded(&self, raw: &str) -> Result<ResolvedPath, FileServerError> {
        let decoded = urlencoding::decode(raw)
            .map_err(|_| FileServerError::InvalidInput("Invalid URL encoding".to_string()))?;
        self.resolve(&decoded)
    }

    /// Resolve a decoded logical path against the served root.
    ///
    /// Fails with [`FileServerError::PathEscape`] for any `..` segment, absolute
    /// component, embedded NUL, or a symlink that leads outside the root. The
    /// path does not need to exist.
    pub fn resolve(&self, relative: &str) -> Result<ResolvedPath, FileServerError> {
        if has_parent_segment(relative) {
            warn!("Path traversal attempt detected: {:?}", relative);
            return Err(FileServerError::PathEscape);
        }

        let trimmed = relative.trim_start_matches(['/', '\\']);
        let mut path = self.root.to_path_buf();
        let mut parts: Vec<String> = Vec::new();

        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(name) => {
                    let name_str = name.to_string_lossy();
                    if name_str.contains('\0') {
                        warn!("Path component contains null byte: {:?}", name);
                        return Err(FileServerError::PathEscape);
                    }
                    path.push(name);
                    parts.push(name_str.to_string());
                }
                Component::CurDir => continue,
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    warn!("Rejected path component in {:?}", relative);
                    return Err(FileServerError::PathEscape);
                }
            }
        }

        if !is_within(&self.root, &path) {
            error!("Path resolution resulted in path outside root: {:?}", path);
            return Err(FileServerError::PathEscape);
        }

        self.verify_links(&path)?;

        Ok(ResolvedPath {
            path,
            logical: parts.join("/"),
        })
    }

    /// Resolve and require the path to exist.
    pub fn resolve_existing(&self, relative: &str) -> Result<ResolvedPath, FileServerError> {
        let resolved = self.resolve(relative)?;
        if std::fs::symlink_metadata(resolved.as_path()).is_err() {
            return Err(FileServerError::NotFound(
                "File or directory not found".to_string(),
            ));
        }
        Ok(resolved)
    }

    /// Resolve `name` inside the logical directory `dir`.
    pub fn resolve_in(&self, dir: &str, name: &str) -> Result<ResolvedPath, FileServerError> {
        self.resolve(&join_logical(dir, name))
    }

    /// Resolve a direct child of an already resolved directory.
    pub fn child(&self, dir: &ResolvedPath, name: &str) -> Result<ResolvedPath, FileServerError> {
        self.resolve_in(dir.logical(), name)
    }

    /// Canonicalize the deepest existing ancestor and check it is still inside
    /// the root, so symlinks cannot be used to step outside.
    fn verify_links(&self, path: &Path) -> Result<(), FileServerError> {
        let existing = path.ancestors().find(|candidate| candidate.exists());
        let Some(existing) = existing else {
            return Ok(());
        };

        let canonical = existing.canonicalize()?;
        if !is_within(&self.root, &canonical) {
            warn!(
                "Symlink escape attempt: {:?} resolved to {:?} which is outside {:?}",
                path, canonical, self.root
            );
            return Err(FileServerError::PathEscape);
        }

        Ok(())
    }
}
