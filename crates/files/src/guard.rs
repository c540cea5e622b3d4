//! Containment check for client-supplied paths.

use bigfs_types::Fault;
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathGuardError {
    #[error("path {requested:?} escapes the storage root")]
    Escape { requested: String },
    #[error("invalid path {requested:?}: {reason}")]
    Invalid {
        requested: String,
        reason: &'static str,
    },
    #[error("storage root {} is unavailable: {source}", root.display())]
    Root { root: PathBuf, source: io::Error },
    #[error("failed to resolve {requested:?}: {source}")]
    Io { requested: String, source: io::Error },
}

impl PathGuardError {
    pub fn to_fault(&self) -> Fault {
        match self {
            PathGuardError::Escape { .. } | PathGuardError::Invalid { .. } => {
                Fault::validation(self.to_string())
            }
            PathGuardError::Root { source, root } => Fault::from_io(source, root.display()),
            PathGuardError::Io { source, requested } => Fault::from_io(source, requested),
        }
    }
}

/// Resolves client paths against one canonical storage root.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// The root must already exist; it is canonicalized once here.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, PathGuardError> {
        let root = root.as_ref();
        let canonical = std::fs::canonicalize(root).map_err(|source| PathGuardError::Root {
            root: root.to_path_buf(),
            source,
        })?;
        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map `requested` to an absolute path inside the root.
    ///
    /// A leading `/` means the storage root. The existing part of the path is
    /// canonicalized (so `..` and symlinks are resolved by the filesystem);
    /// the not-yet-existing tail is normalized lexically. The result is
    /// accepted only when it lies under the canonical root.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, PathGuardError> {
        if requested.contains('\0') {
            return Err(PathGuardError::Invalid {
                requested: requested.to_string(),
                reason: "contains a NUL byte",
            });
        }

        let components: Vec<Component<'_>> = Path::new(requested)
            .components()
            .filter(|c| matches!(c, Component::Normal(_) | Component::ParentDir))
            .collect();

        let (mut resolved, tail) = self.existing_prefix(requested, &components)?;

        for component in tail {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::ParentDir => {
                    if !resolved.pop() {
                        return Err(self.escape(requested));
                    }
                }
                _ => {}
            }
        }

        if !resolved.starts_with(&self.root) {
            return Err(self.escape(requested));
        }
        self.settle(requested, &resolved)
    }

    /// Resolve `normalized` once more. Removing `..` lexically can expose
    /// components that exist (possibly as symlinks) behind a missing one.
    fn settle(&self, requested: &str, normalized: &Path) -> Result<PathBuf, PathGuardError> {
        let relative = normalized
            .strip_prefix(&self.root)
            .map_err(|_| self.escape(requested))?;
        let components: Vec<Component<'_>> = relative.components().collect();

        let (mut resolved, tail) = self.existing_prefix(requested, &components)?;
        for component in tail {
            resolved.push(component.as_os_str());
        }

        if !resolved.starts_with(&self.root) {
            return Err(self.escape(requested));
        }
        Ok(resolved)
    }

    /// Canonicalize the longest prefix of `components` that exists.
    fn existing_prefix<'a>(
        &self,
        requested: &str,
        components: &'a [Component<'a>],
    ) -> Result<(PathBuf, &'a [Component<'a>]), PathGuardError> {
        for split in (1..=components.len()).rev() {
            let candidate = components[..split]
                .iter()
                .fold(self.root.clone(), |mut path, c| {
                    path.push(c.as_os_str());
                    path
                });

            match std::fs::canonicalize(&candidate) {
                Ok(canonical) => return Ok((canonical, &components[split..])),
                Err(err)
                    if err.kind() == io::ErrorKind::NotFound
                        || err.kind() == io::ErrorKind::NotADirectory =>
                {
                    // A dangling symlink exists but cannot be followed; its
                    // target is unknown, so it cannot be proven contained.
                    if std::fs::symlink_metadata(&candidate)
                        .map(|meta| meta.file_type().is_symlink())
                        .unwrap_or(false)
                    {
                        return Err(PathGuardError::Invalid {
                            requested: requested.to_string(),
                            reason: "refers to a dangling symlink",
                        });
                    }
                }
                Err(source) => {
                    return Err(PathGuardError::Io {
                        requested: requested.to_string(),
                        source,
                    })
                }
            }
        }
        Ok((self.root.clone(), components))
    }

    fn escape(&self, requested: &str) -> PathGuardError {
        PathGuardError::Escape {
            requested: requested.to_string(),
        }
    }
}

/// One-shot form of [`PathGuard::resolve`].
pub fn resolve(root: &Path, requested: &str) -> Result<PathBuf, PathGuardError> {
    PathGuard::new(root)?.resolve(requested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn guard() -> (TempDir, PathGuard) {
        let dir = TempDir::new().unwrap();
        let guard = PathGuard::new(dir.path()).unwrap();
        (dir, guard)
    }

    #[test]
    fn test_valid_paths_stay_under_root() {
        let (_dir, guard) = guard();
        fs::create_dir_all(guard.root().join("a/b")).unwrap();

        for requested in ["a", "/a/b", "a/./b", "a/b/../b", "new/file.txt", "/", ""] {
            let resolved = guard.resolve(requested).unwrap();
            assert!(
                resolved.starts_with(guard.root()),
                "{requested} resolved to {}",
                resolved.display()
            );
        }
        assert_eq!(guard.resolve("/").unwrap(), guard.root());
        assert_eq!(guard.resolve("a/b/..").unwrap(), guard.root().join("a"));
    }

    #[test]
    fn test_traversal_rejected() {
        let (_dir, guard) = guard();
        fs::create_dir_all(guard.root().join("a")).unwrap();

        for requested in [
            "..",
            "../etc/passwd",
            "/../../etc",
            "a/../../x",
            "missing/../../x",
            "a/missing/../../../x",
        ] {
            assert!(
                matches!(guard.resolve(requested), Err(PathGuardError::Escape { .. })),
                "{requested} should be rejected"
            );
        }
    }

    #[test]
    fn test_sibling_with_common_prefix_rejected() {
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("root");
        let sibling = parent.path().join("root2");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&sibling).unwrap();

        let guard = PathGuard::new(&root).unwrap();
        assert!(guard.resolve("../root2/x").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_out_of_root_rejected() {
        let (_dir, guard) = guard();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "s3cret").unwrap();
        std::os::unix::fs::symlink(outside.path(), guard.root().join("link")).unwrap();

        for requested in [
            "link/secret.txt",
            "link",
            "missing/../link/secret.txt",
            "missing/deeper/../../link/secret.txt",
        ] {
            assert!(
                matches!(guard.resolve(requested), Err(PathGuardError::Escape { .. })),
                "{requested} resolved outside the root"
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_root_allowed() {
        let (_dir, guard) = guard();
        fs::create_dir_all(guard.root().join("real")).unwrap();
        std::os::unix::fs::symlink(guard.root().join("real"), guard.root().join("alias"))
            .unwrap();

        let resolved = guard.resolve("alias/f.txt").unwrap();
        assert_eq!(resolved, guard.root().join("real").join("f.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_rejected() {
        let (_dir, guard) = guard();
        std::os::unix::fs::symlink("/nonexistent/bigfs-target", guard.root().join("dangling"))
            .unwrap();

        assert!(matches!(
            guard.resolve("dangling"),
            Err(PathGuardError::Invalid { .. })
        ));
    }

    #[test]
    fn test_nul_byte_rejected() {
        let (_dir, guard) = guard();
        assert!(matches!(
            guard.resolve("a\0b"),
            Err(PathGuardError::Invalid { .. })
        ));
    }

    #[test]
    fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        let result = resolve(&dir.path().join("absent"), "a");
        assert!(matches!(result, Err(PathGuardError::Root { .. })));
    }
}
