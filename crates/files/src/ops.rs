//! Filesystem primitives invoked by the node agent.
//!
//! These operate on paths that were already resolved by the
//! [`PathGuard`](crate::guard::PathGuard); they never see client input.

use bigfs_types::FileEntry;
use filetime::FileTime;
use std::io;
use std::path::Path;
use tokio::fs;

/// Immediate children of `dir`, sorted by name.
pub async fn list_dir(dir: &Path) -> io::Result<Vec<FileEntry>> {
    let mut entries = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;

    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        // Follow symlinks like a plain stat would; fall back to the link itself.
        let metadata = match fs::metadata(entry.path()).await {
            Ok(metadata) => metadata,
            Err(_) => fs::symlink_metadata(entry.path()).await?,
        };
        entries.push(if metadata.is_dir() {
            FileEntry::dir(name)
        } else {
            FileEntry::file(name, metadata.len())
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Create `dir` and any missing ancestors. Succeeds if it already exists.
pub async fn create_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir).await
}

/// Create or overwrite `path` with `content`, creating missing ancestors.
pub async fn create_file(path: &Path, content: &[u8]) -> io::Result<()> {
    ensure_parent(path).await?;
    fs::write(path, content).await
}

pub async fn read_file(path: &Path) -> io::Result<Vec<u8>> {
    let metadata = fs::metadata(path).await?;
    if metadata.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::IsADirectory,
            "cannot read a directory",
        ));
    }
    fs::read(path).await
}

/// Copy a regular file, keeping its permissions and timestamps.
pub async fn copy_file(source: &Path, destination: &Path) -> io::Result<()> {
    let metadata = fs::metadata(source).await?;
    if metadata.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::IsADirectory,
            "source is a directory",
        ));
    }

    ensure_parent(destination).await?;
    fs::copy(source, destination).await?;

    let atime = FileTime::from_last_access_time(&metadata);
    let mtime = FileTime::from_last_modification_time(&metadata);
    let destination = destination.to_path_buf();
    tokio::task::spawn_blocking(move || filetime::set_file_times(&destination, atime, mtime))
        .await
        .map_err(io::Error::other)?
}

/// Remove a file, or a directory together with everything under it.
pub async fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path).await?;
    if metadata.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    }
}

pub async fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent).await,
        None => Ok(()),
    }
}
