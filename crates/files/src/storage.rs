//! Node storage: every client-path operation of a node, guarded and
//! converted into structured faults.

use crate::guard::{PathGuard, PathGuardError};
use crate::ops;
use bigfs_types::{Fault, FaultKind, FileEntry};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs::{self, File};
use tracing::{debug, warn};

const PARTIAL_SUFFIX: &str = ".bigfs-part";

/// Storage root of one node.
#[derive(Debug, Clone)]
pub struct NodeStorage {
    guard: PathGuard,
    max_file_size: u64,
}

impl NodeStorage {
    /// Create the root if needed and pin its canonical location.
    pub fn open(root: impl AsRef<Path>, max_file_size: u64) -> Result<Self, PathGuardError> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|source| PathGuardError::Root {
            root: root.to_path_buf(),
            source,
        })?;
        Ok(Self {
            guard: PathGuard::new(root)?,
            max_file_size,
        })
    }

    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn resolve(&self, requested: &str) -> Result<PathBuf, Fault> {
        self.guard.resolve(requested).map_err(|err| {
            debug!("rejected path {:?}: {}", requested, err);
            err.to_fault()
        })
    }

    pub async fn list(&self, path: &Path) -> Result<Vec<FileEntry>, Fault> {
        ops::list_dir(path)
            .await
            .map_err(|err| Fault::from_io(&err, self.display(path)))
    }

    pub async fn create(
        &self,
        path: &Path,
        is_dir: bool,
        content: Option<&str>,
    ) -> Result<(), Fault> {
        let result = if is_dir {
            ops::create_dir(path).await
        } else {
            ops::create_file(path, content.unwrap_or_default().as_bytes()).await
        };
        result.map_err(|err| Fault::from_io(&err, self.display(path)))
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, Fault> {
        let size = fs::metadata(path)
            .await
            .map_err(|err| Fault::from_io(&err, self.display(path)))?
            .len();
        self.check_size(size)?;
        ops::read_file(path)
            .await
            .map_err(|err| Fault::from_io(&err, self.display(path)))
    }

    pub async fn copy(&self, source: &Path, destination: &Path) -> Result<(), Fault> {
        ops::copy_file(source, destination)
            .await
            .map_err(|err| Fault::from_io(&err, self.display(source)))
    }

    pub async fn remove(&self, path: &Path) -> Result<(), Fault> {
        if path == self.root() {
            return Err(Fault::validation("refusing to remove the storage root"));
        }
        ops::remove_path(path)
            .await
            .map_err(|err| Fault::from_io(&err, self.display(path)))
    }

    /// Open a regular file for streaming; returns the handle and its size.
    pub async fn open_download(&self, path: &Path) -> Result<(File, u64), Fault> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|err| Fault::from_io(&err, self.display(path)))?;
        if metadata.is_dir() {
            return Err(Fault::new(
                FaultKind::IsADirectory,
                format!("{} is a directory", self.display(path)),
            ));
        }
        self.check_size(metadata.len())?;

        let file = File::open(path)
            .await
            .map_err(|err| Fault::from_io(&err, self.display(path)))?;
        Ok((file, metadata.len()))
    }

    /// Start an upload to `destination`. Bytes go to a hidden sibling file
    /// until [`Upload::commit`] renames it into place.
    pub async fn begin_upload(&self, destination: &Path) -> Result<Upload, Fault> {
        if fs::metadata(destination)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
        {
            return Err(Fault::new(
                FaultKind::IsADirectory,
                format!("{} is a directory", self.display(destination)),
            ));
        }

        let file_name = destination
            .file_name()
            .ok_or_else(|| Fault::validation("upload destination needs a file name"))?;
        let parent = destination
            .parent()
            .ok_or_else(|| Fault::validation("upload destination needs a parent directory"))?;

        ops::ensure_parent(destination)
            .await
            .map_err(|err| Fault::from_io(&err, self.display(destination)))?;

        let mut prefix = std::ffi::OsString::from(".");
        prefix.push(file_name);
        prefix.push(".");
        let (file, partial) = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(parent)
            .map_err(|err| Fault::from_io(&err, self.display(destination)))?
            .into_parts();

        Ok(Upload {
            destination: destination.to_path_buf(),
            partial,
            file: File::from_std(file),
        })
    }

    pub fn check_size(&self, size: u64) -> Result<(), Fault> {
        if size > self.max_file_size {
            return Err(Fault::new(
                FaultKind::TooLarge,
                format!(
                    "{} bytes exceeds the limit of {} bytes",
                    size, self.max_file_size
                ),
            ));
        }
        Ok(())
    }

    /// Path relative to the root, for messages sent back to clients.
    fn display(&self, path: &Path) -> String {
        match path.strip_prefix(self.root()) {
            Ok(relative) => format!("/{}", relative.display()),
            Err(_) => path.display().to_string(),
        }
    }
}

/// An in-progress upload. Each upload owns a uniquely named partial file,
/// so concurrent uploads to one destination never share bytes.
#[derive(Debug)]
pub struct Upload {
    destination: PathBuf,
    partial: TempPath,
    file: File,
}

impl Upload {
    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Move the complete payload onto the destination path. On failure the
    /// partial file is removed and the destination is left untouched.
    pub async fn commit(self) -> Result<(), Fault> {
        let Upload {
            destination,
            partial,
            file,
        } = self;
        if let Err(err) = file.sync_all().await {
            discard_partial(partial);
            return Err(Fault::from_io(&err, destination.display()));
        }
        drop(file);

        partial.persist(&destination).map_err(|err| {
            let fault = Fault::from_io(&err.error, destination.display());
            discard_partial(err.path);
            fault
        })
    }

    /// Drop the partial data; the destination is left untouched.
    pub async fn discard(self) {
        let Upload { partial, file, .. } = self;
        drop(file);
        discard_partial(partial);
    }
}

fn discard_partial(partial: TempPath) {
    let shown = partial.display().to_string();
    if let Err(err) = partial.close() {
        warn!("failed to remove partial upload {}: {}", shown, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    fn storage(max: u64) -> (TempDir, NodeStorage) {
        let dir = TempDir::new().unwrap();
        let storage = NodeStorage::open(dir.path().join("root"), max).unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_create_list_remove_scenario() {
        let (_dir, storage) = storage(1024);

        let file = storage.resolve("/a/b.txt").unwrap();
        storage.create(&file, false, Some("hi")).await.unwrap();

        let dir = storage.resolve("/a").unwrap();
        assert_eq!(
            storage.list(&dir).await.unwrap(),
            vec![FileEntry::file("b.txt", 2)]
        );

        storage.remove(&dir).await.unwrap();
        let fault = storage.list(&dir).await.unwrap_err();
        assert_eq!(fault.kind, FaultKind::NotFound);
        assert_eq!(fault.message.split(':').next(), Some("/a"));
    }

    #[tokio::test]
    async fn test_create_file_without_content_is_empty() {
        let (_dir, storage) = storage(1024);
        let file = storage.resolve("empty.txt").unwrap();
        storage.create(&file, false, None).await.unwrap();
        assert_eq!(storage.read(&file).await.unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_remove_root_refused() {
        let (_dir, storage) = storage(1024);
        let root = storage.resolve("/").unwrap();
        let fault = storage.remove(&root).await.unwrap_err();
        assert_eq!(fault.kind, FaultKind::Validation);
        assert!(storage.root().exists());
    }

    #[tokio::test]
    async fn test_read_over_limit() {
        let (_dir, storage) = storage(4);
        let file = storage.resolve("big.txt").unwrap();
        storage.create(&file, false, Some("too long")).await.unwrap();
        assert_eq!(
            storage.read(&file).await.unwrap_err().kind,
            FaultKind::TooLarge
        );
    }

    #[tokio::test]
    async fn test_escape_is_validation_fault() {
        let (_dir, storage) = storage(4);
        assert_eq!(
            storage.resolve("../../etc/passwd").unwrap_err().kind,
            FaultKind::Validation
        );
    }

    #[tokio::test]
    async fn test_upload_commit_and_discard() {
        let (_dir, storage) = storage(1024);
        let destination = storage.resolve("up/load.bin").unwrap();

        let mut upload = storage.begin_upload(&destination).await.unwrap();
        upload.file_mut().write_all(b"partial").await.unwrap();
        upload.discard().await;
        assert!(!destination.exists());
        assert!(ops::list_dir(destination.parent().unwrap())
            .await
            .unwrap()
            .is_empty());

        let mut upload = storage.begin_upload(&destination).await.unwrap();
        upload.file_mut().write_all(b"complete").await.unwrap();
        upload.commit().await.unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"complete");
    }

    #[tokio::test]
    async fn test_interleaved_uploads_to_one_destination() {
        let (_dir, storage) = storage(1024);
        let destination = storage.resolve("shared.bin").unwrap();

        let mut first = storage.begin_upload(&destination).await.unwrap();
        let mut second = storage.begin_upload(&destination).await.unwrap();
        first.file_mut().write_all(&[1u8; 10]).await.unwrap();
        second.file_mut().write_all(&[2u8; 25]).await.unwrap();

        first.commit().await.unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), vec![1u8; 10]);

        second.file_mut().write_all(&[2u8; 5]).await.unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), vec![1u8; 10]);
        second.commit().await.unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), vec![2u8; 30]);
        assert_eq!(
            storage.list(storage.root()).await.unwrap(),
            vec![FileEntry::file("shared.bin", 30)]
        );
    }

    #[tokio::test]
    async fn test_download_of_directory_refused() {
        let (_dir, storage) = storage(1024);
        let root = storage.resolve("/").unwrap();
        assert_eq!(
            storage.open_download(&root).await.unwrap_err().kind,
            FaultKind::IsADirectory
        );
    }
}
