// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use crate::observability::metrics;
use crate::storage::common::validate_state_id;
use crate::storage::{StateStore, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Partially written files live here until they are complete.
const TEMP_DIR: &str = ".tmp";

/// Filesystem-backed store. Each state is a single file under `root`, named
/// by its id and holding the raw state bytes.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    sync_writes: bool,
}

impl FileStore {
    /// Create the store, creating `root` if it does not exist yet.
    pub async fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(TEMP_DIR))
            .await
            .map_err(|e| StorageError::Internal(format!("init states dir {:?}: {}", root, e)))?;
        Ok(Self {
            root,
            sync_writes: false,
        })
    }

    /// Also fsync every write before reporting success.
    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn state_path(&self, id: &str) -> Result<PathBuf, StorageError> {
        validate_state_id(id)?;
        Ok(self.root.join(id))
    }

    /// Write `data` to a fresh file under the temp directory. Nothing under
    /// `root` proper changes until the caller renames or links it into place.
    async fn write_temp(&self, id: &str, data: &[u8]) -> std::io::Result<PathBuf> {
        let tmp = self
            .root
            .join(TEMP_DIR)
            .join(format!("{}.{:016x}", id, rand::random::<u64>()));
        let result: std::io::Result<()> = async {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp)
                .await?;
            file.write_all(data).await?;
            file.flush().await?;
            if self.sync_writes {
                file.sync_data().await?;
            }
            Ok(())
        }
        .await;
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(tmp)
    }
}

#[async_trait]
impl StateStore for FileStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn create_if_absent(&self, id: &str, data: &[u8]) -> Result<bool, StorageError> {
        let path = self.state_path(id)?;
        let start = Instant::now();
        let tmp = self
            .write_temp(id, data)
            .await
            .map_err(|e| StorageError::Internal(format!("create {:?}: {}", path, e)))?;
        // A hard link fails if the target exists, so creation never clobbers.
        let result = match fs::hard_link(&tmp, &path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StorageError::Internal(format!("create {:?}: {}", path, e))),
        };
        let _ = fs::remove_file(&tmp).await;
        metrics::record_storage_op("create", self.backend(), start.elapsed().as_secs_f64());
        result
    }

    async fn overwrite(&self, id: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.state_path(id)?;
        let start = Instant::now();
        let result = match self.write_temp(id, data).await {
            Ok(tmp) => match fs::rename(&tmp, &path).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    let _ = fs::remove_file(&tmp).await;
                    Err(e)
                }
            },
            Err(e) => Err(e),
        }
        .map_err(|e| StorageError::Internal(format!("write {:?}: {}", path, e)));
        metrics::record_storage_op("overwrite", self.backend(), start.elapsed().as_secs_f64());
        result
    }

    async fn load(&self, id: &str) -> Result<Option<Bytes>, StorageError> {
        let path = self.state_path(id)?;
        let start = Instant::now();
        let result = match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Internal(format!("read {:?}: {}", path, e))),
        };
        metrics::record_storage_op("load", self.backend(), start.elapsed().as_secs_f64());
        result
    }

    async fn check(&self) -> Result<(), StorageError> {
        let meta = fs::metadata(&self.root)
            .await
            .map_err(|e| StorageError::Internal(format!("stat {:?}: {}", self.root, e)))?;
        if !meta.is_dir() {
            return Err(StorageError::Internal(format!(
                "{:?} is not a directory",
                self.root
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ID: &str = "deadbeef00deadbeef00";

    #[tokio::test]
    async fn test_create_if_absent_writes_once() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("states")).await.unwrap();

        assert!(store.create_if_absent(ID, b"a1b1").await.unwrap());
        assert!(!store.create_if_absent(ID, b"zzzz").await.unwrap());

        let on_disk = std::fs::read(dir.path().join("states").join(ID)).unwrap();
        assert_eq!(on_disk, b"a1b1");
    }

    #[tokio::test]
    async fn test_overwrite_replaces_contents() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap().with_sync_writes(true);

        store.create_if_absent(ID, b"a1b1c2d3").await.unwrap();
        store.overwrite(ID, b"a1").await.unwrap();

        let data = store.load(ID).await.unwrap().unwrap();
        assert_eq!(&data[..], b"a1");
    }

    #[tokio::test]
    async fn test_writes_leave_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();

        store.create_if_absent(ID, b"a1").await.unwrap();
        assert!(!store.create_if_absent(ID, b"b1").await.unwrap());
        store.overwrite(ID, b"a1b2").await.unwrap();

        let leftovers = std::fs::read_dir(dir.path().join(TEMP_DIR)).unwrap().count();
        assert_eq!(leftovers, 0);
        assert_eq!(std::fs::read(dir.path().join(ID)).unwrap(), b"a1b2");
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        assert!(store.load(ID).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_malformed_ids() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();

        let err = store.create_if_absent("../escape", b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
        assert!(store.load("ABCDEF").await.is_err());
    }

    #[tokio::test]
    async fn test_check_fails_when_root_removed() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("states");
        let store = FileStore::new(&root).await.unwrap();
        assert!(store.check().await.is_ok());

        std::fs::remove_dir_all(&root).unwrap();
        assert!(store.check().await.is_err());
    }
}
