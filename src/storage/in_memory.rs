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

use crate::storage::common::validate_state_id;
use crate::storage::{StateStore, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory store. Nothing survives the process; used by tests and the
/// `in-memory` backend.
///
/// Writes can be made to fail on demand to exercise storage error paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    records: Arc<RwLock<BTreeMap<String, Bytes>>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent create/overwrite fail with an internal error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Internal("writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create_if_absent(&self, id: &str, data: &[u8]) -> Result<bool, StorageError> {
        validate_state_id(id)?;
        self.check_writable()?;
        let mut records = self.records.write().await;
        if records.contains_key(id) {
            return Ok(false);
        }
        records.insert(id.to_string(), Bytes::copy_from_slice(data));
        Ok(true)
    }

    async fn overwrite(&self, id: &str, data: &[u8]) -> Result<(), StorageError> {
        validate_state_id(id)?;
        self.check_writable()?;
        self.records
            .write()
            .await
            .insert(id.to_string(), Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Bytes>, StorageError> {
        validate_state_id(id)?;
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
