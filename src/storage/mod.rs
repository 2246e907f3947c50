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

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub mod common;
pub mod file_store;
pub mod in_memory;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Durable id -> bytes mapping backing the state cache.
///
/// Callers serialize writes by holding the cache lock, so implementations
/// need no per-record locking.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Short backend name used in logs and metric labels.
    fn backend(&self) -> &'static str;

    /// Write a new record. Returns `Ok(false)` without touching anything if a
    /// record for `id` already exists.
    async fn create_if_absent(&self, id: &str, data: &[u8]) -> Result<bool, StorageError>;

    async fn overwrite(&self, id: &str, data: &[u8]) -> Result<(), StorageError>;

    async fn load(&self, id: &str) -> Result<Option<Bytes>, StorageError>;

    /// Readiness probe.
    async fn check(&self) -> Result<(), StorageError>;
}
