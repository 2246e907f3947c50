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

use crate::cache::StateCache;
use crate::observability::metrics;
use crate::storage::common::generate_state_id;
use crate::storage::{StateStore, StorageError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How long a read whose `If-None-Match` is current waits for an update.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(100);

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state not found: {0}")]
    NotFound(String),
    #[error("etag mismatch for {id}: expected {expected}, current {current}")]
    PreconditionFailed {
        id: String,
        expected: String,
        current: String,
    },
    #[error("could not create state {0}: id already taken")]
    IdTaken(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Current { data: Bytes, etag: String },
    /// The caller's etag is still current after the poll window.
    NotModified,
}

/// Server-wide context: the state cache (with its store) and request
/// settings. One instance per server; cheap to clone.
#[derive(Clone)]
pub struct BaseHandler {
    pub cache: Arc<StateCache>,
    pub poll_timeout: Duration,
}

impl BaseHandler {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            cache: Arc::new(StateCache::new(store)),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        self.cache.store()
    }

    /// Store `data` under a fresh id and return the id. The state is not
    /// cached until first read or written.
    pub async fn create_state(&self, data: Bytes) -> Result<String, StateError> {
        let id = generate_state_id();
        let guard = self.cache.lock().await;
        if !guard.store().create_if_absent(&id, &data).await? {
            return Err(StateError::IdTaken(id));
        }
        drop(guard);
        tracing::info!(state_id = %id, bytes = data.len(), "created state");
        Ok(id)
    }

    /// Current data and etag of `id`. If `if_none_match` equals the current
    /// etag, first wait up to the poll timeout for an update.
    pub async fn read_state(
        &self,
        id: &str,
        if_none_match: Option<&str>,
    ) -> Result<ReadOutcome, StateError> {
        let mut guard = self.cache.lock().await;
        let etag = match guard.get_or_load(id).await? {
            Some(state) => state.etag().to_string(),
            None => return Err(StateError::NotFound(id.to_string())),
        };

        if if_none_match == Some(etag.as_str()) {
            tracing::debug!(state_id = %id, %etag, "waiting for change");
            guard = guard.wait_for_change(id, self.poll_timeout).await;
        }

        let state = guard
            .get(id)
            .ok_or_else(|| StateError::NotFound(id.to_string()))?;
        if let Some(known) = if_none_match {
            if known == etag {
                let outcome = if state.etag() == known { "timeout" } else { "changed" };
                metrics::increment_long_poll(outcome);
            }
            if state.etag() == known {
                return Ok(ReadOutcome::NotModified);
            }
        }
        Ok(ReadOutcome::Current {
            data: state.data().clone(),
            etag: state.etag().to_string(),
        })
    }

    /// Replace the data of `id` if its current etag is `expected_etag`.
    ///
    /// The new data is persisted before the cached copy changes, so a failed
    /// write leaves both untouched and wakes nobody. Returns whether the data
    /// actually changed; writing identical data succeeds without persisting.
    ///
    /// The swap runs on its own task. Dropping the returned future (a client
    /// hanging up) does not stop it halfway between disk and cache.
    pub async fn compare_and_swap(
        &self,
        id: &str,
        expected_etag: &str,
        data: Bytes,
    ) -> Result<bool, StateError> {
        let cache = self.cache.clone();
        let id = id.to_string();
        let expected_etag = expected_etag.to_string();
        tokio::spawn(async move { swap_locked(&cache, &id, &expected_etag, data).await })
            .await
            .map_err(|e| StorageError::Internal(format!("write task failed: {e}")))?
    }
}

async fn swap_locked(
    cache: &StateCache,
    id: &str,
    expected_etag: &str,
    data: Bytes,
) -> Result<bool, StateError> {
    let mut guard = cache.lock().await;
    let store = guard.store().clone();
    let state = guard
        .get_or_load(id)
        .await?
        .ok_or_else(|| StateError::NotFound(id.to_string()))?;

    if state.etag() != expected_etag {
        metrics::increment_cas_conflict();
        return Err(StateError::PreconditionFailed {
            id: id.to_string(),
            expected: expected_etag.to_string(),
            current: state.etag().to_string(),
        });
    }
    if state.data() == &data {
        return Ok(false);
    }

    store.overwrite(id, &data).await?;
    let changed = state.update(data);
    tracing::debug!(state_id = %id, etag = %state.etag(), "state updated");
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etag::compute_etag;
    use crate::storage::file_store::FileStore;
    use crate::storage::in_memory::InMemoryStore;

    fn handler() -> (BaseHandler, InMemoryStore) {
        let store = InMemoryStore::new();
        let handler = BaseHandler::new(Arc::new(store.clone()))
            .with_poll_timeout(Duration::from_millis(100));
        (handler, store)
    }

    fn current(outcome: ReadOutcome) -> (Bytes, String) {
        match outcome {
            ReadOutcome::Current { data, etag } => (data, etag),
            ReadOutcome::NotModified => panic!("expected current data"),
        }
    }

    #[tokio::test]
    async fn test_create_then_read() {
        let (handler, store) = handler();
        let id = handler.create_state(Bytes::from_static(b"a1b1")).await.unwrap();
        assert_eq!(store.len().await, 1);

        let (data, etag) = current(handler.read_state(&id, None).await.unwrap());
        assert_eq!(&data[..], b"a1b1");
        assert_eq!(etag, compute_etag(b"a1b1"));
    }

    #[tokio::test]
    async fn test_create_fails_when_store_fails() {
        let (handler, store) = handler();
        store.set_fail_writes(true);
        let err = handler.create_state(Bytes::from_static(b"a1")).await.unwrap_err();
        assert!(matches!(err, StateError::Storage(_)));
    }

    #[tokio::test]
    async fn test_read_unknown_state() {
        let (handler, _) = handler();
        let err = handler.read_state("00000000000000000000", None).await.unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_read_with_stale_etag_returns_immediately() {
        let (handler, _) = handler();
        let handler = handler.with_poll_timeout(Duration::from_secs(60));
        let id = handler.create_state(Bytes::from_static(b"a1")).await.unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            handler.read_state(&id, Some("\"00000000000000000000\"")),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(&current(outcome).0[..], b"a1");
    }

    #[tokio::test]
    async fn test_read_with_current_etag_times_out() {
        let (handler, _) = handler();
        let id = handler.create_state(Bytes::from_static(b"a1")).await.unwrap();
        let etag = compute_etag(b"a1");

        let outcome = handler.read_state(&id, Some(&etag)).await.unwrap();
        assert_eq!(outcome, ReadOutcome::NotModified);
    }

    #[tokio::test]
    async fn test_cas_success_and_conflict() {
        let (handler, store) = handler();
        let id = handler.create_state(Bytes::from_static(b"a1")).await.unwrap();
        let x = compute_etag(b"a1");

        assert!(handler
            .compare_and_swap(&id, &x, Bytes::from_static(b"a1b2"))
            .await
            .unwrap());
        assert_eq!(&store.load(&id).await.unwrap().unwrap()[..], b"a1b2");

        let err = handler
            .compare_and_swap(&id, &x, Bytes::from_static(b"a1c3"))
            .await
            .unwrap_err();
        match err {
            StateError::PreconditionFailed { current, .. } => {
                assert_eq!(current, compute_etag(b"a1b2"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(&store.load(&id).await.unwrap().unwrap()[..], b"a1b2");
    }

    #[tokio::test]
    async fn test_cas_same_data_skips_persistence() {
        let (handler, store) = handler();
        let id = handler.create_state(Bytes::from_static(b"a1")).await.unwrap();
        store.set_fail_writes(true);

        let changed = handler
            .compare_and_swap(&id, &compute_etag(b"a1"), Bytes::from_static(b"a1"))
            .await
            .unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn test_cas_storage_failure_leaves_state_untouched() {
        let (handler, store) = handler();
        let id = handler.create_state(Bytes::from_static(b"a1")).await.unwrap();
        let x = compute_etag(b"a1");
        store.set_fail_writes(true);

        let err = handler
            .compare_and_swap(&id, &x, Bytes::from_static(b"a1b2"))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::Storage(_)));

        let (data, etag) = current(handler.read_state(&id, None).await.unwrap());
        assert_eq!(&data[..], b"a1");
        assert_eq!(etag, x);
    }

    #[tokio::test]
    async fn test_racing_writers_exactly_one_wins() {
        let (handler, _) = handler();
        let id = handler.create_state(Bytes::from_static(b"a1")).await.unwrap();
        let x = compute_etag(b"a1");

        let mut tasks = Vec::new();
        for i in 0..8 {
            let handler = handler.clone();
            let id = id.clone();
            let x = x.clone();
            tasks.push(tokio::spawn(async move {
                let data = Bytes::from(format!("a1b{i}"));
                handler.compare_and_swap(&id, &x, data.clone()).await.map(|_| data)
            }));
        }

        let mut winners = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(data) => winners.push(data),
                Err(StateError::PreconditionFailed { .. }) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(winners.len(), 1);

        let (data, _) = current(handler.read_state(&id, None).await.unwrap());
        assert_eq!(data, winners[0]);
    }

    #[tokio::test]
    async fn test_cancelled_cas_keeps_disk_and_cache_in_sync() {
        let dir = tempfile::tempdir().unwrap();
        let handler = BaseHandler::new(Arc::new(FileStore::new(dir.path()).await.unwrap()));
        let id = handler.create_state(Bytes::from_static(b"a1")).await.unwrap();

        for i in 0..300u64 {
            let (_, etag) = current(handler.read_state(&id, None).await.unwrap());
            let next = Bytes::from(format!("a1b{i}"));
            let _ = tokio::time::timeout(
                Duration::from_micros(i % 60),
                handler.compare_and_swap(&id, &etag, next),
            )
            .await;

            // Holding the lock means no swap is mid-flight.
            let guard = handler.cache.lock().await;
            let cached = guard.get(&id).unwrap().data().clone();
            let on_disk = guard.store().load(&id).await.unwrap().unwrap();
            assert_eq!(on_disk, cached, "iteration {i}");
        }
    }
}
