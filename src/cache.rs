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

//! Resident copy of every state touched since startup.
//!
//! One mutex guards the whole map. Each [`State`] carries a [`Notify`] that is
//! only registered on and signalled while that mutex is held, which makes the
//! pair a monitor: [`CacheGuard::wait_for_change`] releases the lock while
//! suspended and reacquires it before returning.
//!
//! Entries are never evicted; memory grows with the number of states read or
//! written over the life of the process.

use crate::etag::compute_etag;
use crate::observability::metrics;
use crate::storage::{StateStore, StorageError};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard, Notify};

#[derive(Debug)]
pub struct State {
    id: String,
    data: Bytes,
    etag: String,
    changed: Arc<Notify>,
}

impl State {
    pub(crate) fn new(id: String, data: Bytes) -> Self {
        let etag = compute_etag(&data);
        Self {
            id,
            data,
            etag,
            changed: Arc::new(Notify::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// Replace the data and wake every waiter. Returns false and wakes nobody
    /// when `data` equals the current data.
    pub fn update(&mut self, data: Bytes) -> bool {
        if data == self.data {
            return false;
        }
        self.data = data;
        self.etag = compute_etag(&self.data);
        self.changed.notify_waiters();
        true
    }
}

pub struct StateCache {
    states: Mutex<HashMap<String, State>>,
    store: Arc<dyn StateStore>,
}

impl StateCache {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Acquire the process-wide lock.
    pub async fn lock(&self) -> CacheGuard<'_> {
        let start = Instant::now();
        let states = self.states.lock().await;
        metrics::record_lock_wait(start.elapsed().as_secs_f64());
        CacheGuard { states, cache: self }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }
}

/// Proof that the cache lock is held. Every read or write of state data goes
/// through one of these.
pub struct CacheGuard<'a> {
    states: MutexGuard<'a, HashMap<String, State>>,
    cache: &'a StateCache,
}

impl<'a> CacheGuard<'a> {
    /// The resident state for `id`, loading it from the store on first use.
    /// `Ok(None)` when the store has no such record.
    pub async fn get_or_load(&mut self, id: &str) -> Result<Option<&mut State>, StorageError> {
        if !self.states.contains_key(id) {
            let Some(data) = self.cache.store.load(id).await? else {
                return Ok(None);
            };
            tracing::debug!(state_id = %id, bytes = data.len(), "loaded state from store");
            self.states.insert(id.to_string(), State::new(id.to_string(), data));
            metrics::set_cached_states(self.states.len());
        }
        Ok(self.states.get_mut(id))
    }

    /// The resident state for `id`, without touching the store.
    pub fn get(&self, id: &str) -> Option<&State> {
        self.states.get(id)
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.cache.store
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Release the lock until `id` is updated or `timeout` elapses, then
    /// reacquire it. Returns immediately if `id` is not resident.
    ///
    /// A wake-up does not guarantee the data changed; re-check the etag.
    pub async fn wait_for_change(self, id: &str, timeout: Duration) -> CacheGuard<'a> {
        let changed = self.states.get(id).map(|s| s.changed.clone());
        let Some(changed) = changed else {
            return self;
        };
        let notified = changed.notified();
        tokio::pin!(notified);
        // Register before unlocking so an update between here and the await
        // is not missed.
        notified.as_mut().enable();

        let cache = self.cache;
        drop(self);
        if tokio::time::timeout(timeout, notified).await.is_err() {
            tracing::trace!(state_id = %id, "wait timed out");
        }
        cache.lock().await
    }
}
