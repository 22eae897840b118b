// Copyright 2026 Aggregator Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The Reference Watcher (§4.3): a weak-reference cache keyed by integer id that
//! resolves the cyclic containment between an aggregator, its services and the
//! subservice listeners each service hands out to inferior networks. Without this
//! indirection the natural ownership graph (aggregator -> service -> listener ->
//! aggregator) would keep everything alive forever.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};

/// Wraps a cached value with a cleanup hook run exactly once, when the last strong
/// reference is dropped.
pub struct Watched<T> {
    value: T,
    cleanup: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl<T> Watched<T> {
    fn new(value: T, cleanup: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            value,
            cleanup: Mutex::new(Some(cleanup)),
        }
    }
}

impl<T> std::ops::Deref for Watched<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> Drop for Watched<T> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.lock().unwrap().take() {
            cleanup();
        }
    }
}

type Cleanup = Box<dyn FnOnce() + Send>;

type Recoverer<'a, T> =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Option<(T, Cleanup)>> + Send + 'a>> + Send + 'a>;

/// A cache of `Arc<Watched<T>>` keyed by `i64`, holding only [`Weak`] entries. A value
/// stays reachable exactly as long as something outside the watcher holds its `Arc`;
/// once the last one drops, the next lookup for that id finds a dead weak reference
/// and treats it as a miss (§4.3, "cleanup-on-last-release").
pub struct ReferenceWatcher<T> {
    entries: Mutex<HashMap<i64, Weak<Watched<T>>>>,
}

impl<T> Default for ReferenceWatcher<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Send + Sync + 'static> ReferenceWatcher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live entry for `id` without recovering it, i.e. without
    /// constructing a new value on a cache miss. Used by callers that only want to
    /// observe what's already resident, rather than pull a fresh one in (approximates
    /// "without extending the external lifetime").
    pub fn live(&self, id: i64) -> Option<Arc<Watched<T>>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(&id).and_then(Weak::upgrade) {
            Some(arc) => Some(arc),
            None => {
                entries.remove(&id);
                None
            }
        }
    }

    /// Returns the cached entry for `id`, recovering it via `recover` on a miss (or on
    /// finding a stale weak slot whose value has already been dropped). `recover`
    /// hands back both the value and the cleanup hook to run when the returned
    /// handle's last strong reference drops.
    pub async fn get<'a>(&self, id: i64, recover: Recoverer<'a, T>) -> Option<Arc<Watched<T>>> {
        if let Some(existing) = self.live(id) {
            return Some(existing);
        }

        let (value, cleanup) = recover().await?;
        let mut entries = self.entries.lock().unwrap();
        // Another task may have raced us to recovery; prefer whichever is already
        // resident so callers observe a single logical instance per id.
        if let Some(existing) = entries.get(&id).and_then(Weak::upgrade) {
            return Some(existing);
        }
        let arc = Arc::new(Watched::new(value, cleanup));
        entries.insert(id, Arc::downgrade(&arc));
        Some(arc)
    }

    /// Inserts an already-constructed value with no cleanup hook, replacing any
    /// existing entry for `id`.
    pub fn insert(&self, id: i64, value: T) -> Arc<Watched<T>> {
        self.insert_with_cleanup(id, value, Box::new(|| {}))
    }

    /// Inserts an already-constructed value, running `cleanup` once the returned
    /// handle's last strong reference drops, replacing any existing entry for `id`.
    pub fn insert_with_cleanup(&self, id: i64, value: T, cleanup: Cleanup) -> Arc<Watched<T>> {
        let arc = Arc::new(Watched::new(value, cleanup));
        self.entries.lock().unwrap().insert(id, Arc::downgrade(&arc));
        arc
    }

    /// Drops the weak slot for `id` immediately, without waiting for the strong
    /// reference count to reach zero. Used when a row is deleted out from under a
    /// still-live handle (e.g. `removeTrunk`) so a subsequent lookup never resurrects
    /// stale state.
    pub fn forget(&self, id: i64) {
        self.entries.lock().unwrap().remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recovers_on_miss_and_caches_hit() {
        let watcher: ReferenceWatcher<i64> = ReferenceWatcher::new();
        let calls = Arc::new(Mutex::new(0));

        let calls_clone = calls.clone();
        let first = watcher
            .get(
                1,
                Box::new(move || {
                    *calls_clone.lock().unwrap() += 1;
                    Box::pin(async { Some((42, Box::new(|| {}) as Box<dyn FnOnce() + Send>)) })
                }),
            )
            .await
            .unwrap();
        assert_eq!(*first, 42);
        assert_eq!(*calls.lock().unwrap(), 1);

        let calls_clone = calls.clone();
        let second = watcher
            .get(
                1,
                Box::new(move || {
                    *calls_clone.lock().unwrap() += 1;
                    Box::pin(async { Some((42, Box::new(|| {}) as Box<dyn FnOnce() + Send>)) })
                }),
            )
            .await
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), 1, "second get must hit the cache");
        drop(first);
        drop(second);
    }

    #[tokio::test]
    async fn cleanup_runs_exactly_once_on_last_drop() {
        let watcher: ReferenceWatcher<i64> = ReferenceWatcher::new();
        let cleaned = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let cleaned_clone = cleaned.clone();

        let handle = watcher.insert_with_cleanup(
            1,
            7,
            Box::new(move || {
                cleaned_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }),
        );
        let second = watcher.live(1).unwrap();
        assert_eq!(cleaned.load(std::sync::atomic::Ordering::SeqCst), 0);

        drop(handle);
        assert_eq!(cleaned.load(std::sync::atomic::Ordering::SeqCst), 0, "a second strong reference is still live");
        drop(second);
        assert_eq!(cleaned.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drop_evicts_via_lazy_pruning() {
        let watcher: ReferenceWatcher<i64> = ReferenceWatcher::new();
        let handle = watcher.insert(7, 100);
        assert!(watcher.live(7).is_some());
        drop(handle);
        assert!(watcher.live(7).is_none());
    }

    #[tokio::test]
    async fn forget_evicts_immediately() {
        let watcher: ReferenceWatcher<i64> = ReferenceWatcher::new();
        let handle = watcher.insert(3, 9);
        watcher.forget(3);
        assert!(watcher.live(3).is_none());
        drop(handle);
    }
}
