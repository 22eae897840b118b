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

//! The Event Dispatcher (§4.6): a per-service FIFO queue of boxed futures, drained by
//! a single spawned task, guaranteeing that callbacks originating from the same
//! producer are delivered in submission order and never concurrently with each
//! other. Cross-subscriber ordering is deliberately left unspecified.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;

type BoxedJob = Box<dyn FnOnce() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send>;

/// A single sequenced executor. One instance is created per service the first time
/// it needs to notify a listener; it outlives the service only until its queue is
/// dropped (`Dispatcher::shutdown`), at which point the drain task exits.
pub struct Dispatcher {
    tx: UnboundedSender<BoxedJob>,
    drain: JoinHandle<()>,
}

impl Dispatcher {
    pub fn spawn() -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<BoxedJob>();
        let drain = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job().await;
            }
        });
        Arc::new(Self { tx, drain })
    }

    /// Enqueues a void-returning callback. Submissions from the same caller are run
    /// in the order they were submitted and never overlap with each other; only
    /// relative ordering across distinct `Dispatcher` instances is unspecified.
    pub fn dispatch<F, Fut>(&self, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        // A closed receiver means the dispatcher has been shut down; dropping the job
        // silently is correct since there is nobody left to observe the callback.
        let _ = self.tx.send(Box::new(move || Box::pin(job())));
    }

    pub fn shutdown(&self) {
        self.drain.abort();
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.drain.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn preserves_submission_order() {
        let dispatcher = Dispatcher::spawn();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..10 {
            let seen = seen.clone();
            dispatcher.dispatch(move || async move {
                seen.lock().unwrap().push(i);
            });
        }
        // give the drain task a chance to run everything
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn never_runs_two_jobs_concurrently() {
        let dispatcher = Dispatcher::spawn();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            dispatcher.dispatch(move || async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
