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

//! Adapter between one subservice and its owning [`super::ServiceStateMachine`].
//!
//! A `Client` wraps the `InferiorService` handle plus the bookkeeping the state
//! machine needs per subservice (its last reported status). Status reports arrive on
//! whatever thread the inferior network calls back on; the `Client` tags each one
//! with its own subservice id and forwards it through an unbounded channel into the
//! owning service's dispatch loop, rather than holding a back-reference to the
//! service itself -- this sidesteps the aggregator/service/listener reference cycle
//! the Reference Watcher exists to break, without needing the watcher on this
//! particular edge.

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::AggResult;
use crate::inferior::{InferiorService, ServiceListener, SubRequest};
use crate::service::status::ServiceStatus;

/// One status report from a subservice, tagged with which one sent it.
#[derive(Debug, Clone, Copy)]
pub struct ClientEvent {
    pub subservice_id: i64,
    pub status: ServiceStatus,
}

/// Sentinel stored in `listener_id` before `subscribe` has registered anything.
const NO_LISTENER: i64 = -1;

pub struct Client {
    subservice_id: i64,
    inner: Arc<dyn InferiorService>,
    last_status: AtomicU8,
    /// The id `inner.add_listener` returned, or [`NO_LISTENER`] before `subscribe`
    /// has run. Stored so `unsubscribe` can later tell the subservice exactly which
    /// registration to drop (§4.2/§9, "remove the service's listeners from its
    /// subservices" on last release).
    listener_id: AtomicI64,
    events: UnboundedSender<ClientEvent>,
}

impl Client {
    pub fn new(
        subservice_id: i64,
        inner: Arc<dyn InferiorService>,
        events: UnboundedSender<ClientEvent>,
    ) -> Self {
        Self {
            subservice_id,
            inner,
            last_status: AtomicU8::new(status_to_u8(ServiceStatus::Dormant)),
            listener_id: AtomicI64::new(NO_LISTENER),
            events,
        }
    }

    pub fn subservice_id(&self) -> i64 {
        self.subservice_id
    }

    pub fn last_status(&self) -> ServiceStatus {
        u8_to_status(self.last_status.load(Ordering::Acquire))
    }

    pub async fn define(&self, request: &[SubRequest]) -> AggResult<()> {
        self.inner.define(request).await
    }

    pub async fn activate(&self) -> AggResult<()> {
        self.inner.activate().await
    }

    pub async fn deactivate(&self) -> AggResult<()> {
        self.inner.deactivate().await
    }

    pub async fn release(&self) -> AggResult<()> {
        self.inner.release().await
    }

    /// Installs this client as a listener on its subservice. Must be called once,
    /// after construction, before any of the state-changing methods above are used.
    pub async fn subscribe(self: &Arc<Self>) -> AggResult<()> {
        let listener_id = self
            .inner
            .add_listener(self.clone() as Arc<dyn ServiceListener>)
            .await?;
        self.listener_id.store(listener_id as i64, Ordering::Release);
        Ok(())
    }

    /// Drops this client's listener registration on its subservice, if one was ever
    /// installed. A no-op if `subscribe` was never called.
    pub async fn unsubscribe(&self) -> AggResult<()> {
        let id = self.listener_id.load(Ordering::Acquire);
        if id == NO_LISTENER {
            return Ok(());
        }
        self.inner.remove_listener(id as u64).await
    }
}

#[async_trait]
impl ServiceListener for Client {
    async fn new_status(&self, status: ServiceStatus) {
        self.last_status.store(status_to_u8(status), Ordering::Release);
        let _ = self.events.send(ClientEvent {
            subservice_id: self.subservice_id,
            status,
        });
    }
}

fn status_to_u8(status: ServiceStatus) -> u8 {
    match status {
        ServiceStatus::Dormant => 0,
        ServiceStatus::Establishing => 1,
        ServiceStatus::Inactive => 2,
        ServiceStatus::Activating => 3,
        ServiceStatus::Active => 4,
        ServiceStatus::Deactivating => 5,
        ServiceStatus::Failed => 6,
        ServiceStatus::Releasing => 7,
        ServiceStatus::Released => 8,
    }
}

fn u8_to_status(v: u8) -> ServiceStatus {
    match v {
        0 => ServiceStatus::Dormant,
        1 => ServiceStatus::Establishing,
        2 => ServiceStatus::Inactive,
        3 => ServiceStatus::Activating,
        4 => ServiceStatus::Active,
        5 => ServiceStatus::Deactivating,
        6 => ServiceStatus::Failed,
        7 => ServiceStatus::Releasing,
        _ => ServiceStatus::Released,
    }
}
