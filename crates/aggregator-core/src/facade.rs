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

//! The Aggregator Facade (§4.7): terminal/trunk CRUD, the service factory, and the
//! read-side distance model. Every method performs a single DB transaction unless
//! stated otherwise.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::instrument;

use crate::error::AggResult;
use crate::model::{ServiceId, SubterminalRef, TerminalId, TerminalRow, TrunkId};
use crate::persistence::{terminals, trunks, Gateway};
use crate::planner::fib_distance_model;
use crate::service::ServiceStateMachine;
use crate::trunk::TrunkHandle;
use crate::watcher::{ReferenceWatcher, Watched};

/// Top-level entry point. Owns the Gateway, the per-Aggregator monitor (§5), and the
/// Reference Watcher caching live `ServiceStateMachine`s by id.
pub struct Aggregator {
    gateway: Gateway,
    name: String,
    aggregator_lock: Mutex<()>,
    services: ReferenceWatcher<ServiceStateMachine>,
}

impl Aggregator {
    pub async fn open(gateway: Gateway, name: impl Into<String>) -> AggResult<Self> {
        gateway.bootstrap().await?;
        Ok(Self {
            gateway,
            name: name.into(),
            aggregator_lock: Mutex::new(()),
            services: ReferenceWatcher::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self))]
    pub async fn add_terminal(&self, name: &str, subterminal: SubterminalRef) -> AggResult<TerminalId> {
        crate::lock_order::assert_no_service_lock_held();
        let _guard = self.aggregator_lock.lock().await;
        let mut tx = self.gateway.begin().await?;
        let id = terminals::insert(&mut tx, self.gateway.names(), name, &subterminal.network, &subterminal.name)
            .await?;
        tx.commit().await?;
        Ok(id)
    }

    #[instrument(skip(self))]
    pub async fn remove_terminal(&self, terminal_id: TerminalId) -> AggResult<()> {
        crate::lock_order::assert_no_service_lock_held();
        let _guard = self.aggregator_lock.lock().await;
        let mut tx = self.gateway.begin().await?;
        terminals::remove(&mut tx, self.gateway.names(), terminal_id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_terminal(&self, name: &str) -> AggResult<Option<TerminalRow>> {
        let mut tx = self.gateway.begin().await?;
        let row = terminals::get_by_name(&mut tx, self.gateway.names(), name).await?;
        tx.rollback().await?;
        Ok(row)
    }

    pub async fn get_terminals(&self) -> AggResult<Vec<TerminalRow>> {
        let mut tx = self.gateway.begin().await?;
        let rows = terminals::list(&mut tx, self.gateway.names()).await?;
        tx.rollback().await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn add_trunk(
        &self,
        start: SubterminalRef,
        end: SubterminalRef,
        up_cap: i64,
        down_cap: i64,
        metric: i64,
    ) -> AggResult<TrunkHandle> {
        crate::lock_order::assert_no_service_lock_held();
        let _guard = self.aggregator_lock.lock().await;
        let mut tx = self.gateway.begin().await?;
        let dbid = trunks::insert(&mut tx, self.gateway.names(), &start, &end, up_cap, down_cap, metric).await?;
        tx.commit().await?;
        Ok(TrunkHandle::new(self.gateway.clone(), dbid))
    }

    #[instrument(skip(self))]
    pub async fn remove_trunk(&self, dbid: TrunkId) -> AggResult<()> {
        crate::lock_order::assert_no_service_lock_held();
        let _guard = self.aggregator_lock.lock().await;
        let mut tx = self.gateway.begin().await?;
        trunks::remove(&mut tx, self.gateway.names(), dbid).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn find_trunk(&self, a: &SubterminalRef, b: &SubterminalRef) -> AggResult<Option<TrunkHandle>> {
        let mut tx = self.gateway.begin().await?;
        let row = trunks::find_by_endpoints(&mut tx, self.gateway.names(), a, b).await?;
        tx.rollback().await?;
        Ok(row.map(|row| TrunkHandle::new(self.gateway.clone(), row.dbid)))
    }

    pub fn trunk(&self, dbid: TrunkId) -> TrunkHandle {
        TrunkHandle::new(self.gateway.clone(), dbid)
    }

    #[instrument(skip(self))]
    pub async fn new_service(&self) -> AggResult<Arc<Watched<ServiceStateMachine>>> {
        crate::lock_order::assert_no_service_lock_held();
        let _guard = self.aggregator_lock.lock().await;
        let mut tx = self.gateway.begin().await?;
        let service_id =
            crate::persistence::services::insert(&mut tx, self.gateway.names(), crate::model::Intent::Inactive)
                .await?;
        tx.commit().await?;
        let machine = ServiceStateMachine::new(service_id, self.gateway.clone());
        Ok(self
            .services
            .insert_with_cleanup(service_id, machine.clone(), unsubscribe_cleanup(machine)))
    }

    /// Returns the live service for `id`, recovering it from persisted rows on a
    /// cache miss (§4.1, `recoverService`).
    pub async fn get_service(&self, id: ServiceId) -> AggResult<Option<Arc<Watched<ServiceStateMachine>>>> {
        let gateway = self.gateway.clone();
        Ok(self
            .services
            .get(
                id,
                Box::new(move || {
                    Box::pin(async move {
                        let machine = ServiceStateMachine::recover(id, gateway).await.ok()?;
                        let cleanup = unsubscribe_cleanup(machine.clone());
                        Some((machine, cleanup))
                    })
                }),
            )
            .await)
    }

    pub async fn get_service_ids(&self) -> AggResult<Vec<ServiceId>> {
        let mut tx = self.gateway.begin().await?;
        let ids = crate::persistence::services::list_ids(&mut tx, self.gateway.names()).await?;
        tx.rollback().await?;
        Ok(ids)
    }

    /// Pairwise minimum-delay edges between every pair of this aggregator's
    /// terminals that are mutually reachable with at least `min_bandwidth`,
    /// computed by running the Planner's graph construction and a pairwise FIB
    /// route; no allocation is performed (§4.7 `getModel`).
    pub async fn get_model(&self, min_bandwidth: i64) -> AggResult<BTreeMap<(TerminalId, TerminalId), i64>> {
        fib_distance_model(&self.gateway, min_bandwidth).await
    }

    /// Writes the diagnostic dump described in §4.7 to `out`. This crate never opens
    /// a file or socket itself.
    pub async fn dump_status(&self, out: &mut dyn Write) -> AggResult<()> {
        let mut tx = self.gateway.begin().await?;
        let terminals = terminals::list(&mut tx, self.gateway.names()).await?;
        let trunk_rows = trunks::list(&mut tx, self.gateway.names()).await?;
        let service_ids = crate::persistence::services::list_ids(&mut tx, self.gateway.names()).await?;
        tx.rollback().await?;

        for terminal in &terminals {
            writeln!(
                out,
                "terminal {} {} -> {}/{}",
                terminal.terminal_id, terminal.name, terminal.subnetwork_name, terminal.subname
            )
            .map_err(|e| crate::error::AggError::invalid_request(e.to_string()))?;
        }
        for trunk in &trunk_rows {
            let suffix = if trunk.commissioned { "" } else { " [decommissioned]" };
            writeln!(
                out,
                "trunk {} {}/{} <-> {}/{} up={} down={} metric={}{}",
                trunk.dbid,
                trunk.start_network,
                trunk.start_name,
                trunk.end_network,
                trunk.end_name,
                trunk.up_cap,
                trunk.down_cap,
                trunk.metric,
                suffix
            )
            .map_err(|e| crate::error::AggError::invalid_request(e.to_string()))?;
        }
        for service_id in &service_ids {
            if let Some(service) = self.get_service(*service_id).await? {
                let intent = service.intent().await;
                let status = service.status().await;
                let circuits = service.get_request().await.len();
                let subservices = {
                    let mut tx = self.gateway.begin().await?;
                    let rows = crate::persistence::services::list_subservices(&mut tx, self.gateway.names(), *service_id).await?;
                    tx.rollback().await?;
                    rows.len()
                };
                writeln!(
                    out,
                    "service {} intent={:?} status={} circuits={} subservices={}",
                    service_id, intent, status, circuits, subservices
                )
                .map_err(|e| crate::error::AggError::invalid_request(e.to_string()))?;
            }
        }
        Ok(())
    }
}

/// Builds the Reference Watcher cleanup hook run when a service's last external
/// handle drops: removes every one of its clients' listener registrations from
/// their subservices (§4.2/§9). Spawned rather than awaited inline since `Drop`
/// cannot itself be `async`.
fn unsubscribe_cleanup(machine: ServiceStateMachine) -> Box<dyn FnOnce() + Send> {
    Box::new(move || {
        tokio::spawn(async move { machine.unsubscribe_all().await });
    })
}
