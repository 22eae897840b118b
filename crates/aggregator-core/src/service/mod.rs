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

//! The Service State Machine (§4.5): per-service intent, subservice status
//! aggregation, and the user-driven lifecycle transitions.

pub mod client;
pub mod status;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::instrument;

pub use client::{Client, ClientEvent};
pub use status::ServiceStatus;

use crate::dispatch::Dispatcher;
use crate::error::{AggError, AggResult, IllegalState};
use crate::inferior::{CircuitDemand, InferiorNetwork, ServiceListener};
use crate::model::{Intent, ServiceId};
use crate::persistence::{labels, service_circuits, services, Gateway};
use crate::planner::Planner;
use crate::service::status::{observe, Counters};

/// Minimum fraction of ingress a circuit's egress must reach to survive request
/// sanitisation (1%, §4.5).
const MIN_EGRESS_RATIO: f64 = 0.01;

struct Inner {
    intent: Intent,
    initiated: bool,
    clients: Vec<Arc<Client>>,
    /// Last status reported by each still-attached subservice, by `subservice_id`.
    client_status: HashMap<i64, ServiceStatus>,
    counters: Counters,
    /// Subservices not yet confirmed fully released. Distinct from `counters.total`,
    /// which never shrinks -- this is what `observe`'s `clients == 0` check reads.
    remaining: usize,
    last_observed: Option<ServiceStatus>,
    errors: Vec<String>,
    listeners: Vec<Arc<dyn ServiceListener>>,
}

/// One service's persisted intent plus the in-memory aggregation of its
/// subservices' status. The `Inner` behind an `Arc<Mutex<_>>` (§5, "per-Service
/// monitor") rather than a bare `Mutex` so the background task that applies client
/// events (spawned from `define`) can hold its own handle without needing a
/// self-reference back into this struct.
#[derive(Clone)]
pub struct ServiceStateMachine {
    service_id: ServiceId,
    gateway: Gateway,
    dispatcher: Arc<Dispatcher>,
    inner: Arc<Mutex<Inner>>,
}

impl ServiceStateMachine {
    pub(crate) fn new(service_id: ServiceId, gateway: Gateway) -> Self {
        Self {
            service_id,
            gateway,
            dispatcher: Dispatcher::spawn(),
            inner: Arc::new(Mutex::new(Inner {
                intent: Intent::Inactive,
                initiated: false,
                clients: Vec::new(),
                client_status: HashMap::new(),
                counters: Counters::new(0),
                remaining: 0,
                last_observed: None,
                errors: Vec::new(),
                listeners: Vec::new(),
            })),
        }
    }

    /// Rehydrates a `ServiceStateMachine` for a service that already has persisted
    /// rows, restoring intent and the initiated flag but not re-subscribing
    /// subservice listeners -- callers recovering a whole aggregator are expected to
    /// re-wire clients themselves once inferior handles are available again (§4.1,
    /// `recoverService`).
    pub(crate) async fn recover(service_id: ServiceId, gateway: Gateway) -> AggResult<Self> {
        let mut tx = gateway.begin().await?;
        let row = services::get(&mut tx, gateway.names(), service_id)
            .await?
            .ok_or(crate::error::NotFound::UnknownService)?;
        let circuits = service_circuits::list_for_service(&mut tx, gateway.names(), service_id).await?;
        tx.rollback().await?;

        let machine = Self::new(service_id, gateway);
        {
            let _lock_order = crate::lock_order::enter_service_lock();
            let mut inner = machine.inner.lock().await;
            inner.intent = row.intent;
            inner.initiated = !circuits.is_empty();
        }
        Ok(machine)
    }

    pub fn id(&self) -> ServiceId {
        self.service_id
    }

    pub async fn status(&self) -> ServiceStatus {
        let _lock_order = crate::lock_order::enter_service_lock();
        let inner = self.inner.lock().await;
        observe(inner.intent, inner.initiated, inner.remaining, &inner.counters)
    }

    pub async fn intent(&self) -> Intent {
        let _lock_order = crate::lock_order::enter_service_lock();
        self.inner.lock().await.intent
    }

    pub async fn errors(&self) -> Vec<String> {
        let _lock_order = crate::lock_order::enter_service_lock();
        self.inner.lock().await.errors.clone()
    }

    pub async fn add_listener(&self, listener: Arc<dyn ServiceListener>) {
        let _lock_order = crate::lock_order::enter_service_lock();
        self.inner.lock().await.listeners.push(listener);
    }

    /// Drops every client's listener registration on its subservice. Run once, from
    /// the Reference Watcher's cleanup hook, when the last external reference to
    /// this machine is released (§4.2/§9).
    pub(crate) async fn unsubscribe_all(&self) {
        let clients = {
            let _lock_order = crate::lock_order::enter_service_lock();
            self.inner.lock().await.clients.clone()
        };
        for client in clients {
            if let Err(err) = client.unsubscribe().await {
                tracing::warn!(%err, "failed to unsubscribe a client during reference-watcher cleanup");
            }
        }
    }

    pub async fn get_request(&self) -> Vec<CircuitDemand> {
        let mut tx = match self.gateway.begin().await {
            Ok(tx) => tx,
            Err(_) => return Vec::new(),
        };
        let circuits = service_circuits::list_for_service(&mut tx, self.gateway.names(), self.service_id)
            .await
            .unwrap_or_default();
        let _ = tx.rollback().await;
        circuits
            .into_iter()
            .map(|row| CircuitDemand {
                circuit: crate::model::Circuit::new(row.terminal_id, row.label()),
                ingress: row.ingress,
                egress: row.shaping,
            })
            .collect()
    }

    /// Initiates the service: sanitises the request, plans it, persists the
    /// allocation, and wires a `Client` per resulting subservice (§4.5 `define`).
    #[instrument(skip(self, network, demands), fields(service_id = self.service_id))]
    pub async fn define(
        &self,
        network: &dyn InferiorNetwork,
        demands: Vec<CircuitDemand>,
    ) -> AggResult<()> {
        let _lock_order = crate::lock_order::enter_service_lock();
        let mut inner = self.inner.lock().await;
        if inner.intent == Intent::Release {
            return Err(IllegalState::ServiceReleased.into());
        }
        if inner.initiated {
            return Err(IllegalState::ServiceInUse.into());
        }

        let sanitised: Vec<CircuitDemand> = demands
            .into_iter()
            .filter(|d| (d.egress as f64) >= (d.ingress as f64) * MIN_EGRESS_RATIO)
            .collect();
        if sanitised.len() < 2 {
            return Err(AggError::invalid_request(
                "a service needs at least 2 surviving circuits",
            ));
        }

        let plan = Planner::new(&self.gateway).plan(&sanitised).await?;

        let mut tx = self.gateway.begin().await?;
        // Accumulated outside the block below so a failure partway through the
        // per-network loop still leaves every subservice created by an earlier,
        // successful iteration reachable for cleanup.
        let mut built: Vec<(Arc<Client>, Vec<crate::inferior::SubRequest>)> = Vec::new();
        let commit_result: AggResult<()> = async {
            for demand in &sanitised {
                service_circuits::insert(
                    &mut tx,
                    self.gateway.names(),
                    self.service_id,
                    demand.circuit.terminal,
                    demand.circuit.label as i64,
                    demand.ingress,
                    demand.egress,
                )
                .await?;
            }
            for &(trunk_dbid, up, down) in &plan.allocations {
                labels::allocate_tunnel(&mut tx, self.gateway.names(), trunk_dbid, self.service_id, up, down)
                    .await?;
            }

            for (idx, group) in plan.sub_requests.iter().enumerate() {
                let subservice_id = idx as i64;
                services::insert_subservice(
                    &mut tx,
                    self.gateway.names(),
                    self.service_id,
                    subservice_id,
                    &group.subnetwork_name,
                )
                .await?;

                let requests: Vec<crate::inferior::SubRequest> = group
                    .circuits
                    .iter()
                    .map(|(terminal_id, _subterminal, ingress, egress)| crate::inferior::SubRequest {
                        terminal: *terminal_id,
                        ingress: *ingress,
                        egress: *egress,
                    })
                    .collect();

                let handle = network.new_service().await?;
                let (events_tx, events_rx) = mpsc::unbounded_channel::<ClientEvent>();
                let client = Arc::new(Client::new(subservice_id, std::sync::Arc::from(handle), events_tx));
                client.subscribe().await?;
                self.spawn_event_loop(events_rx);
                built.push((client, requests));
            }
            Ok(())
        }
        .await;

        let clients_and_requests = match commit_result {
            Ok(()) => {
                services::set_intent(&mut tx, self.gateway.names(), self.service_id, Intent::Inactive).await?;
                tx.commit().await?;
                built
            }
            Err(err) => {
                tx.rollback().await?;
                // The DB rollback above undid the circuit/label/subservice rows, but
                // the subservices already created on the inferior side by earlier
                // loop iterations are still live there -- release them explicitly
                // rather than leaking them.
                for (client, _) in &built {
                    if let Err(release_err) = client.release().await {
                        tracing::warn!(
                            service_id = self.service_id,
                            %release_err,
                            "failed to release a partially-created subservice after a define() failure"
                        );
                    }
                }
                return Err(err);
            }
        };

        for (client, requests) in &clients_and_requests {
            if let Err(err) = client.define(requests).await {
                inner.errors.push(err.to_string());
            }
        }

        inner.initiated = true;
        inner.counters = Counters::new(clients_and_requests.len());
        inner.remaining = clients_and_requests.len();
        inner.clients = clients_and_requests.into_iter().map(|(c, _)| c).collect();
        inner.client_status = inner
            .clients
            .iter()
            .map(|c| (c.subservice_id(), ServiceStatus::Dormant))
            .collect();
        inner.last_observed = Some(observe(inner.intent, inner.initiated, inner.remaining, &inner.counters));
        Ok(())
    }

    /// Spawns the background task that applies one client's status reports against
    /// this service's counters, in the order they arrive.
    fn spawn_event_loop(&self, mut events_rx: mpsc::UnboundedReceiver<ClientEvent>) {
        let inner = self.inner.clone();
        let dispatcher = self.dispatcher.clone();
        let gateway = self.gateway.clone();
        let service_id = self.service_id;
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if let Err(err) = apply_client_event(&inner, &dispatcher, &gateway, service_id, event).await {
                    tracing::warn!(%service_id, %err, "failed to apply subservice status report");
                }
            }
        });
    }

    /// Persists `intent=ACTIVE` and, if initiated, activates every client (§4.5
    /// `activate`).
    #[instrument(skip(self), fields(service_id = self.service_id))]
    pub async fn activate(&self) -> AggResult<()> {
        let _lock_order = crate::lock_order::enter_service_lock();
        let mut inner = self.inner.lock().await;
        if inner.intent == Intent::Active {
            return Ok(());
        }
        if inner.intent == Intent::Release || inner.counters.failed > 0 {
            return Err(IllegalState::ServiceReleasing.into());
        }

        let mut tx = self.gateway.begin().await?;
        services::set_intent(&mut tx, self.gateway.names(), self.service_id, Intent::Active).await?;
        tx.commit().await?;
        inner.intent = Intent::Active;

        if inner.initiated {
            self.notify(&inner.listeners, ServiceStatus::Activating);
            for client in inner.clients.clone() {
                client.activate().await?;
            }
        }
        Ok(())
    }

    /// Persists `intent=INACTIVE` and deactivates every client (§4.5 `deactivate`).
    #[instrument(skip(self), fields(service_id = self.service_id))]
    pub async fn deactivate(&self) -> AggResult<()> {
        let _lock_order = crate::lock_order::enter_service_lock();
        let mut inner = self.inner.lock().await;
        if inner.intent != Intent::Active {
            return Ok(());
        }

        let mut tx = self.gateway.begin().await?;
        services::set_intent(&mut tx, self.gateway.names(), self.service_id, Intent::Inactive).await?;
        tx.commit().await?;
        inner.intent = Intent::Inactive;

        self.notify(&inner.listeners, ServiceStatus::Deactivating);
        if inner.counters.active == 0 {
            self.notify(&inner.listeners, ServiceStatus::Inactive);
        } else {
            for client in inner.clients.clone() {
                client.deactivate().await?;
            }
        }
        Ok(())
    }

    /// Drives the service towards `RELEASED` (§4.5 `release`): persists the intent
    /// immediately, then either waits for in-flight deactivation or begins release
    /// now, releasing tunnels and deleting every row once the last client reports
    /// released.
    #[instrument(skip(self), fields(service_id = self.service_id))]
    pub async fn release(&self) -> AggResult<()> {
        let _lock_order = crate::lock_order::enter_service_lock();
        let mut inner = self.inner.lock().await;
        if inner.intent == Intent::Release {
            return Ok(());
        }

        let mut tx = self.gateway.begin().await?;
        services::set_intent(&mut tx, self.gateway.names(), self.service_id, Intent::Release).await?;
        tx.commit().await?;
        let was_active_with_clients = inner.intent == Intent::Active && inner.counters.active > 0;
        inner.intent = Intent::Release;

        if was_active_with_clients {
            for client in inner.clients.clone() {
                client.deactivate().await?;
            }
            return Ok(());
        }

        begin_release(&self.gateway, &self.dispatcher, self.service_id, &mut inner).await
    }

    fn notify(&self, listeners: &[Arc<dyn ServiceListener>], status: ServiceStatus) {
        notify(&self.dispatcher, listeners, status);
    }
}

fn notify(dispatcher: &Arc<Dispatcher>, listeners: &[Arc<dyn ServiceListener>], status: ServiceStatus) {
    for listener in listeners.iter().cloned() {
        dispatcher.dispatch(move || async move {
            listener.new_status(status).await;
        });
    }
}

async fn begin_release(
    gateway: &Gateway,
    dispatcher: &Arc<Dispatcher>,
    service_id: ServiceId,
    inner: &mut Inner,
) -> AggResult<()> {
    notify(dispatcher, &inner.listeners, ServiceStatus::Releasing);
    if inner.remaining == 0 {
        return complete_release(gateway, dispatcher, service_id, inner).await;
    }
    for client in inner.clients.clone() {
        client.release().await?;
    }
    Ok(())
}

async fn complete_release(
    gateway: &Gateway,
    dispatcher: &Arc<Dispatcher>,
    service_id: ServiceId,
    inner: &mut Inner,
) -> AggResult<()> {
    let mut tx = gateway.begin().await?;
    labels::release_tunnels(&mut tx, gateway.names(), service_id).await?;
    service_circuits::delete_for_service(&mut tx, gateway.names(), service_id).await?;
    services::delete_subservices(&mut tx, gateway.names(), service_id).await?;
    services::delete(&mut tx, gateway.names(), service_id).await?;
    tx.commit().await?;

    inner.clients.clear();
    inner.client_status.clear();
    inner.errors.clear();
    notify(dispatcher, &inner.listeners, ServiceStatus::Released);
    inner.listeners.clear();
    Ok(())
}

/// Applies one subservice's status report: updates the per-client status map and
/// counters, re-evaluates the aggregate status, notifies listeners on change, and
/// drives the INACTIVE -> release and last-client-released -> deleted transitions
/// that `release` itself can't complete synchronously (§4.5).
async fn apply_client_event(
    inner: &Arc<Mutex<Inner>>,
    dispatcher: &Arc<Dispatcher>,
    gateway: &Gateway,
    service_id: ServiceId,
    event: ClientEvent,
) -> AggResult<()> {
    let _lock_order = crate::lock_order::enter_service_lock();
    let mut guard = inner.lock().await;
    let previous = guard
        .client_status
        .get(&event.subservice_id)
        .copied()
        .unwrap_or(ServiceStatus::Dormant);
    if previous == event.status {
        return Ok(());
    }
    guard.counters.transition(previous, event.status);
    guard.client_status.insert(event.subservice_id, event.status);

    if event.status == ServiceStatus::Released {
        guard.clients.retain(|c| c.subservice_id() != event.subservice_id);
        guard.client_status.remove(&event.subservice_id);
        guard.remaining = guard.remaining.saturating_sub(1);
    }

    // The first subservice to fail takes the whole service down: every other still
    // attached client is told to deactivate, its tunnels (and every sibling tunnel)
    // are freed immediately rather than left allocated until an explicit `release`,
    // and intent moves to ABORT so a later `release` finds nothing active to
    // deactivate first.
    if event.status == ServiceStatus::Failed && guard.counters.failed == 1 {
        let mut tx = gateway.begin().await?;
        services::set_intent(&mut tx, gateway.names(), service_id, Intent::Abort).await?;
        labels::release_tunnels(&mut tx, gateway.names(), service_id).await?;
        tx.commit().await?;
        guard.intent = Intent::Abort;

        let siblings: Vec<Arc<Client>> = guard
            .clients
            .iter()
            .filter(|c| c.subservice_id() != event.subservice_id)
            .cloned()
            .collect();
        for sibling in siblings {
            if let Err(err) = sibling.deactivate().await {
                guard.errors.push(err.to_string());
            }
        }
    }

    let new_status = observe(guard.intent, guard.initiated, guard.remaining, &guard.counters);
    let changed = guard.last_observed != Some(new_status);
    guard.last_observed = Some(new_status);
    if changed {
        notify(dispatcher, &guard.listeners, new_status);
    }

    // A client finishing deactivation while the service is winding down starts that
    // client's own release; it doesn't wait for its siblings.
    if guard.intent == Intent::Release && event.status == ServiceStatus::Inactive {
        if let Some(client) = guard.clients.iter().find(|c| c.subservice_id() == event.subservice_id).cloned() {
            drop(guard);
            return client.release().await;
        }
        return Ok(());
    }

    if guard.intent == Intent::Release && guard.remaining == 0 {
        return complete_release(gateway, dispatcher, service_id, &mut guard).await;
    }
    Ok(())
}
