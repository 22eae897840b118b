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

//! End-to-end scenarios driving a full `Aggregator` against a temp-file SQLite
//! database through a hand-written fake of the inferior-network traits.

use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use aggregator_core::error::{AggError, Conflict, ResourceExhausted};
use aggregator_core::inferior::{CircuitDemand, InferiorNetwork, InferiorService, ServiceListener, SubRequest};
use aggregator_core::model::{Circuit, SubterminalRef};
use aggregator_core::persistence::Gateway;
use aggregator_core::{Aggregator, ServiceStatus};
use aggregator_migration::TableNames;

async fn open_gateway(path: &Path) -> Gateway {
    let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    let gateway = Gateway::from_pool(pool, TableNames::default());
    gateway.bootstrap().await.unwrap();
    gateway
}

/// A fake subservice: records what it was asked to do and lets the test drive its
/// status reports, standing in for a real inferior network's async callbacks.
struct MockSubservice {
    id: i64,
    listeners: StdMutex<Vec<(u64, Arc<dyn ServiceListener>)>>,
    next_listener_id: AtomicU64,
    status: StdMutex<ServiceStatus>,
    requests: StdMutex<Vec<SubRequest>>,
    deactivate_calls: AtomicUsize,
}

impl MockSubservice {
    fn new(id: i64) -> Self {
        Self {
            id,
            listeners: StdMutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            status: StdMutex::new(ServiceStatus::Dormant),
            requests: StdMutex::new(Vec::new()),
            deactivate_calls: AtomicUsize::new(0),
        }
    }

    async fn trigger(&self, status: ServiceStatus) {
        *self.status.lock().unwrap() = status;
        let listeners: Vec<Arc<dyn ServiceListener>> =
            self.listeners.lock().unwrap().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener.new_status(status).await;
        }
    }

    fn requested(&self) -> Vec<SubRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn deactivate_count(&self) -> usize {
        self.deactivate_calls.load(Ordering::SeqCst)
    }

    fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}

#[async_trait]
impl InferiorService for Arc<MockSubservice> {
    fn id(&self) -> i64 {
        self.id
    }

    async fn define(&self, request: &[SubRequest]) -> aggregator_core::error::AggResult<()> {
        *self.requests.lock().unwrap() = request.to_vec();
        Ok(())
    }

    async fn activate(&self) -> aggregator_core::error::AggResult<()> {
        Ok(())
    }

    async fn deactivate(&self) -> aggregator_core::error::AggResult<()> {
        self.deactivate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self) -> aggregator_core::error::AggResult<()> {
        Ok(())
    }

    async fn status(&self) -> aggregator_core::error::AggResult<ServiceStatus> {
        Ok(*self.status.lock().unwrap())
    }

    async fn get_request(&self) -> aggregator_core::error::AggResult<Vec<SubRequest>> {
        Ok(self.requested())
    }

    async fn errors(&self) -> aggregator_core::error::AggResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn add_listener(&self, listener: Arc<dyn ServiceListener>) -> aggregator_core::error::AggResult<u64> {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push((id, listener));
        Ok(id)
    }

    async fn remove_listener(&self, listener_id: u64) -> aggregator_core::error::AggResult<()> {
        self.listeners.lock().unwrap().retain(|(id, _)| *id != listener_id);
        Ok(())
    }
}

/// A fake inferior network: every call to `new_service` mints a fresh
/// `MockSubservice` and keeps a strong handle to it so the test can reach in and
/// trigger status reports after the fact.
#[derive(Default)]
struct MockNetwork {
    next_id: AtomicI64,
    services: StdMutex<Vec<Arc<MockSubservice>>>,
}

impl MockNetwork {
    fn spawned(&self) -> Vec<Arc<MockSubservice>> {
        self.services.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferiorNetwork for MockNetwork {
    async fn new_service(&self) -> aggregator_core::error::AggResult<Box<dyn InferiorService>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mock = Arc::new(MockSubservice::new(id));
        self.services.lock().unwrap().push(mock.clone());
        Ok(Box::new(mock))
    }

    async fn get_service(&self, id: i64) -> aggregator_core::error::AggResult<Option<Box<dyn InferiorService>>> {
        Ok(self
            .services
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .map(|s| Box::new(s) as Box<dyn InferiorService>))
    }

    async fn get_terminal(&self, _name: &str) -> aggregator_core::error::AggResult<Option<i64>> {
        Ok(None)
    }

    async fn get_model(
        &self,
        _min_bandwidth: i64,
    ) -> aggregator_core::error::AggResult<std::collections::BTreeMap<(i64, i64), i64>> {
        Ok(std::collections::BTreeMap::new())
    }
}

async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
}

#[tokio::test]
async fn happy_path_symmetric_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = open_gateway(&dir.path().join("agg.db")).await;
    let aggregator = Aggregator::open(gateway, "agg").await.unwrap();

    let a = aggregator
        .add_terminal("A", SubterminalRef::new("S1", "a"))
        .await
        .unwrap();
    let b = aggregator
        .add_terminal("B", SubterminalRef::new("S2", "b"))
        .await
        .unwrap();
    let trunk = aggregator
        .add_trunk(SubterminalRef::new("S1", "a"), SubterminalRef::new("S2", "b"), 100, 100, 1)
        .await
        .unwrap();
    trunk.define_label_range(100, 2, 200).await.unwrap();

    let network = MockNetwork::default();
    let service = aggregator.new_service().await.unwrap();
    assert_eq!(service.status().await, ServiceStatus::Dormant);

    let demands = vec![
        CircuitDemand { circuit: Circuit::new(a, 1), ingress: 10, egress: 10 },
        CircuitDemand { circuit: Circuit::new(b, 1), ingress: 10, egress: 10 },
    ];
    service.define(&network, demands).await.unwrap();
    assert_eq!(service.status().await, ServiceStatus::Establishing);
    assert_eq!(trunk.get_available_tunnel_count().await.unwrap(), 1);

    let mocks = network.spawned();
    assert_eq!(mocks.len(), 2);
    for mock in &mocks {
        mock.trigger(ServiceStatus::Inactive).await;
    }
    settle().await;
    assert_eq!(service.status().await, ServiceStatus::Inactive);

    service.activate().await.unwrap();
    for mock in &mocks {
        mock.trigger(ServiceStatus::Active).await;
    }
    settle().await;
    assert_eq!(service.status().await, ServiceStatus::Active);

    service.deactivate().await.unwrap();
    for mock in &mocks {
        mock.trigger(ServiceStatus::Inactive).await;
    }
    settle().await;
    assert_eq!(service.status().await, ServiceStatus::Inactive);

    service.release().await.unwrap();
    for mock in &mocks {
        mock.trigger(ServiceStatus::Released).await;
    }
    settle().await;
    assert_eq!(service.status().await, ServiceStatus::Released);
    // every tunnel is back on the trunk's free list once the service is gone
    assert_eq!(trunk.get_available_tunnel_count().await.unwrap(), 2);
    assert!(aggregator.get_terminal("A").await.unwrap().is_some());
    let _ = b;
}

#[tokio::test]
async fn capacity_shortfall_then_success_after_provide_bandwidth() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = open_gateway(&dir.path().join("agg.db")).await;
    let aggregator = Aggregator::open(gateway, "agg").await.unwrap();

    let a = aggregator
        .add_terminal("A", SubterminalRef::new("S1", "a"))
        .await
        .unwrap();
    let b = aggregator
        .add_terminal("B", SubterminalRef::new("S2", "b"))
        .await
        .unwrap();
    let trunk = aggregator
        .add_trunk(SubterminalRef::new("S1", "a"), SubterminalRef::new("S2", "b"), 60, 100, 1)
        .await
        .unwrap();
    trunk.define_label_range(100, 2, 200).await.unwrap();

    let network = MockNetwork::default();
    let service = aggregator.new_service().await.unwrap();
    let demands = vec![
        CircuitDemand { circuit: Circuit::new(a, 1), ingress: 80, egress: 5 },
        CircuitDemand { circuit: Circuit::new(b, 1), ingress: 5, egress: 80 },
    ];

    let err = service.define(&network, demands.clone()).await.unwrap_err();
    assert!(matches!(err, AggError::ResourceExhausted(ResourceExhausted::NoPath)));

    trunk.provide_bandwidth(20, 0).await.unwrap();
    service.define(&network, demands).await.unwrap();
    assert_eq!(service.status().await, ServiceStatus::Establishing);
}

#[tokio::test]
async fn failure_releases_tunnels_and_moves_intent_to_abort() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = open_gateway(&dir.path().join("agg.db")).await;
    let aggregator = Aggregator::open(gateway, "agg").await.unwrap();

    let a = aggregator
        .add_terminal("A", SubterminalRef::new("S1", "a"))
        .await
        .unwrap();
    let b = aggregator
        .add_terminal("B", SubterminalRef::new("S2", "b"))
        .await
        .unwrap();
    let trunk = aggregator
        .add_trunk(SubterminalRef::new("S1", "a"), SubterminalRef::new("S2", "b"), 100, 100, 1)
        .await
        .unwrap();
    trunk.define_label_range(100, 2, 200).await.unwrap();

    let network = MockNetwork::default();
    let service = aggregator.new_service().await.unwrap();
    let demands = vec![
        CircuitDemand { circuit: Circuit::new(a, 1), ingress: 10, egress: 10 },
        CircuitDemand { circuit: Circuit::new(b, 1), ingress: 10, egress: 10 },
    ];
    service.define(&network, demands).await.unwrap();
    service.activate().await.unwrap();

    let mocks = network.spawned();
    mocks[0].trigger(ServiceStatus::Active).await;
    settle().await;

    mocks[1].trigger(ServiceStatus::Failed).await;
    settle().await;
    assert_eq!(service.status().await, ServiceStatus::Failed);
    // the failed service's tunnel allocation is credited straight back
    assert_eq!(trunk.get_available_tunnel_count().await.unwrap(), 2);
    // the surviving sibling is told to deactivate rather than left dangling ACTIVE
    assert_eq!(mocks[0].deactivate_count(), 1);

    service.release().await.unwrap();
    for mock in &mocks {
        mock.trigger(ServiceStatus::Released).await;
    }
    settle().await;
    assert_eq!(service.status().await, ServiceStatus::Released);
}

#[tokio::test]
async fn release_during_activation_skips_straight_to_releasing() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = open_gateway(&dir.path().join("agg.db")).await;
    let aggregator = Aggregator::open(gateway, "agg").await.unwrap();

    let a = aggregator
        .add_terminal("A", SubterminalRef::new("S1", "a"))
        .await
        .unwrap();
    let b = aggregator
        .add_terminal("B", SubterminalRef::new("S2", "b"))
        .await
        .unwrap();
    let trunk = aggregator
        .add_trunk(SubterminalRef::new("S1", "a"), SubterminalRef::new("S2", "b"), 100, 100, 1)
        .await
        .unwrap();
    trunk.define_label_range(100, 2, 200).await.unwrap();

    let network = MockNetwork::default();
    let service = aggregator.new_service().await.unwrap();
    let demands = vec![
        CircuitDemand { circuit: Circuit::new(a, 1), ingress: 10, egress: 10 },
        CircuitDemand { circuit: Circuit::new(b, 1), ingress: 10, egress: 10 },
    ];
    service.define(&network, demands).await.unwrap();
    service.activate().await.unwrap();
    // neither subservice has reported ACTIVE yet -- status is ACTIVATING

    service.release().await.unwrap();
    let mocks = network.spawned();
    for mock in &mocks {
        mock.trigger(ServiceStatus::Released).await;
    }
    settle().await;
    assert_eq!(service.status().await, ServiceStatus::Released);
}

#[tokio::test]
async fn crash_recovery_reopens_over_the_same_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agg.db");

    let (terminal_id, service_id) = {
        let gateway = open_gateway(&path).await;
        let aggregator = Aggregator::open(gateway, "agg").await.unwrap();
        let a = aggregator
            .add_terminal("A", SubterminalRef::new("S1", "a"))
            .await
            .unwrap();
        aggregator
            .add_trunk(SubterminalRef::new("S1", "a"), SubterminalRef::new("S2", "b"), 100, 100, 1)
            .await
            .unwrap();
        let service = aggregator.new_service().await.unwrap();
        (a, service.id())
        // aggregator dropped here -- simulates process exit
    };

    let gateway = open_gateway(&path).await;
    let aggregator = Aggregator::open(gateway, "agg").await.unwrap();
    assert!(aggregator.get_terminal("A").await.unwrap().is_some());
    let recovered = aggregator.get_service(service_id).await.unwrap().unwrap();
    assert_eq!(recovered.id(), service_id);
    assert_eq!(recovered.status().await, ServiceStatus::Dormant);
    let _ = terminal_id;
}

#[tokio::test]
async fn dropping_the_last_handle_unsubscribes_every_client() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = open_gateway(&dir.path().join("agg.db")).await;
    let aggregator = Aggregator::open(gateway, "agg").await.unwrap();

    let a = aggregator
        .add_terminal("A", SubterminalRef::new("S1", "a"))
        .await
        .unwrap();
    let b = aggregator
        .add_terminal("B", SubterminalRef::new("S2", "b"))
        .await
        .unwrap();
    aggregator
        .add_trunk(SubterminalRef::new("S1", "a"), SubterminalRef::new("S2", "b"), 100, 100, 1)
        .await
        .unwrap()
        .define_label_range(100, 2, 200)
        .await
        .unwrap();

    let network = MockNetwork::default();
    let service = aggregator.new_service().await.unwrap();
    let demands = vec![
        CircuitDemand { circuit: Circuit::new(a, 1), ingress: 10, egress: 10 },
        CircuitDemand { circuit: Circuit::new(b, 1), ingress: 10, egress: 10 },
    ];
    service.define(&network, demands).await.unwrap();

    let mocks = network.spawned();
    for mock in &mocks {
        assert_eq!(mock.listener_count(), 1);
    }

    drop(service);
    settle().await;

    for mock in &mocks {
        assert_eq!(mock.listener_count(), 0, "cleanup hook must remove the client's listener registration");
    }
}

#[tokio::test]
async fn overlapping_label_ranges_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = open_gateway(&dir.path().join("agg.db")).await;
    let aggregator = Aggregator::open(gateway, "agg").await.unwrap();
    let trunk = aggregator
        .add_trunk(SubterminalRef::new("S1", "a"), SubterminalRef::new("S2", "b"), 100, 100, 1)
        .await
        .unwrap();

    trunk.define_label_range(100, 10, 200).await.unwrap();
    let err = trunk.define_label_range(105, 10, 300).await.unwrap_err();
    assert!(matches!(err, AggError::Conflict(Conflict::LabelsInUse)));

    // a zero-amount range is always a no-op, even where it would otherwise conflict
    trunk.define_label_range(100, 0, 200).await.unwrap();
}
