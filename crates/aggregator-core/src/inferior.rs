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

//! The interface this crate consumes from inferior networks (§6), and the interface
//! it exposes to them in turn -- an aggregator is itself a valid [`InferiorNetwork`],
//! though nothing in this crate exercises that nesting recursively.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::AggResult;
use crate::model::{Circuit, TerminalId};
use crate::service::ServiceStatus;

/// A fully-qualified reference to a terminal inside some subnetwork, as advertised by
/// an inferior network's distance model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TerminalRef {
    pub subnetwork_name: String,
    pub terminal_id: TerminalId,
}

impl TerminalRef {
    pub fn new(subnetwork_name: impl Into<String>, terminal_id: TerminalId) -> Self {
        Self {
            subnetwork_name: subnetwork_name.into(),
            terminal_id,
        }
    }
}

/// One circuit's bandwidth demand as handed to an inferior network's `define`.
#[derive(Debug, Clone, Copy)]
pub struct SubRequest {
    pub terminal: TerminalId,
    pub ingress: i64,
    pub egress: i64,
}

/// A network this aggregator delegates parts of a service to. Every method can
/// suspend (DB access, a remote call, or both), so the trait is `#[async_trait]`.
#[async_trait]
pub trait InferiorNetwork: Send + Sync {
    async fn new_service(&self) -> AggResult<Box<dyn InferiorService>>;
    async fn get_service(&self, id: i64) -> AggResult<Option<Box<dyn InferiorService>>>;
    async fn get_terminal(&self, name: &str) -> AggResult<Option<TerminalId>>;
    /// Pairwise minimum delay between every pair of terminals mutually reachable with
    /// at least `min_bandwidth`, as understood internally by this network.
    async fn get_model(
        &self,
        min_bandwidth: i64,
    ) -> AggResult<BTreeMap<(TerminalId, TerminalId), i64>>;
}

/// A single subservice delegated to an inferior network.
#[async_trait]
pub trait InferiorService: Send + Sync {
    fn id(&self) -> i64;
    async fn define(&self, request: &[SubRequest]) -> AggResult<()>;
    async fn activate(&self) -> AggResult<()>;
    async fn deactivate(&self) -> AggResult<()>;
    async fn release(&self) -> AggResult<()>;
    async fn status(&self) -> AggResult<ServiceStatus>;
    async fn get_request(&self) -> AggResult<Vec<SubRequest>>;
    async fn errors(&self) -> AggResult<Vec<String>>;
    /// Registers a listener and returns the id `remove_listener` later needs to drop
    /// this exact registration.
    async fn add_listener(&self, listener: std::sync::Arc<dyn ServiceListener>) -> AggResult<u64>;
    async fn remove_listener(&self, listener_id: u64) -> AggResult<()>;
}

/// Notified when a subservice's observable status changes. Dispatch of this single
/// void method is what the Event Dispatcher (§4.6) sequences.
#[async_trait]
pub trait ServiceListener: Send + Sync {
    async fn new_status(&self, status: ServiceStatus);
}

/// A circuit request bundled with the label it should appear under, used while
/// translating an outer service request into inferior sub-requests.
#[derive(Debug, Clone, Copy)]
pub struct CircuitDemand {
    pub circuit: Circuit,
    pub ingress: i64,
    pub egress: i64,
}
