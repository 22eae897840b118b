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

//! Persistent Aggregator: asymmetric capacitated tree planning, atomic tunnel label
//! allocation, and per-service state machines layered over a relational store of
//! record.
//!
//! The public surface is the [`facade::Aggregator`] plus the [`inferior`] traits an
//! embedder implements to plug in real inferior networks.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod facade;
pub mod inferior;
mod lock_order;
pub mod model;
pub mod persistence;
pub mod planner;
pub mod service;
pub mod trunk;
pub mod watcher;

pub use config::Config;
pub use error::{AggError, AggResult};
pub use facade::Aggregator;
pub use persistence::Gateway;
pub use service::{ServiceStateMachine, ServiceStatus};
pub use trunk::TrunkHandle;
