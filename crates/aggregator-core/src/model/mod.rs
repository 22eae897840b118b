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

//! Plain data-carrying row types mirrored from the six tables of record, plus the
//! handful of small value types (`Circuit`, `SubterminalRef`, `Intent`) shared across
//! the Gateway, the Trunk Manager, the Planner and the Service State Machine.
//!
//! None of these types hold behaviour beyond simple constructors and the
//! `sqlx::FromRow` derives needed to map a query result onto them.

mod circuit;
mod label;
pub(crate) mod service;
mod terminal;
mod trunk;

pub use circuit::{ServiceCircuitRow, SubserviceRow};
pub use label::LabelTuple;
pub use service::{Intent, ServiceRow};
pub use terminal::{SubterminalRef, TerminalRow};
pub use trunk::TrunkRow;

/// Surrogate key for a `terminals` row.
pub type TerminalId = i64;
/// Surrogate key for a `trunks` row (`dbid` in the spec).
pub type TrunkId = i64;
/// Surrogate key for a `services` row.
pub type ServiceId = i64;
/// A VLAN-style label. Stored as `INTEGER` (sqlite has no native `u32`); callers are
/// responsible for keeping values within `0..=u32::MAX`.
pub type Label = u32;

/// `(terminal, label)` — the addressable endpoint of a service (§3, "Circuit").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Circuit {
    pub terminal: TerminalId,
    pub label: Label,
}

impl Circuit {
    pub fn new(terminal: TerminalId, label: Label) -> Self {
        Self { terminal, label }
    }
}

/// Per-circuit bandwidth request: what this circuit injects (`ingress`) and what it
/// expects to receive (`egress`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bandwidth {
    pub ingress: i64,
    pub egress: i64,
}

impl Bandwidth {
    pub fn new(ingress: i64, egress: i64) -> Self {
        Self { ingress, egress }
    }
}
