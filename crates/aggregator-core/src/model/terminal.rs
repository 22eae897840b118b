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

use sqlx::FromRow;

use super::TerminalId;

/// A reference to a subterminal owned by some inferior network: the network's own
/// name and the terminal name within it. Opaque to this crate beyond equality and
/// ordering (used as a graph vertex by the Planner).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubterminalRef {
    pub network: String,
    pub name: String,
}

impl SubterminalRef {
    pub fn new(network: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            name: name.into(),
        }
    }
}

/// A row of the `terminals` table: `(terminal_id, name)` unique within the
/// aggregator, carrying an opaque reference to the subterminal it maps to.
#[derive(Debug, Clone, FromRow)]
pub struct TerminalRow {
    pub terminal_id: TerminalId,
    pub name: String,
    pub subnetwork_name: String,
    pub subname: String,
}

impl TerminalRow {
    pub fn subterminal(&self) -> SubterminalRef {
        SubterminalRef::new(self.subnetwork_name.clone(), self.subname.clone())
    }
}
