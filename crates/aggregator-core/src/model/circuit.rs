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

use super::{Label, ServiceId, TerminalId};

/// A row of the `service_circuits` table: the user-facing request.
#[derive(Debug, Clone, FromRow)]
pub struct ServiceCircuitRow {
    pub service_id: ServiceId,
    pub terminal_id: TerminalId,
    pub label: i64,
    pub ingress: i64,
    pub shaping: i64,
}

impl ServiceCircuitRow {
    pub fn label(&self) -> Label {
        self.label as Label
    }
}

/// A row of the `subservices` table: the inferior-network services this aggregator
/// service delegates to.
#[derive(Debug, Clone, FromRow)]
pub struct SubserviceRow {
    pub service_id: ServiceId,
    pub subservice_id: i64,
    pub subnetwork_name: String,
}
