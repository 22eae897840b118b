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

//! The pure status function (§4.5) and the counter bookkeeping it reads.

use crate::model::Intent;

/// Observable state of a service, derived -- never stored directly -- from intent and
/// the aggregated subservice counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Dormant,
    Establishing,
    Inactive,
    Activating,
    Active,
    Deactivating,
    Failed,
    Releasing,
    Released,
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceStatus::Dormant => "DORMANT",
            ServiceStatus::Establishing => "ESTABLISHING",
            ServiceStatus::Inactive => "INACTIVE",
            ServiceStatus::Activating => "ACTIVATING",
            ServiceStatus::Active => "ACTIVE",
            ServiceStatus::Deactivating => "DEACTIVATING",
            ServiceStatus::Failed => "FAILED",
            ServiceStatus::Releasing => "RELEASING",
            ServiceStatus::Released => "RELEASED",
        };
        f.write_str(s)
    }
}

/// Per-status subservice tallies, incremented/decremented as each client's
/// `lastStatus` transitions (§4.5). `total` is the number of clients the service was
/// constructed with (`N` in the spec table).
#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    pub total: usize,
    pub dormant: usize,
    pub inactive: usize,
    pub active: usize,
    pub failed: usize,
    pub released: usize,
}

impl Counters {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            dormant: total,
            ..Default::default()
        }
    }

    /// Moves one client from `from` to `to`, honouring "FAILED is terminal in
    /// counting" -- a client that has already failed never leaves the failed bucket.
    pub fn transition(&mut self, from: ServiceStatus, to: ServiceStatus) {
        if from == ServiceStatus::Failed {
            return;
        }
        match from {
            ServiceStatus::Dormant => self.dormant = self.dormant.saturating_sub(1),
            ServiceStatus::Inactive => self.inactive = self.inactive.saturating_sub(1),
            ServiceStatus::Active => self.active = self.active.saturating_sub(1),
            ServiceStatus::Released => self.released = self.released.saturating_sub(1),
            _ => {}
        }
        match to {
            ServiceStatus::Dormant => self.dormant += 1,
            ServiceStatus::Inactive => self.inactive += 1,
            ServiceStatus::Active => self.active += 1,
            ServiceStatus::Failed => self.failed += 1,
            ServiceStatus::Released => self.released += 1,
            _ => {}
        }
    }
}

/// Evaluates the status table in §4.5, first match wins.
pub fn observe(intent: Intent, initiated: bool, clients: usize, counters: &Counters) -> ServiceStatus {
    if intent == Intent::Release && clients == 0 {
        return ServiceStatus::Released;
    }
    if intent == Intent::Release {
        return ServiceStatus::Releasing;
    }
    if counters.failed > 0 {
        return ServiceStatus::Failed;
    }
    if !initiated {
        return ServiceStatus::Dormant;
    }
    if counters.dormant > 0 {
        return ServiceStatus::Establishing;
    }
    if intent == Intent::Active && counters.active < counters.total {
        return ServiceStatus::Activating;
    }
    if intent == Intent::Active {
        return ServiceStatus::Active;
    }
    if counters.active > 0 {
        return ServiceStatus::Deactivating;
    }
    ServiceStatus::Inactive
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dormant_before_initiation() {
        let counters = Counters::new(0);
        assert_eq!(
            observe(Intent::Inactive, false, 0, &counters),
            ServiceStatus::Dormant
        );
    }

    #[test]
    fn establishing_while_any_client_dormant() {
        let counters = Counters::new(2);
        assert_eq!(
            observe(Intent::Inactive, true, 2, &counters),
            ServiceStatus::Establishing
        );
    }

    #[test]
    fn activating_then_active() {
        let mut counters = Counters::new(2);
        counters.transition(ServiceStatus::Dormant, ServiceStatus::Inactive);
        counters.transition(ServiceStatus::Dormant, ServiceStatus::Inactive);
        counters.transition(ServiceStatus::Inactive, ServiceStatus::Active);
        assert_eq!(
            observe(Intent::Active, true, 2, &counters),
            ServiceStatus::Activating
        );
        counters.transition(ServiceStatus::Inactive, ServiceStatus::Active);
        assert_eq!(
            observe(Intent::Active, true, 2, &counters),
            ServiceStatus::Active
        );
    }

    #[test]
    fn failed_is_sticky_and_dominates() {
        let mut counters = Counters::new(2);
        counters.transition(ServiceStatus::Dormant, ServiceStatus::Failed);
        assert_eq!(
            observe(Intent::Active, true, 2, &counters),
            ServiceStatus::Failed
        );
        // a further report from the same client must not double count or un-fail it
        counters.transition(ServiceStatus::Failed, ServiceStatus::Inactive);
        assert_eq!(counters.failed, 1);
    }

    #[test]
    fn released_once_clients_drained_under_release_intent() {
        let counters = Counters::new(0);
        assert_eq!(
            observe(Intent::Release, true, 0, &counters),
            ServiceStatus::Released
        );
        assert_eq!(
            observe(Intent::Release, true, 1, &counters),
            ServiceStatus::Releasing
        );
    }
}
