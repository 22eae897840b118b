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

//! Candidate-graph construction for the Planner (§4.4 step 2).
//!
//! Vertices are inferior terminals, addressed by [`SubterminalRef`]. Edges come from
//! two sources: one per commissioned trunk with enough headroom and a free label, and
//! a zero-weight edge between every pair of terminals that share a `subnetwork_name`
//! -- the concrete form the "distance edges advertised by each inferior network's
//! model" contract takes here, since the Planner only has Gateway state (not live
//! `InferiorNetwork` handles) to build from; see `DESIGN.md`.

use std::collections::HashMap;

use aggregator_migration::TableNames;
use sqlx::{Sqlite, Transaction};

use crate::error::AggResult;
use crate::model::{SubterminalRef, TrunkId};
use crate::persistence::{labels, terminals, trunks};

#[derive(Debug, Clone)]
pub struct Edge {
    pub to: SubterminalRef,
    pub weight: i64,
    pub via_trunk: Option<TrunkId>,
}

#[derive(Debug, Default)]
pub struct CandidateGraph {
    pub adjacency: HashMap<SubterminalRef, Vec<Edge>>,
    pub trunk_endpoints: HashMap<TrunkId, (SubterminalRef, SubterminalRef)>,
}

impl CandidateGraph {
    fn add_edge(&mut self, from: SubterminalRef, to: SubterminalRef, weight: i64, via_trunk: Option<TrunkId>) {
        self.adjacency.entry(from).or_default().push(Edge {
            to,
            weight,
            via_trunk,
        });
    }

    /// Removes both directed halves of the edge carried by `trunk_dbid`, used by the
    /// capacity-pruning loop in step 4 of the planning algorithm.
    pub fn remove_trunk_edge(&mut self, trunk_dbid: TrunkId) {
        if let Some((start, end)) = self.trunk_endpoints.remove(&trunk_dbid) {
            if let Some(edges) = self.adjacency.get_mut(&start) {
                edges.retain(|e| e.via_trunk != Some(trunk_dbid));
            }
            if let Some(edges) = self.adjacency.get_mut(&end) {
                edges.retain(|e| e.via_trunk != Some(trunk_dbid));
            }
        }
    }

    pub fn adjacency_map(&self) -> HashMap<SubterminalRef, Vec<(SubterminalRef, i64)>> {
        self.adjacency
            .iter()
            .map(|(k, edges)| {
                (
                    k.clone(),
                    edges.iter().map(|e| (e.to.clone(), e.weight)).collect(),
                )
            })
            .collect()
    }
}

pub async fn build(
    tx: &mut Transaction<'_, Sqlite>,
    names: &TableNames,
    min_bandwidth: i64,
) -> AggResult<CandidateGraph> {
    let mut graph = CandidateGraph::default();

    for trunk in trunks::list(tx, names).await? {
        if !trunk.commissioned {
            continue;
        }
        if trunk.up_cap.max(trunk.down_cap) < min_bandwidth {
            continue;
        }
        if labels::available_tunnel_count(tx, names, trunk.dbid).await? == 0 {
            continue;
        }
        let start = trunk.start();
        let end = trunk.end();
        graph.add_edge(start.clone(), end.clone(), trunk.metric, Some(trunk.dbid));
        graph.add_edge(end.clone(), start.clone(), trunk.metric, Some(trunk.dbid));
        graph.trunk_endpoints.insert(trunk.dbid, (start, end));
    }

    let mut by_network: HashMap<String, Vec<SubterminalRef>> = HashMap::new();
    for terminal in terminals::list(tx, names).await? {
        by_network
            .entry(terminal.subnetwork_name.clone())
            .or_default()
            .push(terminal.subterminal());
    }
    for group in by_network.values() {
        for a in group {
            for b in group {
                if a != b {
                    graph.add_edge(a.clone(), b.clone(), 0, None);
                }
            }
        }
    }

    Ok(graph)
}
