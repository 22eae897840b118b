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

//! The Planner (§4.4): turns a sanitised service request into a set of trunk tunnel
//! allocations plus one sub-request per inferior-network terminal group.

mod fib;
mod graph;

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{AggError, AggResult, ResourceExhausted};
use crate::inferior::CircuitDemand;
use crate::model::{SubterminalRef, TerminalId, TrunkId};
use crate::persistence::{terminals, Gateway};

pub use graph::CandidateGraph;

/// Read-only counterpart of the planning algorithm used by `Aggregator::get_model`
/// (§4.7): builds the same candidate graph but only reports pairwise minimum delay,
/// performing no allocation.
pub async fn fib_distance_model(
    gateway: &Gateway,
    min_bandwidth: i64,
) -> AggResult<BTreeMap<(TerminalId, TerminalId), i64>> {
    let mut tx = gateway.begin().await?;
    let candidate = graph::build(&mut tx, gateway.names(), min_bandwidth).await?;
    let terminal_rows = terminals::list(&mut tx, gateway.names()).await?;
    tx.rollback().await?;

    let adjacency = candidate.adjacency_map();
    let mut result = BTreeMap::new();
    for source in &terminal_rows {
        let fib = fib::relax(&source.subterminal(), &adjacency);
        for target in &terminal_rows {
            if target.terminal_id == source.terminal_id {
                continue;
            }
            if let Some(&distance) = fib.distance.get(&target.subterminal()) {
                result.insert((source.terminal_id, target.terminal_id), distance);
            }
        }
    }
    Ok(result)
}

/// One group of allocations and circuits that falls inside a single inferior
/// network, handed to that network's `define` as a sub-request (§4.4 step 5).
#[derive(Debug, Clone)]
pub struct SubRequestGroup {
    pub subnetwork_name: String,
    /// `(outer_terminal_id, subterminal, ingress, egress)` with ingress/egress
    /// swapped relative to the outer request wherever the terminal sits on the far
    /// side of a trunk edge.
    pub circuits: Vec<(TerminalId, SubterminalRef, i64, i64)>,
}

/// The Planner's committed output: which trunk gets how much tunnel capacity, and
/// the per-network sub-requests derived from the spanning tree.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// `trunk_dbid -> (up, down)` bandwidth to allocate a tunnel for.
    pub allocations: Vec<(TrunkId, i64, i64)>,
    pub sub_requests: Vec<SubRequestGroup>,
}

pub struct Planner<'g> {
    gateway: &'g Gateway,
}

impl<'g> Planner<'g> {
    pub fn new(gateway: &'g Gateway) -> Self {
        Self { gateway }
    }

    /// Runs the full algorithm described in §4.4 against the current Gateway state.
    /// Does not itself commit anything -- callers allocate the returned trunk/up/down
    /// tuples inside their own transaction alongside the circuit/subservice rows.
    pub async fn plan(&self, demands: &[CircuitDemand]) -> AggResult<Plan> {
        if demands.len() < 2 {
            return Err(AggError::invalid_request("a service needs at least 2 circuits"));
        }
        let b_min = demands.iter().map(|d| d.ingress).min().unwrap_or(0);

        let mut tx = self.gateway.begin().await?;
        let mut candidate = graph::build(&mut tx, self.gateway.names(), b_min).await?;

        let mut goal_terminals = Vec::with_capacity(demands.len());
        for demand in demands {
            let terminal = terminals::get_by_id(&mut tx, self.gateway.names(), demand.circuit.terminal)
                .await?
                .ok_or_else(|| AggError::invalid_request("circuit references an unknown terminal"))?;
            goal_terminals.push((terminal.subterminal(), demand));
        }
        tx.rollback().await?;

        let goals: HashSet<SubterminalRef> = goal_terminals.iter().map(|(s, _)| s.clone()).collect();

        loop {
            match grow_spanning_tree(&candidate, &goals) {
                Some(tree_edges) => {
                    if let Some(worst) = worst_shortfall(self.gateway, &tree_edges, &goal_terminals).await? {
                        candidate.remove_trunk_edge(worst);
                        continue;
                    }
                    return self.commit(&candidate, &tree_edges, &goal_terminals).await;
                }
                None => return Err(ResourceExhausted::NoPath.into()),
            }
        }
    }

    async fn commit(
        &self,
        candidate: &CandidateGraph,
        tree_edges: &[TrunkId],
        goal_terminals: &[(SubterminalRef, &CircuitDemand)],
    ) -> AggResult<Plan> {
        let mut allocations = Vec::with_capacity(tree_edges.len());
        for &dbid in tree_edges {
            let (up, down) = half_tree_load(candidate, dbid, tree_edges, goal_terminals);
            allocations.push((dbid, up, down));
        }

        let mut groups: HashMap<String, SubRequestGroup> = HashMap::new();
        for (terminal, demand) in goal_terminals {
            let network = terminal.network.clone();
            let group = groups.entry(network.clone()).or_insert_with(|| SubRequestGroup {
                subnetwork_name: network,
                circuits: Vec::new(),
            });
            group
                .circuits
                .push((demand.circuit.terminal, terminal.clone(), demand.ingress, demand.egress));
        }

        Ok(Plan {
            allocations,
            sub_requests: groups.into_values().collect(),
        })
    }
}

/// Picks a starting terminal and grows a tree (by repeatedly stepping towards the
/// nearest unreached goal along the FIB) until every goal terminal is reached,
/// forbidding a cross-network edge whose endpoints are already both reached (§4.4
/// step 3). Returns the trunk ids used by the tree, or `None` if some goal stays
/// unreachable.
fn grow_spanning_tree(candidate: &CandidateGraph, goals: &HashSet<SubterminalRef>) -> Option<Vec<TrunkId>> {
    let start = goals.iter().next()?.clone();
    let adjacency = candidate.adjacency_map();

    let mut reached: HashSet<SubterminalRef> = HashSet::new();
    reached.insert(start.clone());
    let mut tree_edges = Vec::new();

    loop {
        let remaining: Vec<&SubterminalRef> = goals.difference(&reached).collect();
        if remaining.is_empty() {
            return Some(tree_edges);
        }

        let mut best: Option<(i64, SubterminalRef, SubterminalRef, Option<TrunkId>)> = None;
        for from in &reached {
            let fib = fib::relax(from, &adjacency);
            for goal in &remaining {
                if let Some(&dist) = fib.distance.get(*goal) {
                    if let Some(hop) = fib.next_hop.get(*goal) {
                        if reached.contains(hop) {
                            continue;
                        }
                        let via_trunk = candidate
                            .adjacency
                            .get(from)
                            .and_then(|edges| edges.iter().find(|e| &e.to == hop))
                            .and_then(|e| e.via_trunk);
                        let better = best.as_ref().map(|(d, ..)| dist < *d).unwrap_or(true);
                        if better {
                            best = Some((dist, from.clone(), hop.clone(), via_trunk));
                        }
                    }
                }
            }
        }

        match best {
            Some((_, _from, hop, via_trunk)) => {
                reached.insert(hop);
                if let Some(dbid) = via_trunk {
                    if !tree_edges.contains(&dbid) {
                        tree_edges.push(dbid);
                    }
                }
            }
            None => return None,
        }
    }
}

/// Computes `(load_up, load_down)` for the tunnel on `trunk_dbid`: the minimum of
/// producer and consumer sums in the two half-trees `tree_edges` partitions the goal
/// set into (§4.4 step 4). The walk that finds each side is restricted to
/// `tree_edges` rather than the full candidate graph -- walking the candidate graph
/// would treat any redundant trunk between the same two subterminals as still
/// connecting the two halves even though `grow_spanning_tree` never selected it,
/// inflating both sums whenever the candidate graph has more than one path between
/// a pair of goals.
fn half_tree_load(
    candidate: &CandidateGraph,
    trunk_dbid: TrunkId,
    tree_edges: &[TrunkId],
    goal_terminals: &[(SubterminalRef, &CircuitDemand)],
) -> (i64, i64) {
    let Some((start, end)) = candidate.trunk_endpoints.get(&trunk_dbid) else {
        return (0, 0);
    };
    let start_side = reachable_without_edge(start, trunk_dbid, tree_edges, candidate);
    let end_side = reachable_without_edge(end, trunk_dbid, tree_edges, candidate);

    let sum_ingress = |side: &HashSet<SubterminalRef>| -> i64 {
        goal_terminals
            .iter()
            .filter(|(t, _)| side.contains(t))
            .map(|(_, d)| d.ingress)
            .sum()
    };
    let sum_egress = |side: &HashSet<SubterminalRef>| -> i64 {
        goal_terminals
            .iter()
            .filter(|(t, _)| side.contains(t))
            .map(|(_, d)| d.egress)
            .sum()
    };

    let load_up = sum_ingress(&start_side).min(sum_egress(&end_side));
    let load_down = sum_ingress(&end_side).min(sum_egress(&start_side));
    (load_up, load_down)
}

/// Flood-fills from `from` using only edges carried by `tree_edges` (plus the
/// zero-weight intra-subnetwork edges, which are part of the tree's own
/// connectivity rather than alternate paths), excluding `excluded_trunk` itself.
/// Restricting to the tree -- instead of the full candidate graph -- is what makes
/// this a true partition of the tree by the removed edge.
fn reachable_without_edge(
    from: &SubterminalRef,
    excluded_trunk: TrunkId,
    tree_edges: &[TrunkId],
    candidate: &CandidateGraph,
) -> HashSet<SubterminalRef> {
    let mut seen = HashSet::new();
    let mut stack = vec![from.clone()];
    seen.insert(from.clone());
    while let Some(node) = stack.pop() {
        let Some(edges) = candidate.adjacency.get(&node) else { continue };
        for edge in edges {
            if edge.via_trunk == Some(excluded_trunk) {
                continue;
            }
            if let Some(via) = edge.via_trunk {
                if !tree_edges.contains(&via) {
                    continue;
                }
            }
            if seen.insert(edge.to.clone()) {
                stack.push(edge.to.clone());
            }
        }
    }
    seen
}

/// Finds the trunk edge in the tree with the largest capacity shortfall, if any
/// (§4.4 step 4). Tie-break: lexicographically smallest trunk id among equal
/// shortfalls, for determinism.
async fn worst_shortfall(
    gateway: &Gateway,
    tree_edges: &[TrunkId],
    goal_terminals: &[(SubterminalRef, &CircuitDemand)],
) -> AggResult<Option<TrunkId>> {
    let mut tx = gateway.begin().await?;
    let mut worst: Option<(i64, TrunkId)> = None;
    for &dbid in tree_edges {
        let trunk = crate::persistence::trunks::get(&mut tx, gateway.names(), dbid)
            .await?
            .ok_or(crate::error::NotFound::UnknownTrunk)?;
        let candidate = graph::build(&mut tx, gateway.names(), 0).await?;
        let (load_up, load_down) = half_tree_load(&candidate, dbid, tree_edges, goal_terminals);
        let shortfall = (load_up - trunk.up_cap).max(0) + (load_down - trunk.down_cap).max(0);
        if shortfall > 0 {
            let better = worst.map(|(s, id)| (shortfall, dbid) > (s, id)).unwrap_or(true);
            if better {
                worst = Some((shortfall, dbid));
            }
        }
    }
    tx.rollback().await?;
    Ok(worst.map(|(_, id)| id))
}
