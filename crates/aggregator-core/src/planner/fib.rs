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

//! A small distance-vector forwarding-information base, computed privately by the
//! Planner (§4.4). Weights are always non-negative fixed delays and the candidate
//! graph may be small and cyclic, so a plain Bellman-Ford relaxation is enough; this
//! deliberately does not pull in a generic graph crate.

use std::collections::HashMap;
use std::hash::Hash;

/// `next_hop[v]` is the neighbour of `from` to step towards on the shortest path to
/// `v`, along with the total distance. Absent entries are unreachable.
pub struct Fib<V> {
    pub distance: HashMap<V, i64>,
    pub next_hop: HashMap<V, V>,
}

/// Runs single-source Bellman-Ford from `source` over `edges` (an adjacency list of
/// `(neighbour, weight)` pairs, assumed already symmetric if the underlying edge is
/// undirected). Terminates after at most `|vertices| - 1` relaxation passes.
pub fn relax<V: Eq + Hash + Clone>(source: &V, adjacency: &HashMap<V, Vec<(V, i64)>>) -> Fib<V> {
    let mut distance: HashMap<V, i64> = HashMap::new();
    let mut next_hop: HashMap<V, V> = HashMap::new();
    distance.insert(source.clone(), 0);

    let vertex_count = adjacency.len().max(1);
    for _ in 0..vertex_count {
        let mut changed = false;
        for (u, neighbours) in adjacency {
            let Some(&du) = distance.get(u) else { continue };
            for (v, weight) in neighbours {
                let candidate = du + weight;
                let better = distance.get(v).map(|&dv| candidate < dv).unwrap_or(true);
                if better {
                    distance.insert(v.clone(), candidate);
                    // the first hop from `source` towards `v` is `u`'s own first hop,
                    // or `u` itself when `u == source`.
                    let hop = next_hop.get(u).cloned().unwrap_or_else(|| u.clone());
                    next_hop.insert(v.clone(), hop);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    Fib { distance, next_hop }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_shortest_path_over_two_hops() {
        let mut adjacency = HashMap::new();
        adjacency.insert("a", vec![("b", 5), ("c", 1)]);
        adjacency.insert("c", vec![("a", 1), ("b", 1)]);
        adjacency.insert("b", vec![("a", 5), ("c", 1)]);

        let fib = relax(&"a", &adjacency);
        assert_eq!(fib.distance[&"b"], 2);
        assert_eq!(fib.next_hop[&"b"], "c");
    }

    #[test]
    fn unreachable_vertex_has_no_entry() {
        let mut adjacency = HashMap::new();
        adjacency.insert("a", vec![("b", 1)]);
        adjacency.insert("b", vec![("a", 1)]);
        adjacency.insert("z", vec![]);

        let fib = relax(&"a", &adjacency);
        assert!(!fib.distance.contains_key(&"z"));
    }
}
