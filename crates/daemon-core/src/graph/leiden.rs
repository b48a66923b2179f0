//! Louvain-style local-moving community detection over a weighted
//! undirected projection of the memory link graph.
//!
//! One modularity-optimizing local-moving pass per level plus inter-level
//! aggregation — the part of Leiden this engine's retrieval needs
//! (non-overlapping, locally-optimal clusters), without the refinement
//! phase full Leiden adds on top of Louvain.

use std::collections::HashMap;

/// One undirected weighted edge in the community-detection projection.
#[derive(Debug, Clone, Copy)]
pub struct WeightedEdge {
    pub a: i64,
    pub b: i64,
    pub weight: f64,
}

struct Projection {
    neighbors: HashMap<i64, HashMap<i64, f64>>,
    degree: HashMap<i64, f64>,
    total_weight: f64,
}

fn build_projection(nodes: &[i64], edges: &[WeightedEdge]) -> Projection {
    let mut neighbors: HashMap<i64, HashMap<i64, f64>> =
        nodes.iter().map(|&n| (n, HashMap::new())).collect();
    let mut total_weight = 0.0;
    for e in edges {
        if e.a == e.b {
            continue;
        }
        *neighbors.entry(e.a).or_default().entry(e.b).or_insert(0.0) += e.weight;
        *neighbors.entry(e.b).or_default().entry(e.a).or_insert(0.0) += e.weight;
        total_weight += e.weight;
    }
    let degree = neighbors
        .iter()
        .map(|(&n, adj)| (n, adj.values().sum()))
        .collect();
    Projection {
        neighbors,
        degree,
        total_weight,
    }
}

const MAX_PASSES: u32 = 20;

/// Assigns each node in `nodes` to a community label (the id of one member
/// of that community) by greedy local-moving modularity optimization over
/// `edges`. Deterministic: nodes are visited in ascending id order each pass,
/// ties keep the node in its current community.
pub fn local_moving(nodes: &[i64], edges: &[WeightedEdge], resolution: f64) -> HashMap<i64, i64> {
    let mut sorted_nodes = nodes.to_vec();
    sorted_nodes.sort_unstable();
    sorted_nodes.dedup();

    let mut community: HashMap<i64, i64> = sorted_nodes.iter().map(|&n| (n, n)).collect();
    if sorted_nodes.len() <= 1 {
        return community;
    }

    let projection = build_projection(&sorted_nodes, edges);
    let m2 = (projection.total_weight * 2.0).max(f64::EPSILON);

    let mut community_degree: HashMap<i64, f64> = sorted_nodes
        .iter()
        .map(|&n| (n, *projection.degree.get(&n).unwrap_or(&0.0)))
        .collect();

    for _ in 0..MAX_PASSES {
        let mut moved = false;
        for &node in &sorted_nodes {
            let node_degree = *projection.degree.get(&node).unwrap_or(&0.0);
            let current_comm = community[&node];

            let mut weight_to_comm: HashMap<i64, f64> = HashMap::new();
            if let Some(adj) = projection.neighbors.get(&node) {
                for (&neighbor, &w) in adj {
                    let c = community[&neighbor];
                    *weight_to_comm.entry(c).or_default() += w;
                }
            }

            *community_degree.entry(current_comm).or_default() -= node_degree;

            let mut best_comm = current_comm;
            let mut best_gain = weight_to_comm.get(&current_comm).copied().unwrap_or(0.0)
                - resolution * community_degree.get(&current_comm).copied().unwrap_or(0.0) * node_degree / m2;

            for (&candidate, &w_to) in &weight_to_comm {
                if candidate == current_comm {
                    continue;
                }
                let sigma_tot = community_degree.get(&candidate).copied().unwrap_or(0.0);
                let gain = w_to - resolution * sigma_tot * node_degree / m2;
                if gain > best_gain + 1e-12 {
                    best_gain = gain;
                    best_comm = candidate;
                }
            }

            *community_degree.entry(best_comm).or_default() += node_degree;
            if best_comm != current_comm {
                community.insert(node, best_comm);
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }

    community
}

/// Builds the next-level node set and weighted edge list by collapsing each
/// community in `labels` into one super-node (keyed by its label). Edges
/// within a community are dropped; inter-community weights are summed.
pub fn aggregate(labels: &HashMap<i64, i64>, edges: &[WeightedEdge]) -> (Vec<i64>, Vec<WeightedEdge>) {
    let mut super_nodes: Vec<i64> = labels.values().copied().collect();
    super_nodes.sort_unstable();
    super_nodes.dedup();

    let mut merged: HashMap<(i64, i64), f64> = HashMap::new();
    for e in edges {
        let (Some(&ca), Some(&cb)) = (labels.get(&e.a), labels.get(&e.b)) else {
            continue;
        };
        if ca == cb {
            continue;
        }
        let key = if ca < cb { (ca, cb) } else { (cb, ca) };
        *merged.entry(key).or_default() += e.weight;
    }

    let super_edges = merged
        .into_iter()
        .map(|((a, b), weight)| WeightedEdge { a, b, weight })
        .collect();

    (super_nodes, super_edges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_disjoint_triangles_form_two_communities() {
        let nodes = vec![1, 2, 3, 4, 5, 6];
        let edges = vec![
            WeightedEdge { a: 1, b: 2, weight: 1.0 },
            WeightedEdge { a: 2, b: 3, weight: 1.0 },
            WeightedEdge { a: 1, b: 3, weight: 1.0 },
            WeightedEdge { a: 4, b: 5, weight: 1.0 },
            WeightedEdge { a: 5, b: 6, weight: 1.0 },
            WeightedEdge { a: 4, b: 6, weight: 1.0 },
        ];
        let labels = local_moving(&nodes, &edges, 1.0);
        assert_eq!(labels[&1], labels[&2]);
        assert_eq!(labels[&2], labels[&3]);
        assert_eq!(labels[&4], labels[&5]);
        assert_eq!(labels[&5], labels[&6]);
        assert_ne!(labels[&1], labels[&4]);
    }

    #[test]
    fn singleton_node_is_its_own_community() {
        let nodes = vec![1];
        let labels = local_moving(&nodes, &[], 1.0);
        assert_eq!(labels[&1], 1);
    }

    #[test]
    fn disconnected_node_stays_singleton() {
        let nodes = vec![1, 2, 3];
        let edges = vec![WeightedEdge { a: 1, b: 2, weight: 1.0 }];
        let labels = local_moving(&nodes, &edges, 1.0);
        assert_eq!(labels[&1], labels[&2]);
        assert_ne!(labels[&3], labels[&1]);
    }

    #[test]
    fn aggregate_drops_intra_community_edges_and_sums_inter() {
        let mut labels = HashMap::new();
        labels.insert(1, 1);
        labels.insert(2, 1);
        labels.insert(3, 3);
        let edges = vec![
            WeightedEdge { a: 1, b: 2, weight: 1.0 },
            WeightedEdge { a: 2, b: 3, weight: 2.0 },
        ];
        let (nodes, super_edges) = aggregate(&labels, &edges);
        assert_eq!(nodes, vec![1, 3]);
        assert_eq!(super_edges.len(), 1);
        assert_eq!(super_edges[0].weight, 2.0);
    }
}
