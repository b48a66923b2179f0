//! In-memory adjacency index mirroring `Store` links, plus the
//! neighbor/chain/subgraph/evolution/community-detection operations built
//! on top of it.
//!
//! An arena of ids plus a separate adjacency index: links never store
//! references between memories directly, which keeps cyclic graphs (a
//! `supersedes` loop, say) representable without lifetime gymnastics.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use chrono::Utc;

use crate::error::{EngineError, Result};
use crate::memory::{Community, Link, Memory, Relationship};
use crate::storage::Store;

use super::leiden::{self, WeightedEdge};

/// Member contents folded into a community's re-embedded summary text.
const SUMMARY_TOP_N: usize = 5;

#[derive(Default)]
struct Adjacency {
    out_edges: HashMap<i64, Vec<(i64, Relationship)>>,
    in_edges: HashMap<i64, Vec<(i64, Relationship)>>,
}

impl Adjacency {
    fn clear(&mut self) {
        self.out_edges.clear();
        self.in_edges.clear();
    }

    fn insert(&mut self, link: &Link) {
        self.out_edges
            .entry(link.source)
            .or_default()
            .push((link.target, link.relationship));
        self.in_edges
            .entry(link.target)
            .or_default()
            .push((link.source, link.relationship));
    }

    fn remove(&mut self, source: i64, target: i64, relationship: Relationship) {
        if let Some(v) = self.out_edges.get_mut(&source) {
            v.retain(|(t, r)| !(*t == target && *r == relationship));
        }
        if let Some(v) = self.in_edges.get_mut(&target) {
            v.retain(|(s, r)| !(*s == source && *r == relationship));
        }
    }
}

/// Subgraph result: node ids in BFS-discovery order, and every link whose
/// endpoints are both in the returned node set.
#[derive(Debug, Clone, Default)]
pub struct Subgraph {
    pub nodes: Vec<i64>,
    pub links: Vec<Link>,
}

/// In-memory relationship graph over memory ids, rebuilt from `Store::all_links`
/// at startup and kept current by `add_link`/`remove_link` on every mutation.
pub struct GraphEngine {
    adjacency: Mutex<Adjacency>,
}

impl GraphEngine {
    pub fn new() -> Self {
        Self {
            adjacency: Mutex::new(Adjacency::default()),
        }
    }

    /// Full reset from `links` — called at startup and after any repair.
    pub fn rebuild(&self, links: &[Link]) {
        let mut adj = self.adjacency.lock().unwrap_or_else(|e| e.into_inner());
        adj.clear();
        for link in links {
            adj.insert(link);
        }
    }

    pub fn add_link(&self, link: &Link) {
        self.adjacency
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(link);
    }

    pub fn remove_link(&self, source: i64, target: i64, relationship: Relationship) {
        self.adjacency
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(source, target, relationship);
    }

    /// Outgoing and incoming neighbors of `id`, optionally filtered by
    /// `relationship`, up to `depth` hops (BFS, undirected traversal of the
    /// directed edges — a neighbor reached via either direction counts).
    pub fn neighbors(&self, id: i64, relationship: Option<Relationship>, depth: usize) -> Vec<i64> {
        let adj = self.adjacency.lock().unwrap_or_else(|e| e.into_inner());
        let depth = depth.max(1);
        let mut seen = HashSet::new();
        seen.insert(id);
        let mut frontier = vec![id];
        let mut out = Vec::new();

        for _ in 0..depth {
            let mut next = Vec::new();
            for &node in &frontier {
                for (neighbor, rel) in adjacent_ids(&adj, node) {
                    if relationship.is_some_and(|r| r != rel) {
                        continue;
                    }
                    if seen.insert(neighbor) {
                        out.push(neighbor);
                        next.push(neighbor);
                    }
                }
            }
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }
        out
    }

    /// Shortest path `from -> to` within `max_depth` hops via bidirectional
    /// BFS over the undirected projection, breaking ties by the lowest
    /// maximum id on the path, then the lowest sum of ids.
    pub fn chain(&self, from: i64, to: i64, max_depth: usize) -> Option<Vec<i64>> {
        if from == to {
            return Some(vec![from]);
        }
        let adj = self.adjacency.lock().unwrap_or_else(|e| e.into_inner());

        let mut candidates: Vec<Vec<i64>> = Vec::new();
        let mut best_len = usize::MAX;

        // Level-by-level BFS collecting every shortest path (not just the
        // first found), so the path-id tie-break below sees all candidates.
        let mut frontier: Vec<Vec<i64>> = vec![vec![from]];
        let mut visited_at: HashMap<i64, usize> = HashMap::from([(from, 0)]);
        for depth in 1..=max_depth {
            let mut next_frontier = Vec::new();
            for path in &frontier {
                let last = *path.last().unwrap();
                for (neighbor, _rel) in adjacent_ids(&adj, last) {
                    if path.contains(&neighbor) {
                        continue;
                    }
                    let already = visited_at.get(&neighbor).copied();
                    if already.is_some_and(|d| d < depth) {
                        continue;
                    }
                    visited_at.insert(neighbor, depth);
                    let mut extended = path.clone();
                    extended.push(neighbor);
                    if neighbor == to {
                        candidates.push(extended.clone());
                        best_len = best_len.min(extended.len());
                    }
                    next_frontier.push(extended);
                }
            }
            if !candidates.is_empty() {
                break;
            }
            frontier = next_frontier;
            if frontier.is_empty() {
                break;
            }
        }

        candidates.retain(|p| p.len() == best_len);
        candidates.into_iter().min_by(|a, b| {
            let max_a = a.iter().copied().max().unwrap_or(0);
            let max_b = b.iter().copied().max().unwrap_or(0);
            max_a
                .cmp(&max_b)
                .then_with(|| a.iter().sum::<i64>().cmp(&b.iter().sum::<i64>()))
        })
    }

    /// BFS expansion from `seed_ids` out to `depth` hops; returns the
    /// discovered node set (seeds included) and every link between them.
    pub fn subgraph(&self, seed_ids: &[i64], depth: usize) -> Subgraph {
        let adj = self.adjacency.lock().unwrap_or_else(|e| e.into_inner());
        let mut seen: HashSet<i64> = seed_ids.iter().copied().collect();
        let mut frontier: Vec<i64> = seed_ids.to_vec();
        let mut nodes: Vec<i64> = seed_ids.to_vec();

        for _ in 0..depth {
            let mut next = Vec::new();
            for &node in &frontier {
                for (neighbor, _rel) in adjacent_ids(&adj, node) {
                    if seen.insert(neighbor) {
                        nodes.push(neighbor);
                        next.push(neighbor);
                    }
                }
            }
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }

        let node_set: HashSet<i64> = nodes.iter().copied().collect();
        let mut links = Vec::new();
        for &node in &nodes {
            if let Some(edges) = adj.out_edges.get(&node) {
                for &(target, rel) in edges {
                    if node_set.contains(&target) {
                        links.push(Link {
                            source: node,
                            target,
                            relationship: rel,
                            created_at: Utc::now(),
                        });
                    }
                }
            }
        }

        Subgraph { nodes, links }
    }

    /// 2-hop neighborhood from `seeds`, flattened — the complex-query graph
    /// candidate source in `HybridRetriever`.
    pub fn expand_from_seeds(&self, seeds: &[i64]) -> Vec<i64> {
        self.subgraph(seeds, 2)
            .nodes
            .into_iter()
            .filter(|id| !seeds.contains(id))
            .collect()
    }

    /// Leiden-style community detection over the current adjacency.
    /// `store` supplies member content/importance for summaries;
    /// `embed_summary` re-embeds each summary (`None` when the embeddings
    /// feature is disabled — communities still get a text summary, just no
    /// `summary_vector`).
    pub fn detect_communities(
        &self,
        store: &Store,
        min_size: usize,
        resolution: f64,
        embed_summary: impl Fn(&str) -> Option<Vec<f32>>,
    ) -> Result<Vec<Community>> {
        let memories = store.iter_memories(&Default::default())?;
        let node_ids: Vec<i64> = memories.iter().map(|m| m.id).collect();
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let by_id: HashMap<i64, Memory> = memories.into_iter().map(|m| (m.id, m)).collect();

        let all_links = store.all_links()?;
        let edges: Vec<WeightedEdge> = all_links
            .iter()
            .filter(|l| by_id.contains_key(&l.source) && by_id.contains_key(&l.target))
            .map(|l| WeightedEdge {
                a: l.source,
                b: l.target,
                weight: l.relationship.community_weight(),
            })
            .collect();

        let level0_labels = leiden::local_moving(&node_ids, &edges, resolution);
        let mut level0_groups: HashMap<i64, Vec<i64>> = HashMap::new();
        for &id in &node_ids {
            level0_groups.entry(level0_labels[&id]).or_default().push(id);
        }

        let mut next_id: i64 = 1;
        let now = Utc::now();
        let mut level0_communities: Vec<Community> = Vec::new();
        let mut label_to_community_id: HashMap<i64, i64> = HashMap::new();

        for (&label, members) in &level0_groups {
            let id = next_id;
            next_id += 1;
            label_to_community_id.insert(label, id);
            level0_communities.push(Community {
                id,
                level: 0,
                parent: None,
                members: members.clone(),
                summary: summarize(members, &by_id, embed_summary_none_hint()),
                summary_vector: None,
                freshness: now,
            });
        }
        // Re-embed now that ids are assigned (kept as a second pass so the
        // borrow of `by_id` above stays simple).
        for community in &mut level0_communities {
            community.summary = summarize(&community.members, &by_id, None);
            community.summary_vector = embed_summary(&community.summary);
        }

        let (super_nodes, super_edges) = leiden::aggregate(&level0_labels, &edges);
        let level1_labels = leiden::local_moving(&super_nodes, &super_edges, resolution);

        // Group level-0 communities by their level-1 cluster.
        let mut level1_groups: HashMap<i64, Vec<i64>> = HashMap::new(); // level1 raw label -> level0 community ids
        for (&label, &community_id) in &label_to_community_id {
            let level1_label = *level1_labels.get(&label).unwrap_or(&label);
            level1_groups.entry(level1_label).or_default().push(community_id);
        }

        let community_by_id: HashMap<i64, &Community> =
            level0_communities.iter().map(|c| (c.id, c)).collect();

        let mut misc_members: Vec<i64> = Vec::new();
        let mut misc_level0_ids: Vec<i64> = Vec::new();
        let mut level1_communities: Vec<Community> = Vec::new();
        let mut level0_parent: HashMap<i64, i64> = HashMap::new();

        for level0_ids in level1_groups.values() {
            let total_members: usize = level0_ids
                .iter()
                .filter_map(|id| community_by_id.get(id))
                .map(|c| c.members.len())
                .sum();

            if total_members < min_size {
                misc_level0_ids.extend(level0_ids.iter().copied());
                for id in level0_ids {
                    if let Some(c) = community_by_id.get(id) {
                        misc_members.extend(c.members.iter().copied());
                    }
                }
                continue;
            }

            let members: Vec<i64> = level0_ids
                .iter()
                .filter_map(|id| community_by_id.get(id))
                .flat_map(|c| c.members.iter().copied())
                .collect();
            let community_id = next_id;
            next_id += 1;
            for id in level0_ids {
                level0_parent.insert(*id, community_id);
            }
            level1_communities.push(Community {
                id: community_id,
                level: 1,
                parent: None,
                members: members.clone(),
                summary: summarize(&members, &by_id, None),
                summary_vector: embed_summary(&summarize(&members, &by_id, None)),
                freshness: now,
            });
        }

        if !misc_members.is_empty() {
            let misc_id = next_id;
            level0_parent.extend(misc_level0_ids.into_iter().map(|id| (id, misc_id)));
            level1_communities.push(Community {
                id: misc_id,
                level: 1,
                parent: None,
                members: misc_members.clone(),
                summary: "misc".to_string(),
                summary_vector: embed_summary("misc"),
                freshness: now,
            });
        }

        for community in &mut level0_communities {
            community.parent = level0_parent.get(&community.id).copied();
        }

        let mut all = level0_communities;
        all.extend(level1_communities);
        Ok(all)
    }
}

impl Default for GraphEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn adjacent_ids(adj: &Adjacency, node: i64) -> Vec<(i64, Relationship)> {
    let mut out = adj.out_edges.get(&node).cloned().unwrap_or_default();
    if let Some(ins) = adj.in_edges.get(&node) {
        out.extend(ins.iter().copied());
    }
    out
}

fn embed_summary_none_hint() -> Option<&'static dyn Fn(&str) -> Option<Vec<f32>>> {
    None
}

/// Concatenates the top `SUMMARY_TOP_N` member contents by importance.
fn summarize(members: &[i64], by_id: &HashMap<i64, Memory>, _unused: Option<&dyn Fn(&str) -> Option<Vec<f32>>>) -> String {
    let mut scored: Vec<&Memory> = members.iter().filter_map(|id| by_id.get(id)).collect();
    scored.sort_by(|a, b| b.importance_score.partial_cmp(&a.importance_score).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(SUMMARY_TOP_N)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Ordered list of memories mentioning `entity_name`, sorted by `valid_time`,
/// with `superseded_by` annotations.
pub fn evolution(store: &Store, entity_name: &str) -> Result<Vec<Memory>> {
    if entity_name.trim().is_empty() {
        return Err(EngineError::InvalidArgument("entity_name must not be empty".into()));
    }
    let mut matching: Vec<Memory> = store
        .iter_memories(&Default::default())?
        .into_iter()
        .filter(|m| m.entities.contains(entity_name))
        .collect();
    matching.sort_by_key(|m| m.valid_time);
    Ok(matching)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Relationship;

    fn link(source: i64, target: i64, relationship: Relationship) -> Link {
        Link {
            source,
            target,
            relationship,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn neighbors_reach_both_directions() {
        let engine = GraphEngine::new();
        engine.rebuild(&[link(1, 2, Relationship::LedTo)]);
        let n = engine.neighbors(2, None, 1);
        assert!(n.contains(&1));
    }

    #[test]
    fn remove_link_drops_edge() {
        let engine = GraphEngine::new();
        engine.rebuild(&[link(1, 2, Relationship::RelatedTo)]);
        engine.remove_link(1, 2, Relationship::RelatedTo);
        assert!(engine.neighbors(1, None, 1).is_empty());
    }

    #[test]
    fn chain_finds_shortest_path() {
        let engine = GraphEngine::new();
        engine.rebuild(&[
            link(1, 2, Relationship::LedTo),
            link(2, 3, Relationship::LedTo),
            link(1, 4, Relationship::LedTo),
            link(4, 3, Relationship::LedTo),
        ]);
        let path = engine.chain(1, 3, 5).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(*path.first().unwrap(), 1);
        assert_eq!(*path.last().unwrap(), 3);
    }

    #[test]
    fn subgraph_includes_only_reachable_links() {
        let engine = GraphEngine::new();
        engine.rebuild(&[link(1, 2, Relationship::RelatedTo), link(3, 4, Relationship::RelatedTo)]);
        let sub = engine.subgraph(&[1], 2);
        assert!(sub.nodes.contains(&1));
        assert!(sub.nodes.contains(&2));
        assert!(!sub.nodes.contains(&3));
    }

    #[test]
    fn expand_from_seeds_excludes_seeds_themselves() {
        let engine = GraphEngine::new();
        engine.rebuild(&[link(1, 2, Relationship::RelatedTo)]);
        let expanded = engine.expand_from_seeds(&[1]);
        assert!(expanded.contains(&2));
        assert!(!expanded.contains(&1));
    }
}
