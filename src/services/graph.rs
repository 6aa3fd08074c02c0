use std::collections::{HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::models::assignment::Assignment;
use crate::models::member::Member;

/// A member as seen by graph queries.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GraphNode {
    #[serde(skip_serializing)]
    pub id: Uuid,
    pub name: String,
    pub code_name: Option<String>,
}

impl GraphNode {
    pub fn display_name(&self) -> &str {
        self.code_name.as_deref().unwrap_or(&self.name)
    }

    fn sort_key(&self) -> String {
        self.display_name().to_lowercase()
    }
}

pub struct Neighbors<'a> {
    pub gives_to: &'a GraphNode,
    pub receives_from: &'a GraphNode,
}

/// The giver→receiver relation of a frozen group as an explicit adjacency
/// structure. Every node has out-degree and in-degree exactly one, so the
/// graph is a disjoint union of simple cycles of length ≥ 2 covering every
/// member, and traversal is linear with trivially bounded termination.
pub struct RelationshipGraph {
    nodes: HashMap<Uuid, GraphNode>,
    succ: HashMap<Uuid, Uuid>,
    pred: HashMap<Uuid, Uuid>,
}

impl RelationshipGraph {
    pub fn build(members: &[Member], assignments: &[Assignment]) -> Self {
        let nodes = members
            .iter()
            .map(|m| {
                (
                    m.id,
                    GraphNode {
                        id: m.id,
                        name: m.name.clone(),
                        code_name: m.code_name.clone(),
                    },
                )
            })
            .collect();
        let mut succ = HashMap::new();
        let mut pred = HashMap::new();
        for a in assignments {
            succ.insert(a.giver_id, a.receiver_id);
            pred.insert(a.receiver_id, a.giver_id);
        }
        Self { nodes, succ, pred }
    }

    /// True when no draw exists (or it was reset).
    pub fn is_empty(&self) -> bool {
        self.succ.is_empty()
    }

    pub fn node(&self, id: Uuid) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    /// The single outgoing and single incoming edge of a member.
    pub fn neighbors_of(&self, id: Uuid) -> Option<Neighbors<'_>> {
        let gives_to = self.nodes.get(self.succ.get(&id)?)?;
        let receives_from = self.nodes.get(self.pred.get(&id)?)?;
        Some(Neighbors {
            gives_to,
            receives_from,
        })
    }

    /// The full cycle containing `id`, starting there and following
    /// outgoing edges until the walk closes. At most N steps; nodes outside
    /// the cycle are never touched. Empty when `id` has no assignment.
    pub fn chain_of(&self, id: Uuid) -> Vec<&GraphNode> {
        let mut chain = Vec::new();
        let mut current = id;
        for _ in 0..self.nodes.len() {
            let Some(node) = self.nodes.get(&current) else {
                break;
            };
            let Some(&next) = self.succ.get(&current) else {
                break;
            };
            chain.push(node);
            if next == id {
                return chain;
            }
            current = next;
        }
        // The walk did not close: no draw for this member.
        Vec::new()
    }

    /// Cycle decomposition in deterministic order: each cycle starts at its
    /// lexicographically-smallest member and cycles are listed by that key.
    pub fn cycles(&self) -> Vec<Vec<&GraphNode>> {
        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut cycles = Vec::new();
        for node in self.nodes_sorted() {
            if visited.contains(&node.id) || !self.succ.contains_key(&node.id) {
                continue;
            }
            let chain = self.chain_of(node.id);
            for n in &chain {
                visited.insert(n.id);
            }
            if !chain.is_empty() {
                cycles.push(chain);
            }
        }
        cycles
    }

    /// All members in render order: code name when present, else real name.
    pub fn nodes_sorted(&self) -> Vec<&GraphNode> {
        let mut nodes: Vec<&GraphNode> = self.nodes.values().collect();
        nodes.sort_by_key(|n| n.sort_key());
        nodes
    }

    /// Every giver→receiver edge, ordered by giver.
    pub fn edges_sorted(&self) -> Vec<(&GraphNode, &GraphNode)> {
        let mut edges: Vec<(&GraphNode, &GraphNode)> = self
            .succ
            .iter()
            .filter_map(|(g, r)| Some((self.nodes.get(g)?, self.nodes.get(r)?)))
            .collect();
        edges.sort_by_key(|(g, _)| g.sort_key());
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn member(name: &str, code_name: Option<&str>) -> Member {
        Member {
            id: Uuid::new_v4(),
            group_id: Uuid::nil(),
            member_code: Uuid::new_v4(),
            name: name.to_string(),
            code_name: code_name.map(str::to_string),
            joined_at: Utc::now(),
        }
    }

    fn edge(giver: &Member, receiver: &Member) -> Assignment {
        Assignment {
            id: Uuid::new_v4(),
            group_id: Uuid::nil(),
            giver_id: giver.id,
            receiver_id: receiver.id,
            created_at: Utc::now(),
        }
    }

    /// Two cycles: a ↔ b and c → d → e → c.
    fn two_cycle_graph() -> (Vec<Member>, Vec<Assignment>) {
        let members: Vec<Member> = ["alice", "bob", "carol", "dave", "erin"]
            .iter()
            .map(|n| member(n, None))
            .collect();
        let assignments = vec![
            edge(&members[0], &members[1]),
            edge(&members[1], &members[0]),
            edge(&members[2], &members[3]),
            edge(&members[3], &members[4]),
            edge(&members[4], &members[2]),
        ];
        (members, assignments)
    }

    #[test]
    fn neighbors_are_the_two_incident_edges() {
        let (members, assignments) = two_cycle_graph();
        let graph = RelationshipGraph::build(&members, &assignments);
        let n = graph.neighbors_of(members[3].id).unwrap();
        assert_eq!(n.gives_to.name, "erin");
        assert_eq!(n.receives_from.name, "carol");
    }

    #[test]
    fn chain_closes_and_stays_inside_its_cycle() {
        let (members, assignments) = two_cycle_graph();
        let graph = RelationshipGraph::build(&members, &assignments);

        let chain = graph.chain_of(members[2].id);
        let names: Vec<&str> = chain.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["carol", "dave", "erin"]);

        // Walking neighbors_of from any chain member returns in chain-length steps.
        let mut current = members[3].id;
        for _ in 0..chain.len() {
            current = graph.neighbors_of(current).unwrap().gives_to.id;
        }
        assert_eq!(current, members[3].id);
    }

    #[test]
    fn chain_of_unknown_member_is_empty() {
        let (members, assignments) = two_cycle_graph();
        let graph = RelationshipGraph::build(&members, &assignments);
        assert!(graph.chain_of(Uuid::new_v4()).is_empty());
    }

    #[test]
    fn empty_graph_after_reset_has_no_chains() {
        let (members, _) = two_cycle_graph();
        let graph = RelationshipGraph::build(&members, &[]);
        assert!(graph.is_empty());
        assert!(graph.chain_of(members[0].id).is_empty());
        assert!(graph.neighbors_of(members[0].id).is_none());
    }

    #[test]
    fn cycles_cover_every_member_exactly_once() {
        let (members, assignments) = two_cycle_graph();
        let graph = RelationshipGraph::build(&members, &assignments);
        let cycles = graph.cycles();
        assert_eq!(cycles.len(), 2);
        let total: usize = cycles.iter().map(Vec::len).sum();
        assert_eq!(total, members.len());
        let mut ids: Vec<Uuid> = cycles.iter().flatten().map(|n| n.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), members.len());
    }

    #[test]
    fn render_order_prefers_code_names() {
        let members = vec![
            member("zoe", Some("Blitzen")),
            member("adam", None),
            member("mia", Some("Comet")),
        ];
        let graph = RelationshipGraph::build(&members, &[]);
        let order: Vec<&str> = graph
            .nodes_sorted()
            .iter()
            .map(|n| n.display_name())
            .collect();
        assert_eq!(order, vec!["adam", "Blitzen", "Comet"]);
    }
}
