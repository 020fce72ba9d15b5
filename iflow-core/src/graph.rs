//! Flow graph traversal
//!
//! Arena-backed directed graph over element ids, shared by the semantic
//! validator (blueprint components) and the sanitizer (document flow nodes).

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed, VisitMap, Walker};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct FlowGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl FlowGraph {
    /// Build from node ids and (source, target) edges. Edges naming an
    /// unknown node are skipped; duplicate node ids collapse to one node.
    pub fn new<'a>(
        nodes: impl IntoIterator<Item = &'a str>,
        edges: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut fg = FlowGraph::default();
        for id in nodes {
            if !fg.index.contains_key(id) {
                let ix = fg.graph.add_node(id.to_string());
                fg.index.insert(id.to_string(), ix);
            }
        }
        for (source, target) in edges {
            if let (Some(&s), Some(&t)) = (fg.index.get(source), fg.index.get(target)) {
                fg.graph.add_edge(s, t, ());
            }
        }
        fg
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn in_degree(&self, id: &str) -> usize {
        self.degree(id, Direction::Incoming)
    }

    pub fn out_degree(&self, id: &str) -> usize {
        self.degree(id, Direction::Outgoing)
    }

    /// No incoming and no outgoing edges.
    pub fn is_isolated(&self, id: &str) -> bool {
        self.in_degree(id) == 0 && self.out_degree(id) == 0
    }

    fn degree(&self, id: &str, dir: Direction) -> usize {
        self.index
            .get(id)
            .map(|&ix| self.graph.neighbors_directed(ix, dir).count())
            .unwrap_or(0)
    }

    /// Everything reachable from any root (roots included), in one traversal.
    pub fn reachable_from(&self, roots: &[&str]) -> HashSet<String> {
        let starts = self.indices(roots);
        let Some((&first, rest)) = starts.split_first() else {
            return HashSet::new();
        };
        let mut bfs = Bfs::new(&self.graph, first);
        for &ix in rest {
            if bfs.discovered.visit(ix) {
                bfs.stack.push_back(ix);
            }
        }
        bfs.iter(&self.graph)
            .map(|ix| self.graph[ix].clone())
            .collect()
    }

    /// Everything that can reach any sink (sinks included), in one backward traversal.
    pub fn reaching(&self, sinks: &[&str]) -> HashSet<String> {
        let starts = self.indices(sinks);
        let Some((&first, rest)) = starts.split_first() else {
            return HashSet::new();
        };
        let reversed = Reversed(&self.graph);
        let mut bfs = Bfs::new(reversed, first);
        for &ix in rest {
            if bfs.discovered.visit(ix) {
                bfs.stack.push_back(ix);
            }
        }
        bfs.iter(reversed)
            .map(|ix| self.graph[ix].clone())
            .collect()
    }

    fn indices(&self, ids: &[&str]) -> Vec<NodeIndex> {
        ids.iter().filter_map(|id| self.index.get(*id).copied()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> FlowGraph {
        FlowGraph::new(
            ["start", "a", "b", "end", "island"],
            [("start", "a"), ("a", "b"), ("b", "end")],
        )
    }

    #[test]
    fn test_forward_reachability() {
        let g = chain();
        let reached = g.reachable_from(&["start"]);
        assert!(reached.contains("end"));
        assert!(!reached.contains("island"));
        assert_eq!(reached.len(), 4);
    }

    #[test]
    fn test_backward_reachability() {
        let g = FlowGraph::new(
            ["start", "a", "dead", "end"],
            [("start", "a"), ("a", "end"), ("start", "dead")],
        );
        let reaching = g.reaching(&["end"]);
        assert!(reaching.contains("start"));
        assert!(!reaching.contains("dead"));
    }

    #[test]
    fn test_multiple_roots_single_traversal() {
        let g = FlowGraph::new(["a", "b", "c"], [("a", "c")]);
        let reached = g.reachable_from(&["a", "b", "a"]);
        assert_eq!(reached.len(), 3);
    }

    #[test]
    fn test_degrees_and_isolation() {
        let g = chain();
        assert_eq!(g.in_degree("start"), 0);
        assert_eq!(g.out_degree("start"), 1);
        assert!(g.is_isolated("island"));
        assert!(!g.is_isolated("a"));
        assert_eq!(g.out_degree("unknown"), 0);
    }

    #[test]
    fn test_unknown_roots_yield_empty() {
        let g = chain();
        assert!(g.reachable_from(&["nope"]).is_empty());
        assert!(g.reaching(&[]).is_empty());
    }
}
