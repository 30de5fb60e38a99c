//! Conversation multigraph (spec §3, §4.C step 3, §9 "Cyclic graphs").

use std::collections::HashMap;

/// A directed edge carrying the transition condition that produced it (an intent name, a
/// condition expression, or the empty string for an unconditional transition).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub to: usize,
    pub label: String,
}

/// A directed multigraph over dialogs/pages. Cycles are allowed (confirmation
/// sub-dialogs, "anything else?" loops) — simple-path enumeration below is capped at
/// `max_paths` so it terminates regardless (spec §9).
#[derive(Debug, Clone, Default)]
pub struct ConversationGraph {
    node_names: Vec<String>,
    name_to_id: HashMap<String, usize>,
    adjacency: Vec<Vec<Edge>>,
}

impl ConversationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the node's id, creating it if it doesn't exist yet.
    pub fn ensure_node(&mut self, name: &str) -> usize {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = self.node_names.len();
        self.node_names.push(name.to_string());
        self.name_to_id.insert(name.to_string(), id);
        self.adjacency.push(Vec::new());
        id
    }

    pub fn node_id(&self, name: &str) -> Option<usize> {
        self.name_to_id.get(name).copied()
    }

    pub fn node_name(&self, id: usize) -> Option<&str> {
        self.node_names.get(id).map(String::as_str)
    }

    pub fn add_edge(&mut self, from: &str, to: &str, label: impl Into<String>) {
        let from_id = self.ensure_node(from);
        let to_id = self.ensure_node(to);
        self.adjacency[from_id].push(Edge {
            to: to_id,
            label: label.into(),
        });
    }

    pub fn node_count(&self) -> usize {
        self.node_names.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &String> {
        self.node_names.iter()
    }

    pub fn edges_from(&self, id: usize) -> &[Edge] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Enumerates simple paths from `from` to `to` (both exclusive endpoints in the
    /// result), capped at `max_paths` total paths explored so cyclic graphs still
    /// terminate (spec §9). Returns node ids on each path, excluding `from` and `to`
    /// themselves.
    pub fn simple_path_interiors(&self, from: usize, to: usize, max_paths: usize) -> Vec<Vec<usize>> {
        let mut results = Vec::new();
        let mut visited = vec![false; self.node_count()];
        let mut path = Vec::new();
        visited[from] = true;
        self.dfs_paths(from, to, &mut visited, &mut path, &mut results, max_paths);
        results
    }

    fn dfs_paths(
        &self,
        current: usize,
        target: usize,
        visited: &mut [bool],
        path: &mut Vec<usize>,
        results: &mut Vec<Vec<usize>>,
        max_paths: usize,
    ) {
        if results.len() >= max_paths {
            return;
        }
        for edge in self.edges_from(current) {
            if results.len() >= max_paths {
                return;
            }
            if edge.to == target {
                results.push(path.clone());
                continue;
            }
            if visited[edge.to] {
                continue;
            }
            visited[edge.to] = true;
            path.push(edge.to);
            self.dfs_paths(edge.to, target, visited, path, results, max_paths);
            path.pop();
            visited[edge.to] = false;
        }
    }

    /// `P(d)`: the set of node ids appearing on any simple path from `d` to `terminal`,
    /// exclusive of both endpoints (spec §4.C step 4).
    pub fn reachable_interior(&self, from: &str, terminal: &str, max_paths: usize) -> Vec<String> {
        let (Some(from_id), Some(term_id)) = (self.node_id(from), self.node_id(terminal)) else {
            return Vec::new();
        };
        let mut seen = std::collections::HashSet::new();
        for path in self.simple_path_interiors(from_id, term_id, max_paths) {
            seen.extend(path);
        }
        let mut names: Vec<String> = seen.into_iter().filter_map(|id| self.node_name(id).map(str::to_string)).collect();
        names.sort();
        names
    }

    /// Derived invariant of spec §3: every intent-bearing node has at least one simple
    /// path to `terminal`.
    pub fn has_path_to_terminal(&self, from: &str, terminal: &str, max_paths: usize) -> bool {
        if from == terminal {
            return true;
        }
        let (Some(from_id), Some(term_id)) = (self.node_id(from), self.node_id(terminal)) else {
            return false;
        };
        !self.simple_path_interiors(from_id, term_id, max_paths).is_empty()
            || self.edges_from(from_id).iter().any(|e| e.to == term_id)
    }
}
