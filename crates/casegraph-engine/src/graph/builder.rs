use std::collections::{BTreeSet, HashMap, HashSet};

use casegraph_core::error::GraphError;

use super::edge::Edge;
use super::node::Node;

/// Structural role a node plays in the graph. A node can hold several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    /// No predecessors; runs first on the initial state.
    Source,
    /// Exactly one predecessor.
    Transform,
    /// More than one successor; its successors run concurrently.
    FanOutOrigin,
    /// More than one predecessor; waits for all of them.
    Join,
    /// No successors.
    Terminal,
}

/// A node whose successors start together once it completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOut {
    pub origin: String,
    pub branches: Vec<String>,
}

/// A node that waits for every one of its predecessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub node: String,
    pub predecessors: Vec<String>,
}

/// Collects nodes and edges, then validates them into a [`WorkflowGraph`].
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    entries: Vec<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push(Edge::new(from, to));
        self
    }

    /// One edge from `origin` to each branch.
    pub fn fan_out<S: Into<String>>(
        mut self,
        origin: &str,
        branches: impl IntoIterator<Item = S>,
    ) -> Self {
        for branch in branches {
            self.edges.push(Edge::new(origin, branch));
        }
        self
    }

    /// One edge from each predecessor into `target`.
    pub fn join<S: Into<String>>(
        mut self,
        predecessors: impl IntoIterator<Item = S>,
        target: &str,
    ) -> Self {
        for pred in predecessors {
            self.edges.push(Edge::new(pred, target));
        }
        self
    }

    /// Declare an entry point.
    ///
    /// With no declared entries every node without predecessors is a source.
    /// Once any entry is declared, nodes not reachable from the entries are
    /// rejected as unreachable.
    pub fn entry(mut self, id: impl Into<String>) -> Self {
        self.entries.push(id.into());
        self
    }

    /// Validate and freeze the graph.
    pub fn build(self) -> Result<WorkflowGraph, GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::EmptyGraph);
        }

        let mut index = HashMap::with_capacity(self.nodes.len());
        for (i, node) in self.nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }

        let n = self.nodes.len();
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut succs: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut seen = HashSet::new();

        for edge in &self.edges {
            let lookup = |id: &str| {
                index.get(id).copied().ok_or_else(|| GraphError::UnknownNode {
                    edge_from: edge.from.clone(),
                    edge_to: edge.to.clone(),
                    missing: id.to_string(),
                })
            };
            let from = lookup(edge.from.as_str())?;
            let to = lookup(edge.to.as_str())?;
            if from == to {
                return Err(GraphError::SelfLoop(edge.from.clone()));
            }
            // Repeated edges add nothing.
            if seen.insert((from, to)) {
                succs[from].push(to);
                preds[to].push(from);
            }
        }
        for list in preds.iter_mut().chain(succs.iter_mut()) {
            list.sort_unstable();
        }

        let order = topological_order(&preds, &succs);
        if order.len() < n {
            let placed: HashSet<usize> = order.iter().copied().collect();
            let leftover: Vec<usize> = (0..n).filter(|i| !placed.contains(i)).collect();
            let on_cycle: Vec<String> = leftover
                .iter()
                .filter(|&&i| reaches_itself(i, &succs, &placed))
                .map(|&i| self.nodes[i].id.clone())
                .collect();
            return Err(GraphError::Cycle { nodes: on_cycle });
        }

        let mut entries = Vec::with_capacity(self.entries.len());
        for id in &self.entries {
            match index.get(id) {
                Some(&i) if preds[i].is_empty() => entries.push(i),
                _ => return Err(GraphError::InvalidEntry(id.clone())),
            }
        }
        if !entries.is_empty() {
            let reached = reachable_from(&entries, &succs);
            let unreachable: Vec<String> = (0..n)
                .filter(|i| !reached.contains(i))
                .map(|i| self.nodes[i].id.clone())
                .collect();
            if !unreachable.is_empty() {
                return Err(GraphError::Unreachable {
                    nodes: unreachable,
                });
            }
        }

        check_writers(&self.nodes, &preds, &order)?;

        Ok(WorkflowGraph {
            nodes: self.nodes,
            index,
            preds,
            succs,
            order,
        })
    }
}

/// Kahn's algorithm; ties go to the earliest-declared node.
fn topological_order(preds: &[Vec<usize>], succs: &[Vec<usize>]) -> Vec<usize> {
    let mut remaining: Vec<usize> = preds.iter().map(Vec::len).collect();
    let mut ready: BTreeSet<usize> = (0..preds.len()).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(preds.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &s in &succs[next] {
            remaining[s] -= 1;
            if remaining[s] == 0 {
                ready.insert(s);
            }
        }
    }
    order
}

/// Whether `start` lies on a cycle among the nodes Kahn could not place.
fn reaches_itself(start: usize, succs: &[Vec<usize>], placed: &HashSet<usize>) -> bool {
    let mut stack: Vec<usize> = succs[start].clone();
    let mut visited = HashSet::new();
    while let Some(i) = stack.pop() {
        if i == start {
            return true;
        }
        if placed.contains(&i) || !visited.insert(i) {
            continue;
        }
        stack.extend(succs[i].iter().copied());
    }
    false
}

fn reachable_from(starts: &[usize], succs: &[Vec<usize>]) -> HashSet<usize> {
    let mut reached: HashSet<usize> = starts.iter().copied().collect();
    let mut stack = starts.to_vec();
    while let Some(i) = stack.pop() {
        for &s in &succs[i] {
            if reached.insert(s) {
                stack.push(s);
            }
        }
    }
    reached
}

/// Reject two writers of the same key unless one is an ancestor of the other.
fn check_writers(nodes: &[Node], preds: &[Vec<usize>], order: &[usize]) -> Result<(), GraphError> {
    let mut ancestors: Vec<HashSet<usize>> = vec![HashSet::new(); nodes.len()];
    for &i in order {
        let mut acc = HashSet::new();
        for &p in &preds[i] {
            acc.insert(p);
            acc.extend(ancestors[p].iter().copied());
        }
        ancestors[i] = acc;
    }

    let mut writers: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        for key in &node.outputs {
            writers.entry(key.as_str()).or_default().push(i);
        }
    }

    let mut keys: Vec<&&str> = writers.keys().collect();
    keys.sort();
    for key in keys {
        let list = &writers[*key];
        for (a_pos, &a) in list.iter().enumerate() {
            for &b in &list[a_pos + 1..] {
                if !ancestors[a].contains(&b) && !ancestors[b].contains(&a) {
                    return Err(GraphError::ConcurrentWriters {
                        key: key.to_string(),
                        first: nodes[a].id.clone(),
                        second: nodes[b].id.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// A validated, immutable workflow graph.
///
/// Acyclic, every edge endpoint exists, and no two unordered nodes write the
/// same key. Shareable across concurrent runs.
pub struct WorkflowGraph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    preds: Vec<Vec<usize>>,
    succs: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl WorkflowGraph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Deterministic topological order.
    pub fn order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.nodes[i].id.as_str()).collect()
    }

    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        self.ids_of(id, &self.preds)
    }

    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.ids_of(id, &self.succs)
    }

    pub fn sources(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|&&i| self.preds[i].is_empty())
            .map(|&i| self.nodes[i].id.as_str())
            .collect()
    }

    pub fn terminals(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|&&i| self.succs[i].is_empty())
            .map(|&i| self.nodes[i].id.as_str())
            .collect()
    }

    /// Every role the node plays. Empty for unknown ids.
    pub fn roles(&self, id: &str) -> Vec<NodeRole> {
        let Some(&i) = self.index.get(id) else {
            return vec![];
        };
        let mut roles = Vec::new();
        match self.preds[i].len() {
            0 => roles.push(NodeRole::Source),
            1 => roles.push(NodeRole::Transform),
            _ => roles.push(NodeRole::Join),
        }
        match self.succs[i].len() {
            0 => roles.push(NodeRole::Terminal),
            1 => {}
            _ => roles.push(NodeRole::FanOutOrigin),
        }
        roles
    }

    /// Fan-out points in topological order.
    pub fn fan_outs(&self) -> Vec<FanOut> {
        self.order
            .iter()
            .filter(|&&i| self.succs[i].len() > 1)
            .map(|&i| FanOut {
                origin: self.nodes[i].id.clone(),
                branches: self.succs[i].iter().map(|&s| self.nodes[s].id.clone()).collect(),
            })
            .collect()
    }

    /// Join points in topological order.
    pub fn joins(&self) -> Vec<Join> {
        self.order
            .iter()
            .filter(|&&i| self.preds[i].len() > 1)
            .map(|&i| Join {
                node: self.nodes[i].id.clone(),
                predecessors: self.preds[i].iter().map(|&p| self.nodes[p].id.clone()).collect(),
            })
            .collect()
    }

    fn ids_of(&self, id: &str, adjacency: &[Vec<usize>]) -> Vec<&str> {
        self.index
            .get(id)
            .map(|&i| adjacency[i].iter().map(|&j| self.nodes[j].id.as_str()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn node_at(&self, i: usize) -> &Node {
        &self.nodes[i]
    }

    pub(crate) fn indegree(&self, i: usize) -> usize {
        self.preds[i].len()
    }

    pub(crate) fn successor_indices(&self, i: usize) -> &[usize] {
        &self.succs[i]
    }

    pub(crate) fn order_indices(&self) -> &[usize] {
        &self.order
    }
}

impl std::fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("order", &self.order())
            .field("fan_outs", &self.fan_outs())
            .field("joins", &self.joins())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::node_fn;
    use casegraph_core::state::PartialUpdate;

    fn noop(id: &str) -> Node {
        Node::new(id, node_fn(|_| async { Ok(PartialUpdate::new()) }))
    }

    fn writer(id: &str, key: &str) -> Node {
        noop(id).with_outputs([key])
    }

    fn diamond() -> GraphBuilder {
        GraphBuilder::new()
            .node(noop("a"))
            .node(noop("b"))
            .node(noop("c"))
            .node(noop("d"))
            .fan_out("a", ["b", "c"])
            .join(["b", "c"], "d")
    }

    #[test]
    fn test_diamond_structure() {
        let graph = diamond().build().unwrap();

        assert_eq!(graph.order(), vec!["a", "b", "c", "d"]);
        assert_eq!(graph.sources(), vec!["a"]);
        assert_eq!(graph.terminals(), vec!["d"]);
        assert_eq!(
            graph.fan_outs(),
            vec![FanOut {
                origin: "a".into(),
                branches: vec!["b".into(), "c".into()],
            }]
        );
        assert_eq!(
            graph.joins(),
            vec![Join {
                node: "d".into(),
                predecessors: vec!["b".into(), "c".into()],
            }]
        );
        assert_eq!(graph.roles("a"), vec![NodeRole::Source, NodeRole::FanOutOrigin]);
        assert_eq!(graph.roles("b"), vec![NodeRole::Transform]);
        assert_eq!(graph.roles("d"), vec![NodeRole::Join, NodeRole::Terminal]);
        assert!(graph.roles("nope").is_empty());
    }

    #[test]
    fn test_order_breaks_ties_by_declaration() {
        let graph = GraphBuilder::new()
            .node(noop("z"))
            .node(noop("y"))
            .node(noop("x"))
            .edge("x", "z")
            .build()
            .unwrap();
        assert_eq!(graph.order(), vec!["y", "x", "z"]);
    }

    #[test]
    fn test_empty_graph() {
        assert_eq!(GraphBuilder::new().build().unwrap_err(), GraphError::EmptyGraph);
    }

    #[test]
    fn test_duplicate_node() {
        let err = GraphBuilder::new()
            .node(noop("a"))
            .node(noop("a"))
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateNode("a".into()));
    }

    #[test]
    fn test_unknown_node() {
        let err = GraphBuilder::new()
            .node(noop("a"))
            .edge("a", "ghost")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownNode {
                edge_from: "a".into(),
                edge_to: "ghost".into(),
                missing: "ghost".into(),
            }
        );
    }

    #[test]
    fn test_self_loop() {
        let err = GraphBuilder::new()
            .node(noop("a"))
            .edge("a", "a")
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::SelfLoop("a".into()));
    }

    #[test]
    fn test_cycle_reports_only_cycle_members() {
        let err = GraphBuilder::new()
            .node(noop("start"))
            .node(noop("b"))
            .node(noop("c"))
            .node(noop("after"))
            .edge("start", "b")
            .edge("b", "c")
            .edge("c", "b")
            .edge("c", "after")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle {
                nodes: vec!["b".into(), "c".into()],
            }
        );
    }

    #[test]
    fn test_unreachable_from_declared_entry() {
        let err = GraphBuilder::new()
            .node(noop("read"))
            .node(noop("translate"))
            .node(noop("orphan"))
            .edge("read", "translate")
            .entry("read")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::Unreachable {
                nodes: vec!["orphan".into()],
            }
        );
    }

    #[test]
    fn test_entry_must_be_source() {
        let err = diamond().entry("b").build().unwrap_err();
        assert_eq!(err, GraphError::InvalidEntry("b".into()));

        let err = diamond().entry("ghost").build().unwrap_err();
        assert_eq!(err, GraphError::InvalidEntry("ghost".into()));

        assert!(diamond().entry("a").build().is_ok());
    }

    #[test]
    fn test_concurrent_writers_rejected() {
        let err = GraphBuilder::new()
            .node(noop("a"))
            .node(writer("b", "result"))
            .node(writer("c", "result"))
            .fan_out("a", ["b", "c"])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::ConcurrentWriters {
                key: "result".into(),
                first: "b".into(),
                second: "c".into(),
            }
        );
    }

    #[test]
    fn test_sequential_writers_allowed() {
        let graph = GraphBuilder::new()
            .node(writer("a", "draft"))
            .node(noop("b"))
            .node(writer("c", "draft"))
            .edge("a", "b")
            .edge("b", "c")
            .build();
        assert!(graph.is_ok());
    }

    #[test]
    fn test_repeated_edge_is_ignored() {
        let graph = GraphBuilder::new()
            .node(noop("a"))
            .node(noop("b"))
            .edge("a", "b")
            .edge("a", "b")
            .build()
            .unwrap();
        assert_eq!(graph.predecessors("b"), vec!["a"]);
        assert_eq!(graph.roles("b"), vec![NodeRole::Transform, NodeRole::Terminal]);
    }
}
