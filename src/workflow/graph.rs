//! Workflow graph - ordering and neighbourhood queries over nodes and edges
//!
//! Ordering uses Kahn's algorithm with FIFO discovery: roots are seeded in
//! declaration order and successors are enqueued in edge order, so the same
//! definition always yields the same order.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::domain::{NodeOutput, WorkflowDefinition, WorkflowEdge};
use crate::error::{AgentflowError, Result};

/// Topologically sort `node_ids` along `edges`.
///
/// Returns `CycleDetected` without a partial order when some node never
/// reaches in-degree zero. Edges naming unknown nodes are ignored.
pub fn topological_sort(node_ids: &[String], edges: &[WorkflowEdge]) -> Result<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = node_ids.iter().map(|id| (id.as_str(), 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();

    for edge in edges {
        if !in_degree.contains_key(edge.source.as_str()) {
            continue;
        }
        if let Some(degree) = in_degree.get_mut(edge.target.as_str()) {
            *degree += 1;
            successors
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }
    }

    let mut queue: VecDeque<&str> = node_ids
        .iter()
        .map(String::as_str)
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(node_ids.len());

    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        for next in successors.get(id).map(Vec::as_slice).unwrap_or_default() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*next);
                }
            }
        }
    }

    if order.len() < node_ids.len() {
        return Err(AgentflowError::CycleDetected {
            remaining: node_ids.len() - order.len(),
        });
    }
    Ok(order)
}

/// Read-only view over a definition's topology
#[derive(Debug)]
pub struct WorkflowGraph<'a> {
    node_ids: Vec<String>,
    edges: &'a [WorkflowEdge],
}

impl<'a> WorkflowGraph<'a> {
    pub fn new(definition: &'a WorkflowDefinition) -> Self {
        Self {
            node_ids: definition.nodes.iter().map(|n| n.id.clone()).collect(),
            edges: &definition.edges,
        }
    }

    pub fn topological_sort(&self) -> Result<Vec<String>> {
        topological_sort(&self.node_ids, self.edges)
    }

    /// Ids of nodes with an edge into `node_id`, in edge order
    pub fn upstream_ids(&self, node_id: &str) -> Vec<&'a str> {
        self.edges
            .iter()
            .filter(|e| e.target == node_id)
            .map(|e| e.source.as_str())
            .collect()
    }

    /// Recorded outputs of the direct predecessors of `node_id`
    pub fn upstream_outputs(
        &self,
        node_id: &str,
        outputs: &BTreeMap<String, NodeOutput>,
    ) -> BTreeMap<String, NodeOutput> {
        self.upstream_ids(node_id)
            .into_iter()
            .filter_map(|id| outputs.get(id).map(|o| (id.to_string(), o.clone())))
            .collect()
    }

    /// Successors of `node_id`.
    ///
    /// With a `handle`, only edges labelled with that handle and unlabelled
    /// edges are followed.
    pub fn downstream_nodes(&self, node_id: &str, handle: Option<&str>) -> Vec<&'a str> {
        self.edges
            .iter()
            .filter(|e| e.source == node_id)
            .filter(|e| edge_matches(e, handle))
            .map(|e| e.target.as_str())
            .collect()
    }
}

/// Whether an edge is followed when its source emitted `handle`
pub fn edge_matches(edge: &WorkflowEdge, handle: Option<&str>) -> bool {
    match (edge.source_handle.as_deref(), handle) {
        (None, _) | (_, None) => true,
        (Some(label), Some(handle)) => label == handle,
    }
}
