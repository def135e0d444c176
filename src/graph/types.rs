use std::collections::HashMap;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::model::{Edge, Step};

/// Immutable adjacency structure for one workflow, shared read-only by any
/// number of concurrent runs.
#[derive(Debug)]
pub struct WorkflowGraph {
    graph: StableDiGraph<Step, Edge>,
    index: HashMap<String, NodeIndex>,
}

impl WorkflowGraph {
    pub(super) fn new(graph: StableDiGraph<Step, Edge>, index: HashMap<String, NodeIndex>) -> Self {
        WorkflowGraph { graph, index }
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        let idx = self.index.get(step_id)?;
        self.graph.node_weight(*idx)
    }

    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(|k| k.as_str())
    }

    pub fn step_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Steps with no incoming edge, in `(order, id)` order.
    pub fn start_steps(&self) -> Vec<&Step> {
        let mut starts: Vec<&Step> = self
            .graph
            .node_indices()
            .filter(|idx| {
                self.graph
                    .neighbors_directed(*idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect();
        Self::sort_steps(&mut starts);
        starts
    }

    /// Outgoing edges of a step, ordered by the target's `(order, id)`.
    pub fn outgoing(&self, step_id: &str) -> Vec<&Edge> {
        self.edges_directed(step_id, Direction::Outgoing)
    }

    /// Incoming edges of a step, ordered by the source's `(order, id)`.
    pub fn incoming(&self, step_id: &str) -> Vec<&Edge> {
        self.edges_directed(step_id, Direction::Incoming)
    }

    /// Labels carried by a step's outgoing edges (for switch fallback checks).
    pub fn outgoing_labels(&self, step_id: &str) -> Vec<Option<String>> {
        self.outgoing(step_id)
            .iter()
            .map(|e| e.label.clone())
            .collect()
    }

    /// First step in `(order, id)` order, used as traversal fallback when the
    /// graph has no start step (every step sits on a cycle).
    pub fn first_step(&self) -> Option<&Step> {
        let mut steps: Vec<&Step> = self
            .graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect();
        Self::sort_steps(&mut steps);
        steps.first().copied()
    }

    fn edges_directed(&self, step_id: &str, direction: Direction) -> Vec<&Edge> {
        let Some(idx) = self.index.get(step_id) else {
            return Vec::new();
        };
        let mut edges: Vec<(&Step, &Edge)> = self
            .graph
            .edges_directed(*idx, direction)
            .filter_map(|edge| {
                let peer = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                self.graph.node_weight(peer).map(|step| (step, edge.weight()))
            })
            .collect();
        edges.sort_by(|(a, _), (b, _)| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        edges.into_iter().map(|(_, e)| e).collect()
    }

    fn sort_steps(steps: &mut [&Step]) {
        steps.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
    }
}
