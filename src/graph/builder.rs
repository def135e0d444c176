use std::collections::HashMap;

use petgraph::stable_graph::StableDiGraph;

use crate::error::EngineError;
use crate::model::{Edge, Step};

use super::WorkflowGraph;

/// Build the adjacency structure for one workflow from its persisted steps
/// and edges. Every edge endpoint must name a step of the same workflow.
pub fn build_graph(steps: &[Step], edges: &[Edge]) -> Result<WorkflowGraph, EngineError> {
    let mut graph = StableDiGraph::new();
    let mut index = HashMap::with_capacity(steps.len());

    for step in steps {
        let idx = graph.add_node(step.clone());
        index.insert(step.id.clone(), idx);
    }

    for edge in edges {
        let source = index
            .get(&edge.source_id)
            .ok_or_else(|| EngineError::StepNotFound(edge.source_id.clone()))?;
        let target = index
            .get(&edge.target_id)
            .ok_or_else(|| EngineError::StepNotFound(edge.target_id.clone()))?;
        graph.add_edge(*source, *target, edge.clone());
    }

    Ok(WorkflowGraph::new(graph, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StepKind;
    use serde_json::Value;

    fn step(id: &str, order: i32) -> Step {
        Step {
            id: id.into(),
            workflow_id: "w1".into(),
            kind: StepKind::Code,
            label: String::new(),
            position: Value::Null,
            config: Value::Null,
            order,
        }
    }

    fn edge(id: &str, source: &str, target: &str, label: Option<&str>) -> Edge {
        Edge {
            id: id.into(),
            workflow_id: "w1".into(),
            source_id: source.into(),
            target_id: target.into(),
            label: label.map(String::from),
        }
    }

    #[test]
    fn test_build_and_query() {
        let steps = vec![step("a", 0), step("b", 1), step("c", 2)];
        let edges = vec![
            edge("e1", "a", "b", None),
            edge("e2", "a", "c", Some("true")),
        ];
        let graph = build_graph(&steps, &edges).unwrap();

        assert_eq!(graph.step_count(), 3);
        assert_eq!(graph.start_steps().len(), 1);
        assert_eq!(graph.start_steps()[0].id, "a");

        let outgoing = graph.outgoing("a");
        assert_eq!(outgoing.len(), 2);
        // Ordered by target (order, id): b before c.
        assert_eq!(outgoing[0].target_id, "b");
        assert_eq!(outgoing[1].target_id, "c");
        assert_eq!(outgoing[1].label.as_deref(), Some("true"));

        assert_eq!(graph.incoming("b").len(), 1);
        assert_eq!(graph.incoming("a").len(), 0);
    }

    #[test]
    fn test_edge_to_unknown_step_rejected() {
        let steps = vec![step("a", 0)];
        let edges = vec![edge("e1", "a", "ghost", None)];
        let err = build_graph(&steps, &edges).unwrap_err();
        assert!(matches!(err, EngineError::StepNotFound(id) if id == "ghost"));
    }

    #[test]
    fn test_start_step_ordering_breaks_ties() {
        let steps = vec![step("z", 0), step("a", 0), step("m", 1)];
        let graph = build_graph(&steps, &[]).unwrap();
        let ids: Vec<&str> = graph.start_steps().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "z", "m"]);
    }

    #[test]
    fn test_first_step_fallback_with_full_cycle() {
        let steps = vec![step("a", 0), step("b", 1)];
        let edges = vec![edge("e1", "a", "b", None), edge("e2", "b", "a", None)];
        let graph = build_graph(&steps, &edges).unwrap();
        assert!(graph.start_steps().is_empty());
        assert_eq!(graph.first_step().unwrap().id, "a");
    }
}
