use crate::traits::GraphStore;
use crate::{GraphError, GraphNode, Relationship};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct GraphState {
    nodes: BTreeSet<GraphNode>,
    relationships: BTreeSet<Relationship>,
}

/// Process-local graph with the same merge semantics as the database:
/// nodes are keyed by (label, name), edges by (from, kind, to).
#[derive(Debug, Default)]
pub struct InMemoryGraph {
    state: Mutex<GraphState>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> Vec<GraphNode> {
        self.with_state(|state| state.nodes.iter().cloned().collect())
    }

    pub fn relationships(&self) -> Vec<Relationship> {
        self.with_state(|state| state.relationships.iter().cloned().collect())
    }

    pub fn node_count(&self) -> usize {
        self.with_state(|state| state.nodes.len())
    }

    pub fn relationship_count(&self) -> usize {
        self.with_state(|state| state.relationships.len())
    }

    fn with_state<T>(&self, read: impl FnOnce(&mut GraphState) -> T) -> T {
        // inserts cannot leave the sets half-updated, so a poisoned lock is still usable
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        read(&mut state)
    }
}

#[async_trait]
impl GraphStore for InMemoryGraph {
    async fn merge_node(&self, node: &GraphNode) -> Result<(), GraphError> {
        self.with_state(|state| {
            state.nodes.insert(node.clone());
        });
        Ok(())
    }

    async fn merge_relationship(&self, relationship: &Relationship) -> Result<(), GraphError> {
        self.with_state(|state| {
            state.nodes.insert(relationship.from.clone());
            state.nodes.insert(relationship.to.clone());
            state.relationships.insert(relationship.clone());
        });
        Ok(())
    }
}
