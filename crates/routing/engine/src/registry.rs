//! Graph registry: authored graphs, versioned by replacement
//!
//! A graph attached to a form is immutable from the requests' point of
//! view. To change a route, authors register a new version under the
//! same name; requests already in flight keep the version they were
//! submitted against.

use routing_types::{GraphId, RouteGraph, RoutingError, RoutingResult};
use std::collections::HashMap;

/// Registry of submission-ready routing graphs
#[derive(Clone, Debug, Default)]
pub struct GraphRegistry {
    /// All registered graphs, keyed by id
    graphs: HashMap<GraphId, RouteGraph>,
    /// Name -> registration order of graph ids (for versioning)
    by_name: HashMap<String, Vec<GraphId>>,
}

impl GraphRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a graph.
    ///
    /// The graph must pass submission validation; an incomplete route
    /// never becomes attachable.
    pub fn register(&mut self, graph: RouteGraph) -> RoutingResult<GraphId> {
        graph.validate_for_submission()?;

        let id = graph.id.clone();
        let name = graph.name.clone();
        self.graphs.insert(id.clone(), graph);
        self.by_name.entry(name).or_default().push(id.clone());

        tracing::info!(graph = %id, "routing graph registered");
        Ok(id)
    }

    /// Get a graph by id
    pub fn get(&self, id: &GraphId) -> RoutingResult<&RouteGraph> {
        self.graphs
            .get(id)
            .ok_or_else(|| RoutingError::GraphNotFound(id.clone()))
    }

    /// The most recently registered graph under a name
    pub fn latest_by_name(&self, name: &str) -> Option<&RouteGraph> {
        self.by_name
            .get(name)
            .and_then(|ids| ids.last())
            .and_then(|id| self.graphs.get(id))
    }

    /// All registered versions under a name, oldest first
    pub fn versions_by_name(&self, name: &str) -> Vec<&RouteGraph> {
        self.by_name
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| self.graphs.get(id)).collect())
            .unwrap_or_default()
    }

    /// List all registered graphs
    pub fn list(&self) -> Vec<&RouteGraph> {
        self.graphs.values().collect()
    }

    /// Total number of registered graphs
    pub fn count(&self) -> usize {
        self.graphs.len()
    }

    /// Check if a graph is registered
    pub fn contains(&self, id: &GraphId) -> bool {
        self.graphs.contains_key(id)
    }

    /// Remove a graph from the registry
    pub fn remove(&mut self, id: &GraphId) -> RoutingResult<RouteGraph> {
        let graph = self
            .graphs
            .remove(id)
            .ok_or_else(|| RoutingError::GraphNotFound(id.clone()))?;

        if let Some(ids) = self.by_name.get_mut(&graph.name) {
            ids.retain(|i| i != id);
            if ids.is_empty() {
                self.by_name.remove(&graph.name);
            }
        }

        tracing::info!(graph = %id, "routing graph removed");
        Ok(graph)
    }
}
