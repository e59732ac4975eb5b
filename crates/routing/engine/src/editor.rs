//! Graph editor: invariant-enforcing mutations on routing graphs
//!
//! Every operation is atomic against the in-memory graph: it either
//! commits whole or leaves the graph exactly as it was. Edge edits run
//! the full invariant check and name the violated invariant on
//! rejection, so the caller can show the user why the edit bounced.

use routing_types::{
    EdgeId, EdgeViolation, NodeId, NodeKind, Position, RouteEdge, RouteGraph, RouteNode,
    RoutingError, RoutingResult, SignerAssignment,
};
use std::collections::HashMap;
use tracing::debug;

/// Mutable editing session over one routing graph.
///
/// Callers that need serialization across writers go through
/// [`crate::GraphService`], which wraps an editor in a per-graph
/// critical section.
pub struct GraphEditor<'g> {
    graph: &'g mut RouteGraph,
}

impl<'g> GraphEditor<'g> {
    pub fn new(graph: &'g mut RouteGraph) -> Self {
        Self { graph }
    }

    /// Read access to the graph under edit
    pub fn graph(&self) -> &RouteGraph {
        self.graph
    }

    // ── Nodes ────────────────────────────────────────────────────────

    /// Add a node. Always legal except a second origin.
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        position: Position,
        label: impl Into<String>,
    ) -> RoutingResult<NodeId> {
        if kind.is_origin() && self.graph.origin().is_some() {
            return Err(RoutingError::DuplicateOrigin);
        }
        let node = RouteNode::new(kind, label).with_position(position);
        let id = self.graph.insert_node(node);
        debug!(graph = %self.graph.id, node = %id, ?kind, "node added");
        Ok(id)
    }

    /// Attach or clear a node's signer assignment. Only basic nodes
    /// sign; origin and end nodes reject an assignment.
    pub fn set_assignment(
        &mut self,
        node_id: &NodeId,
        assignment: Option<SignerAssignment>,
    ) -> RoutingResult<()> {
        let node = self
            .graph
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| RoutingError::NodeNotFound(node_id.clone()))?;
        if assignment.is_some() && node.kind != NodeKind::Basic {
            return Err(RoutingError::Validation(format!(
                "node '{}' cannot hold a signer assignment",
                node.label
            )));
        }
        node.assignment = assignment;
        Ok(())
    }

    /// Delete a node, cascading to every edge touching it.
    /// The origin is not deletable.
    pub fn delete_node(&mut self, node_id: &NodeId) -> RoutingResult<()> {
        let node = self
            .graph
            .get_node(node_id)
            .ok_or_else(|| RoutingError::NodeNotFound(node_id.clone()))?;
        if node.kind.is_origin() {
            return Err(RoutingError::OriginNotDeletable);
        }

        let incident: Vec<EdgeId> = self
            .graph
            .edges
            .values()
            .filter(|e| &e.source == node_id || &e.target == node_id)
            .map(|e| e.id.clone())
            .collect();
        for edge_id in &incident {
            self.graph.remove_edge(edge_id);
        }
        self.graph.remove_node(node_id);
        debug!(graph = %self.graph.id, node = %node_id, edges = incident.len(), "node deleted");
        Ok(())
    }

    /// Duplicate a node: clone its data (label, position, signer
    /// assignment) under a fresh id, and clone every incident edge with
    /// the endpoint rewritten to the new id. Old and new node coexist
    /// as parallel branches.
    ///
    /// The cloned edges run the same invariant checks as `connect`, so
    /// duplicating the origin's direct successor is rejected — it would
    /// give the origin a second outgoing edge.
    pub fn duplicate_node(&mut self, node_id: &NodeId) -> RoutingResult<NodeId> {
        let original = self
            .graph
            .get_node(node_id)
            .cloned()
            .ok_or_else(|| RoutingError::NodeNotFound(node_id.clone()))?;
        if original.kind.is_origin() {
            return Err(RoutingError::DuplicateOrigin);
        }

        let incident: Vec<RouteEdge> = self
            .graph
            .edge_order
            .iter()
            .filter_map(|id| self.graph.edges.get(id))
            .filter(|e| &e.source == node_id || &e.target == node_id)
            .cloned()
            .collect();

        let mut clone = original;
        clone.id = NodeId::generate();
        let clone_id = self.graph.insert_node(clone);

        let mut inserted: Vec<EdgeId> = Vec::new();
        let rollback = |graph: &mut RouteGraph, inserted: &[EdgeId]| {
            for id in inserted {
                graph.remove_edge(id);
            }
            graph.remove_node(&clone_id);
        };

        for edge in incident {
            let (source, target) = if &edge.source == node_id {
                (clone_id.clone(), edge.target.clone())
            } else {
                (edge.source.clone(), clone_id.clone())
            };
            match self.check_edge(&source, &target) {
                Ok(()) => {
                    inserted.push(self.graph.insert_edge(RouteEdge::new(source, target)));
                }
                Err(err) => {
                    rollback(self.graph, &inserted);
                    return Err(err);
                }
            }
        }

        if self.graph.has_cycle_from_origin() {
            rollback(self.graph, &inserted);
            return Err(RoutingError::InvalidEdge {
                violation: EdgeViolation::CreatesCycle,
            });
        }

        debug!(graph = %self.graph.id, from = %node_id, to = %clone_id, "node duplicated");
        Ok(clone_id)
    }

    // ── Edges ────────────────────────────────────────────────────────

    /// Connect two nodes. Runs the full invariant check before
    /// committing; on violation the graph is untouched and the error
    /// names which invariant failed.
    pub fn connect(&mut self, source: &NodeId, target: &NodeId) -> RoutingResult<EdgeId> {
        self.check_edge(source, target)?;
        let id = self
            .graph
            .insert_edge(RouteEdge::new(source.clone(), target.clone()));
        if self.graph.has_cycle_from_origin() {
            self.graph.remove_edge(&id);
            return Err(RoutingError::InvalidEdge {
                violation: EdgeViolation::CreatesCycle,
            });
        }
        debug!(graph = %self.graph.id, %source, %target, "edge connected");
        Ok(id)
    }

    /// Rewire an existing edge to new endpoints. Equivalent to delete +
    /// connect under one atomic check: on rejection the original edge
    /// keeps its endpoints and its insertion-order slot.
    pub fn reconnect(
        &mut self,
        edge_id: &EdgeId,
        new_source: &NodeId,
        new_target: &NodeId,
    ) -> RoutingResult<()> {
        let (old, slot) = self
            .graph
            .remove_edge(edge_id)
            .ok_or_else(|| RoutingError::EdgeNotFound(edge_id.clone()))?;

        if let Err(err) = self.check_edge(new_source, new_target) {
            self.graph.restore_edge(old, slot);
            return Err(err);
        }

        self.graph.insert_edge(RouteEdge {
            id: edge_id.clone(),
            source: new_source.clone(),
            target: new_target.clone(),
        });
        if self.graph.has_cycle_from_origin() {
            self.graph.remove_edge(edge_id);
            self.graph.restore_edge(old, slot);
            return Err(RoutingError::InvalidEdge {
                violation: EdgeViolation::CreatesCycle,
            });
        }
        debug!(graph = %self.graph.id, edge = %edge_id, "edge reconnected");
        Ok(())
    }

    /// Delete an edge.
    pub fn delete_edge(&mut self, edge_id: &EdgeId) -> RoutingResult<()> {
        self.graph
            .remove_edge(edge_id)
            .map(|_| ())
            .ok_or_else(|| RoutingError::EdgeNotFound(edge_id.clone()))
    }

    // ── Paste ────────────────────────────────────────────────────────

    /// Insert a copied subgraph under fresh ids.
    ///
    /// Clipboard origin nodes are rejected. Edges whose endpoints both
    /// sit in the clipboard are remapped and inserted; edges crossing
    /// the clipboard boundary are dropped. All-or-nothing: if any
    /// remapped edge fails validation, nothing is inserted. Returns the
    /// old-id to new-id mapping.
    pub fn paste(
        &mut self,
        nodes: Vec<RouteNode>,
        edges: Vec<RouteEdge>,
    ) -> RoutingResult<HashMap<NodeId, NodeId>> {
        if nodes.iter().any(|n| n.kind.is_origin()) {
            return Err(RoutingError::DuplicateOrigin);
        }

        let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();
        for node in &nodes {
            mapping.insert(node.id.clone(), NodeId::generate());
        }

        let mut inserted_nodes: Vec<NodeId> = Vec::new();
        for node in nodes {
            let mut copy = node.clone();
            copy.id = mapping[&node.id].clone();
            inserted_nodes.push(self.graph.insert_node(copy));
        }

        let mut inserted_edges: Vec<EdgeId> = Vec::new();
        let rollback =
            |graph: &mut RouteGraph, edges: &[EdgeId], nodes: &[NodeId]| {
                for id in edges {
                    graph.remove_edge(id);
                }
                for id in nodes {
                    graph.remove_node(id);
                }
            };

        for edge in edges {
            let (source, target) = match (mapping.get(&edge.source), mapping.get(&edge.target)) {
                (Some(s), Some(t)) => (s.clone(), t.clone()),
                _ => continue, // edge crossed the clipboard boundary
            };
            match self.check_edge(&source, &target) {
                Ok(()) => {
                    inserted_edges.push(self.graph.insert_edge(RouteEdge::new(source, target)));
                }
                Err(err) => {
                    rollback(self.graph, &inserted_edges, &inserted_nodes);
                    return Err(err);
                }
            }
        }

        if self.graph.has_cycle_from_origin() {
            rollback(self.graph, &inserted_edges, &inserted_nodes);
            return Err(RoutingError::InvalidEdge {
                violation: EdgeViolation::CreatesCycle,
            });
        }

        debug!(graph = %self.graph.id, nodes = inserted_nodes.len(), edges = inserted_edges.len(), "subgraph pasted");
        Ok(mapping)
    }

    // ── Invariant checks ─────────────────────────────────────────────

    /// Static edge checks (everything except acyclicity, which needs
    /// the tentative edge in place).
    fn check_edge(&self, source: &NodeId, target: &NodeId) -> RoutingResult<()> {
        let source_node = self
            .graph
            .get_node(source)
            .ok_or_else(|| RoutingError::NodeNotFound(source.clone()))?;
        let target_node = self
            .graph
            .get_node(target)
            .ok_or_else(|| RoutingError::NodeNotFound(target.clone()))?;

        let violation = if source == target {
            Some(EdgeViolation::SelfLoop)
        } else if self
            .graph
            .edges
            .values()
            .any(|e| &e.source == source && &e.target == target)
        {
            Some(EdgeViolation::DuplicateEdge)
        } else if target_node.kind.is_origin() {
            Some(EdgeViolation::IntoOrigin)
        } else if source_node.kind.is_end() {
            Some(EdgeViolation::FromEnd)
        } else if source_node.kind.is_origin() && !self.graph.outgoing(source).is_empty() {
            Some(EdgeViolation::OriginFanOut)
        } else {
            None
        };

        match violation {
            Some(violation) => Err(RoutingError::InvalidEdge { violation }),
            None => Ok(()),
        }
    }
}
