//! Routing graphs: the user-edited blueprint a request travels along
//!
//! Nodes and edges live in flat maps keyed by generated ids and
//! cross-reference each other by id only — never by ownership pointer.
//! That keeps the structure cycle-proof at the type level and makes the
//! acyclicity invariant a plain traversal over ids.
//!
//! The graph type itself is a passive arena. Invariant-enforcing edits
//! go through the editor in `routing-engine`; this module provides the
//! accessors, traversals, and the submission-time validation gate.

use crate::{RoutingError, RoutingResult, SignerAssignment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a routing graph
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphId(pub String);

impl GraphId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a node within a graph
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an edge within a graph
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub String);

impl EdgeId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Nodes ────────────────────────────────────────────────────────────

/// The role of a node in the route
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// The unique entry point — the requester's own node
    Origin,
    /// A signing step, optionally holding a quorum assignment
    Basic,
    /// A terminal success point; reaching one approves the request
    End,
}

impl NodeKind {
    pub fn is_origin(&self) -> bool {
        matches!(self, Self::Origin)
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }
}

/// Canvas position of a node. The engine never interprets it; it is
/// carried so that edits and duplication round-trip the editor layout.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A node in a routing graph
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteNode {
    /// Unique identifier within the graph
    pub id: NodeId,
    /// Node role
    pub kind: NodeKind,
    /// Label shown on the canvas
    pub label: String,
    /// Canvas position
    pub position: Position,
    /// The signing rule, for basic nodes that require signatures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<SignerAssignment>,
}

impl RouteNode {
    /// Create a node with a generated id
    pub fn new(kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            id: NodeId::generate(),
            kind,
            label: label.into(),
            position: Position::default(),
            assignment: None,
        }
    }

    /// Create the origin node
    pub fn origin() -> Self {
        Self::new(NodeKind::Origin, "Requester")
    }

    /// Create a basic signing node
    pub fn basic(label: impl Into<String>) -> Self {
        Self::new(NodeKind::Basic, label)
    }

    /// Create an end node
    pub fn end() -> Self {
        Self::new(NodeKind::End, "Approved")
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = NodeId::new(id);
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_assignment(mut self, assignment: SignerAssignment) -> Self {
        self.assignment = Some(assignment);
        self
    }
}

// ── Edges ────────────────────────────────────────────────────────────

/// A directed edge between two nodes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEdge {
    /// Unique identifier within the graph
    pub id: EdgeId,
    /// Source node
    pub source: NodeId,
    /// Target node
    pub target: NodeId,
}

impl RouteEdge {
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self {
            id: EdgeId::generate(),
            source,
            target,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = EdgeId::new(id);
        self
    }
}

// ── Graph ────────────────────────────────────────────────────────────

/// A routing graph: flat node and edge arenas plus edge insertion
/// order.
///
/// Insertion order is the fan-out tie-break: when several edges leave a
/// node, routing evaluates them in the order they were created, never
/// by canvas position.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteGraph {
    /// Unique identifier
    pub id: GraphId,
    /// Human-readable name
    pub name: String,
    /// Version, bumped on replacement
    pub version: u32,
    /// Node arena
    pub nodes: HashMap<NodeId, RouteNode>,
    /// Edge arena
    pub edges: HashMap<EdgeId, RouteEdge>,
    /// Edge creation order
    pub edge_order: Vec<EdgeId>,
    /// When this graph version was created
    pub created_at: DateTime<Utc>,
}

impl RouteGraph {
    /// Create an empty graph, version 1
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: GraphId::generate(),
            name: name.into(),
            version: 1,
            nodes: HashMap::new(),
            edges: HashMap::new(),
            edge_order: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Produce the next version: a fresh value with the same id and
    /// `version + 1`. The receiver stays untouched.
    pub fn next_version(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            version: self.version + 1,
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            edge_order: self.edge_order.clone(),
            created_at: Utc::now(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// Get a node by id
    pub fn get_node(&self, id: &NodeId) -> Option<&RouteNode> {
        self.nodes.get(id)
    }

    /// Get an edge by id
    pub fn get_edge(&self, id: &EdgeId) -> Option<&RouteEdge> {
        self.edges.get(id)
    }

    /// The origin node, if one exists
    pub fn origin(&self) -> Option<&RouteNode> {
        self.nodes.values().find(|n| n.kind.is_origin())
    }

    /// Outgoing edges of a node, in insertion order
    pub fn outgoing(&self, node: &NodeId) -> Vec<&RouteEdge> {
        self.edge_order
            .iter()
            .filter_map(|id| self.edges.get(id))
            .filter(|e| &e.source == node)
            .collect()
    }

    /// Incoming edges of a node, in insertion order
    pub fn incoming(&self, node: &NodeId) -> Vec<&RouteEdge> {
        self.edge_order
            .iter()
            .filter_map(|id| self.edges.get(id))
            .filter(|e| &e.target == node)
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    // ── Arena mutation (no invariant checks — see GraphEditor) ───────

    /// Insert a node into the arena
    pub fn insert_node(&mut self, node: RouteNode) -> NodeId {
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        id
    }

    /// Insert an edge into the arena, appending to the insertion order
    pub fn insert_edge(&mut self, edge: RouteEdge) -> EdgeId {
        let id = edge.id.clone();
        self.edges.insert(id.clone(), edge);
        self.edge_order.push(id.clone());
        id
    }

    /// Remove an edge, returning it and its insertion-order slot
    pub fn remove_edge(&mut self, id: &EdgeId) -> Option<(RouteEdge, usize)> {
        let edge = self.edges.remove(id)?;
        let slot = self.edge_order.iter().position(|e| e == id)?;
        self.edge_order.remove(slot);
        Some((edge, slot))
    }

    /// Re-insert an edge at a specific insertion-order slot (rollback
    /// support for atomic edits)
    pub fn restore_edge(&mut self, edge: RouteEdge, slot: usize) {
        let id = edge.id.clone();
        self.edges.insert(id.clone(), edge);
        let slot = slot.min(self.edge_order.len());
        self.edge_order.insert(slot, id);
    }

    /// Remove a node from the arena. Does not cascade; the editor
    /// removes incident edges first.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<RouteNode> {
        self.nodes.remove(id)
    }

    // ── Traversal ────────────────────────────────────────────────────

    /// All node ids reachable from a starting node, including it
    pub fn reachable_from(&self, start: &NodeId) -> HashSet<NodeId> {
        let mut visited = HashSet::new();
        let mut queue = vec![start.clone()];
        while let Some(current) = queue.pop() {
            if visited.insert(current.clone()) {
                for edge in self.outgoing(&current) {
                    if !visited.contains(&edge.target) {
                        queue.push(edge.target.clone());
                    }
                }
            }
        }
        visited
    }

    /// Check for a cycle on any path reachable from the origin.
    ///
    /// Disconnected clusters may hold cycles mid-edit without tripping
    /// this; the invariant only protects the routes a request can
    /// actually travel.
    pub fn has_cycle_from_origin(&self) -> bool {
        let origin = match self.origin() {
            Some(o) => o.id.clone(),
            None => return false,
        };

        // Iterative DFS with an explicit on-path set
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut on_path: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<(NodeId, usize)> = vec![(origin, 0)];

        while let Some((node, child)) = stack.pop() {
            if child == 0 {
                if !visited.insert(node.clone()) {
                    continue;
                }
                on_path.insert(node.clone());
            }
            let targets: Vec<NodeId> = self
                .outgoing(&node)
                .iter()
                .map(|e| e.target.clone())
                .collect();
            if child < targets.len() {
                let next = targets[child].clone();
                stack.push((node, child + 1));
                if on_path.contains(&next) {
                    return true;
                }
                if !visited.contains(&next) {
                    stack.push((next, 0));
                }
            } else {
                on_path.remove(&node);
            }
        }
        false
    }

    // ── Validation ───────────────────────────────────────────────────

    /// Submission-time completeness gate.
    ///
    /// A graph may be saved in any intermediate shape while edited, but
    /// before a form may attach it and accept submissions it must be a
    /// complete route: exactly one origin with exactly one outgoing
    /// edge, at least one end node, every node reachable, every
    /// reachable basic node assigned and able to move forward, and no
    /// cycles.
    pub fn validate_for_submission(&self) -> RoutingResult<()> {
        let origin = self.origin().ok_or(RoutingError::NoOrigin)?;

        if self.nodes.values().filter(|n| n.kind.is_origin()).count() > 1 {
            return Err(RoutingError::DuplicateOrigin);
        }
        if !self.nodes.values().any(|n| n.kind.is_end()) {
            return Err(RoutingError::NoEndNode);
        }

        let origin_out = self.outgoing(&origin.id).len();
        if origin_out != 1 {
            return Err(RoutingError::Validation(format!(
                "origin must have exactly one outgoing edge, found {}",
                origin_out
            )));
        }

        for edge in self.edges.values() {
            if !self.nodes.contains_key(&edge.source) {
                return Err(RoutingError::NodeNotFound(edge.source.clone()));
            }
            if !self.nodes.contains_key(&edge.target) {
                return Err(RoutingError::NodeNotFound(edge.target.clone()));
            }
        }

        let reachable = self.reachable_from(&origin.id);
        if reachable.len() != self.nodes.len() {
            return Err(RoutingError::DisconnectedGraph);
        }

        for node in self.nodes.values() {
            if node.kind != NodeKind::Basic {
                continue;
            }
            if self.outgoing(&node.id).is_empty() {
                return Err(RoutingError::Validation(format!(
                    "node '{}' has no way forward",
                    node.label
                )));
            }
            match &node.assignment {
                None => {
                    return Err(RoutingError::Validation(format!(
                        "node '{}' has no signer assignment",
                        node.label
                    )))
                }
                Some(a) if a.required_count == 0 => {
                    return Err(RoutingError::Validation(format!(
                        "node '{}' requires a quorum of at least one",
                        node.label
                    )))
                }
                Some(_) => {}
            }
        }

        if self.has_cycle_from_origin() {
            return Err(RoutingError::InvalidEdge {
                violation: crate::EdgeViolation::CreatesCycle,
            });
        }

        Ok(())
    }
}
