//! Error taxonomy for the routing model.
//!
//! Every recoverable error leaves prior state untouched: a rejected
//! edit keeps the graph as it was, a rejected decision keeps the
//! routing as it was. Re-delivery of an identical signer action is a
//! benign no-op at the engine level and never reaches this taxonomy.

use crate::{EdgeId, GraphId, NodeId, RequestStatus, RoutingId, SignerGroupId, SignerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Errors produced by graph editing and routing evaluation
#[derive(Debug, Error)]
pub enum RoutingError {
    /// An edit would break a graph invariant; the edit is rejected and
    /// the violation names which invariant, for user-facing messages
    #[error("invalid edge: {violation}")]
    InvalidEdge { violation: EdgeViolation },

    /// A routing graph holds exactly one origin node
    #[error("the graph already has an origin node")]
    DuplicateOrigin,

    /// The origin node cannot be deleted
    #[error("the origin node cannot be deleted")]
    OriginNotDeletable,

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("edge not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("graph not found: {0}")]
    GraphNotFound(GraphId),

    #[error("routing not found: {0}")]
    RoutingNotFound(RoutingId),

    /// A decision arrived at a basic node with no signer assignment
    #[error("node {0} has no signer assignment")]
    MissingAssignment(NodeId),

    /// The acting signer is not a member of the node's group at
    /// decision time
    #[error("signer {signer} is not a member of group {group}")]
    UnknownSigner {
        signer: SignerId,
        group: SignerGroupId,
    },

    /// A signer tried to record a second, different decision at a node
    /// they already acted on
    #[error("signer {signer} already recorded a decision at node {node}")]
    DuplicateSignerAction { node: NodeId, signer: SignerId },

    /// A decision named a node the routing is not currently at
    #[error("node {acted} is not the current node (routing is at {current})")]
    NotCurrentNode { acted: NodeId, current: NodeId },

    /// The routing already reached a terminal status
    #[error("request routing is already closed ({0:?})")]
    RequestClosed(RequestStatus),

    /// Quorum was met at a node with no outgoing edge; only possible on
    /// graphs that skipped submission validation
    #[error("node {0} has no outgoing edge to advance along")]
    DeadEnd(NodeId),

    /// Another writer holds the per-entity lock; retry
    #[error("concurrent modification of {0}, retry")]
    ConcurrentModification(String),

    /// Submission-time validation failure
    #[error("graph validation failed: {0}")]
    Validation(String),

    #[error("graph has no origin node")]
    NoOrigin,

    #[error("graph has no end node")]
    NoEndNode,

    /// A node is unreachable from the origin
    #[error("graph contains nodes unreachable from the origin")]
    DisconnectedGraph,
}

/// The specific graph invariant an edge edit would break
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeViolation {
    /// Only one edge may leave the origin
    OriginFanOut,
    /// No edge may target the origin
    IntoOrigin,
    /// No edge may leave an end node
    FromEnd,
    /// The edge would close a cycle on a path reachable from the origin
    CreatesCycle,
    /// Source and target are the same node
    SelfLoop,
    /// An edge with the same source and target already exists
    DuplicateEdge,
}

impl std::fmt::Display for EdgeViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::OriginFanOut => "only one edge may leave the origin",
            Self::IntoOrigin => "no edge may point back at the origin",
            Self::FromEnd => "an end node cannot have outgoing edges",
            Self::CreatesCycle => "the connection would create a loop in the route",
            Self::SelfLoop => "a node cannot connect to itself",
            Self::DuplicateEdge => "these nodes are already connected",
        };
        write!(f, "{}", msg)
    }
}
