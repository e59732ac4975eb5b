//! Signers, groups, decisions, and the per-node quorum assignment
//!
//! Group membership is late-bound: a node stores only a group
//! reference, and the engine re-resolves concrete members at decision
//! time. Membership is never cached in the graph.

use crate::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Identifiers ──────────────────────────────────────────────────────

/// Identity of one signer
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignerId(pub String);

impl SignerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SignerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a signer group, resolved to members at decision time
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignerGroupId(pub String);

impl SignerGroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SignerGroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Decisions ────────────────────────────────────────────────────────

/// A signer's verdict at a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn is_approve(&self) -> bool {
        matches!(self, Self::Approve)
    }
}

/// One recorded signer action — an entry in a routing's append-only log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerAction {
    /// The node acted on
    pub node: NodeId,
    /// Who acted
    pub signer: SignerId,
    /// The verdict
    pub decision: Decision,
    /// When the action was recorded
    pub at: DateTime<Utc>,
}

impl SignerAction {
    pub fn new(node: NodeId, signer: SignerId, decision: Decision) -> Self {
        Self {
            node,
            signer,
            decision,
            at: Utc::now(),
        }
    }

    /// Check if another action is the same (node, signer, decision)
    /// triple — the re-delivery identity, timestamps excluded
    pub fn same_as(&self, node: &NodeId, signer: &SignerId, decision: Decision) -> bool {
        &self.node == node && &self.signer == signer && self.decision == decision
    }
}

// ── Quorum Assignment ────────────────────────────────────────────────

/// The signing rule attached to a basic node: which group must act and
/// how many affirmative decisions clear the node.
///
/// The reject side is deliberately not configurable: any single reject
/// terminates the routing. The source product never exposed a per-node
/// reject threshold, so none is modeled here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerAssignment {
    /// The group whose members may sign at this node
    pub group: SignerGroupId,
    /// How many distinct approvals clear the node (quorum)
    pub required_count: u32,
}

impl SignerAssignment {
    pub fn new(group: SignerGroupId, required_count: u32) -> Self {
        Self {
            group,
            required_count,
        }
    }

    /// An assignment cleared by any single member
    pub fn any_of(group: SignerGroupId) -> Self {
        Self::new(group, 1)
    }
}
