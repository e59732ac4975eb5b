//! Request routings: a submitted request's live position in a graph
//!
//! A routing binds one request to one graph version. Its action log is
//! append-only: signer actions are only ever added, never rewritten,
//! and a terminal status freezes the log. Every state change also lands
//! in an event trail for operators and audit.

use crate::{Decision, GraphId, NodeId, SignerAction, SignerId};
use chrono::{DateTime, Utc};
use form_types::RequestId;
use serde::{Deserialize, Serialize};

// ── Identifier ───────────────────────────────────────────────────────

/// Unique identifier for a request routing
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingId(pub String);

impl RoutingId {
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

impl std::fmt::Display for RoutingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Status ───────────────────────────────────────────────────────────

/// The lifecycle status of a request routing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RequestStatus {
    /// Waiting for signer decisions
    #[default]
    Pending,
    /// An end node was reached
    Approved,
    /// A signer rejected
    Rejected,
    /// Withdrawn by the request owner
    Canceled,
    /// Removed by the request owner
    Deleted,
}

impl RequestStatus {
    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

// ── Event Trail ──────────────────────────────────────────────────────

/// An entry in a routing's audit trail
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingEvent {
    /// Monotonically increasing sequence number
    pub sequence: u64,
    /// Type of event
    pub event_type: String,
    /// Human-readable description
    pub description: String,
    /// When the event occurred
    pub at: DateTime<Utc>,
}

// ── Request Routing ──────────────────────────────────────────────────

/// The live association between a submitted request and its position
/// and history within a routing graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestRouting {
    /// Unique identifier
    pub id: RoutingId,
    /// The routed request
    pub request_id: RequestId,
    /// The graph this request travels along
    pub graph_id: GraphId,
    /// The node currently awaiting signatures (or the reached end node)
    pub current_node: NodeId,
    /// Append-only record of signer actions
    pub action_log: Vec<SignerAction>,
    /// Current status
    pub status: RequestStatus,
    /// Audit trail of state changes
    pub events: Vec<RoutingEvent>,
    /// When the routing was created
    pub created_at: DateTime<Utc>,
    /// When the routing was last updated
    pub updated_at: DateTime<Utc>,
    /// When a terminal status was reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RequestRouting {
    /// Create a routing positioned at its first node
    pub fn new(request_id: RequestId, graph_id: GraphId, first_node: NodeId) -> Self {
        let now = Utc::now();
        let mut routing = Self {
            id: RoutingId::generate(),
            request_id,
            graph_id,
            current_node: first_node.clone(),
            action_log: Vec::new(),
            status: RequestStatus::Pending,
            events: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        routing.record_event("submitted", format!("Routing opened at node '{}'", first_node));
        routing
    }

    // ── Log queries ──────────────────────────────────────────────────

    /// All actions recorded at a node
    pub fn actions_at(&self, node: &NodeId) -> Vec<&SignerAction> {
        self.action_log.iter().filter(|a| &a.node == node).collect()
    }

    /// The action a signer recorded at a node, if any
    pub fn action_by(&self, node: &NodeId, signer: &SignerId) -> Option<&SignerAction> {
        self.action_log
            .iter()
            .find(|a| &a.node == node && &a.signer == signer)
    }

    /// Check whether an identical action was already recorded —
    /// the re-delivery test
    pub fn has_identical_action(
        &self,
        node: &NodeId,
        signer: &SignerId,
        decision: Decision,
    ) -> bool {
        self.action_log
            .iter()
            .any(|a| a.same_as(node, signer, decision))
    }

    /// Distinct signers who approved at a node
    pub fn approvers_at(&self, node: &NodeId) -> Vec<&SignerId> {
        self.action_log
            .iter()
            .filter(|a| &a.node == node && a.decision.is_approve())
            .map(|a| &a.signer)
            .collect()
    }

    /// Every signer who acted on this routing, in log order
    pub fn actors(&self) -> Vec<&SignerId> {
        self.action_log.iter().map(|a| &a.signer).collect()
    }

    /// Check if the routing reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    // ── Mutation (callers guard preconditions — see QuorumEngine) ────

    /// Append a signer action to the log
    pub fn record_action(&mut self, action: SignerAction) {
        self.record_event(
            "decision_recorded",
            format!(
                "Signer '{}' recorded {:?} at node '{}'",
                action.signer, action.decision, action.node
            ),
        );
        self.action_log.push(action);
        self.updated_at = Utc::now();
    }

    /// Move the routing to the next node
    pub fn advance_to(&mut self, node: NodeId) {
        self.record_event(
            "advanced",
            format!("Routing advanced from '{}' to '{}'", self.current_node, node),
        );
        self.current_node = node;
        self.updated_at = Utc::now();
    }

    /// Close with approval
    pub fn approve(&mut self) {
        self.close(RequestStatus::Approved, "Request approved");
    }

    /// Close with rejection
    pub fn reject(&mut self) {
        self.close(RequestStatus::Rejected, "Request rejected");
    }

    /// Close by owner withdrawal
    pub fn cancel(&mut self) {
        self.close(RequestStatus::Canceled, "Request canceled by owner");
    }

    /// Close by owner deletion
    pub fn mark_deleted(&mut self) {
        self.close(RequestStatus::Deleted, "Request deleted by owner");
    }

    fn close(&mut self, status: RequestStatus, description: &str) {
        self.record_event("status_changed", description.to_string());
        self.status = status;
        let now = Utc::now();
        self.updated_at = now;
        self.completed_at = Some(now);
    }

    fn record_event(&mut self, event_type: impl Into<String>, description: impl Into<String>) {
        self.events.push(RoutingEvent {
            sequence: self.events.len() as u64,
            event_type: event_type.into(),
            description: description.into(),
            at: Utc::now(),
        });
    }
}
