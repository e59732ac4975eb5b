//! Signer quorum engine: deriving request status from signer actions
//!
//! The engine evaluates one signer decision at a time against the
//! current node's quorum rule and emits a typed outcome. It counts
//! approvals among the group membership resolved *at decision time*,
//! advances the routing when quorum is met, and terminates it on the
//! first reject. It never chooses between branches — on fan-out the
//! first outgoing edge in insertion order is the route.

use crate::GroupResolver;
use chrono::Utc;
use form_types::RequestId;
use routing_types::{
    Decision, NodeId, NodeKind, RequestRouting, RouteGraph, RoutingError, RoutingResult,
    SignerAction, SignerId,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Result of applying one signer decision
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionOutcome {
    /// Approval recorded, quorum not yet met
    Recorded { approvals: usize, required: u32 },
    /// Quorum met; the routing advanced to the next signing node
    Advanced { to: NodeId },
    /// Quorum met and an end node was reached; the request is approved
    Approved,
    /// A reject decision closed the routing
    Rejected,
    /// Identical action re-delivered; nothing changed
    Duplicate,
}

/// The quorum state machine. Stateless: all state lives on the routing
/// and the graph; collaborators are passed in per call.
#[derive(Clone, Debug, Default)]
pub struct QuorumEngine;

impl QuorumEngine {
    pub fn new() -> Self {
        Self
    }

    /// Open a routing for a submitted request.
    ///
    /// The graph must pass submission validation. The routing starts at
    /// the origin's single successor; if that successor is already an
    /// end node the request is approved on the spot.
    pub fn submit(&self, graph: &RouteGraph, request_id: RequestId) -> RoutingResult<RequestRouting> {
        graph.validate_for_submission()?;

        let origin = graph.origin().ok_or(RoutingError::NoOrigin)?;
        let first = graph
            .outgoing(&origin.id)
            .first()
            .map(|e| e.target.clone())
            .ok_or_else(|| RoutingError::DeadEnd(origin.id.clone()))?;

        let mut routing = RequestRouting::new(request_id, graph.id.clone(), first.clone());
        info!(routing = %routing.id, graph = %graph.id, node = %first, "routing opened");

        if graph.get_node(&first).map(|n| n.kind.is_end()) == Some(true) {
            routing.approve();
        }
        Ok(routing)
    }

    /// Apply one signer decision at a node.
    ///
    /// Re-delivery of an identical action is a benign no-op; everything
    /// else that cannot apply is a typed error that leaves the routing
    /// untouched.
    pub fn apply_decision(
        &self,
        routing: &mut RequestRouting,
        graph: &RouteGraph,
        node: &NodeId,
        signer: &SignerId,
        decision: Decision,
        resolver: &dyn GroupResolver,
    ) -> RoutingResult<DecisionOutcome> {
        if routing.graph_id != graph.id {
            return Err(RoutingError::Validation(format!(
                "routing {} belongs to graph {}, not {}",
                routing.id, routing.graph_id, graph.id
            )));
        }

        // Retries deliver the same action twice; swallow them before
        // any other precondition can turn them into an error.
        if routing.has_identical_action(node, signer, decision) {
            debug!(routing = %routing.id, %node, %signer, "re-delivered action ignored");
            return Ok(DecisionOutcome::Duplicate);
        }

        if routing.is_terminal() {
            return Err(RoutingError::RequestClosed(routing.status));
        }
        if node != &routing.current_node {
            return Err(RoutingError::NotCurrentNode {
                acted: node.clone(),
                current: routing.current_node.clone(),
            });
        }

        let current = graph
            .get_node(node)
            .ok_or_else(|| RoutingError::NodeNotFound(node.clone()))?;
        let assignment = current
            .assignment
            .as_ref()
            .ok_or_else(|| RoutingError::MissingAssignment(node.clone()))?;

        // Membership is late-bound: resolved now, never cached
        let members = resolver.resolve(&assignment.group, Utc::now());
        if !members.contains(signer) {
            return Err(RoutingError::UnknownSigner {
                signer: signer.clone(),
                group: assignment.group.clone(),
            });
        }
        if routing.action_by(node, signer).is_some() {
            return Err(RoutingError::DuplicateSignerAction {
                node: node.clone(),
                signer: signer.clone(),
            });
        }

        routing.record_action(SignerAction::new(node.clone(), signer.clone(), decision));

        if decision == Decision::Reject {
            // Default policy: a single reject is terminal, not counted
            // against quorum
            routing.reject();
            info!(routing = %routing.id, %node, %signer, "request rejected");
            return Ok(DecisionOutcome::Rejected);
        }

        let approvals = routing
            .approvers_at(node)
            .into_iter()
            .filter(|s| members.contains(s))
            .count();
        let required = assignment.required_count;

        if approvals < required as usize {
            if required as usize > members.len() {
                warn!(
                    routing = %routing.id, %node, required, members = members.len(),
                    "quorum unreachable with current membership; routing stalls"
                );
            }
            debug!(routing = %routing.id, %node, approvals, required, "approval recorded");
            return Ok(DecisionOutcome::Recorded {
                approvals,
                required,
            });
        }

        // Node cleared: advance along the first outgoing edge
        let next = graph
            .outgoing(node)
            .first()
            .map(|e| e.target.clone())
            .ok_or_else(|| RoutingError::DeadEnd(node.clone()))?;
        routing.advance_to(next.clone());

        if graph.get_node(&next).map(|n| n.kind.is_end()) == Some(true) {
            routing.approve();
            info!(routing = %routing.id, "request approved");
            return Ok(DecisionOutcome::Approved);
        }

        info!(routing = %routing.id, from = %node, to = %next, "node cleared, routing advanced");
        Ok(DecisionOutcome::Advanced { to: next })
    }

    /// Withdraw a pending request. Owner-triggered; terminal; freezes
    /// the action log.
    pub fn cancel(&self, routing: &mut RequestRouting) -> RoutingResult<()> {
        if routing.is_terminal() {
            return Err(RoutingError::RequestClosed(routing.status));
        }
        routing.cancel();
        info!(routing = %routing.id, "request canceled");
        Ok(())
    }

    /// Delete a pending request. Owner-triggered; terminal; freezes the
    /// action log.
    pub fn delete(&self, routing: &mut RequestRouting) -> RoutingResult<()> {
        if routing.is_terminal() {
            return Err(RoutingError::RequestClosed(routing.status));
        }
        routing.mark_deleted();
        info!(routing = %routing.id, "request deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticGroupResolver;
    use routing_types::{Position, RequestStatus, RouteEdge, RouteNode, SignerAssignment, SignerGroupId};

    fn signer(id: &str) -> SignerId {
        SignerId::new(id)
    }

    /// origin -> review (quorum over "managers") -> end
    fn make_graph(required: u32) -> (RouteGraph, NodeId) {
        let mut graph = RouteGraph::new("Approval");
        let origin = graph.insert_node(RouteNode::origin().with_id("origin"));
        let review = graph.insert_node(
            RouteNode::basic("Review")
                .with_id("review")
                .with_position(Position::new(100.0, 0.0))
                .with_assignment(SignerAssignment::new(
                    SignerGroupId::new("managers"),
                    required,
                )),
        );
        let end = graph.insert_node(RouteNode::end().with_id("end"));
        graph.insert_edge(RouteEdge::new(origin, review.clone()));
        graph.insert_edge(RouteEdge::new(review.clone(), end));
        (graph, review)
    }

    fn make_resolver(members: &[&str]) -> StaticGroupResolver {
        StaticGroupResolver::new().with_group(
            SignerGroupId::new("managers"),
            members.iter().map(|s| signer(s)).collect(),
        )
    }

    #[test]
    fn test_two_of_three_quorum_advances_exactly_once() {
        let engine = QuorumEngine::new();
        let (graph, review) = make_graph(2);
        let resolver = make_resolver(&["s1", "s2", "s3"]);
        let mut routing = engine.submit(&graph, RequestId::new("req-1")).unwrap();

        let first = engine
            .apply_decision(&mut routing, &graph, &review, &signer("s1"), Decision::Approve, &resolver)
            .unwrap();
        assert_eq!(
            first,
            DecisionOutcome::Recorded {
                approvals: 1,
                required: 2
            }
        );
        assert_eq!(routing.status, RequestStatus::Pending);

        let second = engine
            .apply_decision(&mut routing, &graph, &review, &signer("s2"), Decision::Approve, &resolver)
            .unwrap();
        assert_eq!(second, DecisionOutcome::Approved);
        assert_eq!(routing.status, RequestStatus::Approved);
        assert_eq!(routing.current_node, NodeId::new("end"));

        // A third action from the same pair is a no-op
        let third = engine
            .apply_decision(&mut routing, &graph, &review, &signer("s1"), Decision::Approve, &resolver)
            .unwrap();
        assert_eq!(third, DecisionOutcome::Duplicate);
        assert_eq!(routing.action_log.len(), 2);
    }

    #[test]
    fn test_single_reject_terminates_regardless_of_quorum() {
        let engine = QuorumEngine::new();
        let (graph, review) = make_graph(2);
        let resolver = make_resolver(&["s1", "s2", "s3"]);
        let mut routing = engine.submit(&graph, RequestId::new("req-1")).unwrap();

        let outcome = engine
            .apply_decision(&mut routing, &graph, &review, &signer("s3"), Decision::Reject, &resolver)
            .unwrap();
        assert_eq!(outcome, DecisionOutcome::Rejected);
        assert_eq!(routing.status, RequestStatus::Rejected);
        assert!(routing.completed_at.is_some());
    }

    #[test]
    fn test_action_after_routing_left_node_is_not_current() {
        let engine = QuorumEngine::new();
        let (graph, review) = make_graph(1);
        let resolver = make_resolver(&["s1", "s2"]);
        let mut routing = engine.submit(&graph, RequestId::new("req-1")).unwrap();

        // s1 alone clears the node and reaches the end
        let outcome = engine
            .apply_decision(&mut routing, &graph, &review, &signer("s1"), Decision::Approve, &resolver)
            .unwrap();
        assert_eq!(outcome, DecisionOutcome::Approved);

        // s2 acting on review afterwards: routing already left it
        let late = engine.apply_decision(
            &mut routing,
            &graph,
            &review,
            &signer("s2"),
            Decision::Approve,
            &resolver,
        );
        assert!(matches!(late, Err(RoutingError::NotCurrentNode { .. })));
    }

    #[test]
    fn test_same_signer_cannot_flip_decision() {
        let engine = QuorumEngine::new();
        let (graph, review) = make_graph(2);
        let resolver = make_resolver(&["s1", "s2"]);
        let mut routing = engine.submit(&graph, RequestId::new("req-1")).unwrap();

        engine
            .apply_decision(&mut routing, &graph, &review, &signer("s1"), Decision::Approve, &resolver)
            .unwrap();
        let flip = engine.apply_decision(
            &mut routing,
            &graph,
            &review,
            &signer("s1"),
            Decision::Reject,
            &resolver,
        );
        assert!(matches!(
            flip,
            Err(RoutingError::DuplicateSignerAction { .. })
        ));
        assert_eq!(routing.status, RequestStatus::Pending);
    }

    #[test]
    fn test_non_member_rejected() {
        let engine = QuorumEngine::new();
        let (graph, review) = make_graph(1);
        let resolver = make_resolver(&["s1"]);
        let mut routing = engine.submit(&graph, RequestId::new("req-1")).unwrap();

        let outcome = engine.apply_decision(
            &mut routing,
            &graph,
            &review,
            &signer("outsider"),
            Decision::Approve,
            &resolver,
        );
        assert!(matches!(outcome, Err(RoutingError::UnknownSigner { .. })));
        assert!(routing.action_log.is_empty());
    }

    #[test]
    fn test_membership_resolved_at_decision_time() {
        let engine = QuorumEngine::new();
        let (graph, review) = make_graph(1);
        let mut routing = engine.submit(&graph, RequestId::new("req-1")).unwrap();

        // s9 was not a member when the graph was authored, but is now
        let resolver = make_resolver(&["s9"]);
        let outcome = engine
            .apply_decision(&mut routing, &graph, &review, &signer("s9"), Decision::Approve, &resolver)
            .unwrap();
        assert_eq!(outcome, DecisionOutcome::Approved);
    }

    #[test]
    fn test_multi_node_route_advances() {
        let engine = QuorumEngine::new();
        let mut graph = RouteGraph::new("Two Step");
        let origin = graph.insert_node(RouteNode::origin().with_id("origin"));
        let first = graph.insert_node(
            RouteNode::basic("First")
                .with_id("first")
                .with_assignment(SignerAssignment::any_of(SignerGroupId::new("managers"))),
        );
        let second = graph.insert_node(
            RouteNode::basic("Second")
                .with_id("second")
                .with_assignment(SignerAssignment::any_of(SignerGroupId::new("directors"))),
        );
        let end = graph.insert_node(RouteNode::end().with_id("end"));
        graph.insert_edge(RouteEdge::new(origin, first.clone()));
        graph.insert_edge(RouteEdge::new(first.clone(), second.clone()));
        graph.insert_edge(RouteEdge::new(second.clone(), end));

        let resolver = StaticGroupResolver::new()
            .with_group(SignerGroupId::new("managers"), vec![signer("m1")])
            .with_group(SignerGroupId::new("directors"), vec![signer("d1")]);

        let mut routing = engine.submit(&graph, RequestId::new("req-1")).unwrap();
        assert_eq!(routing.current_node, first);

        let outcome = engine
            .apply_decision(&mut routing, &graph, &first, &signer("m1"), Decision::Approve, &resolver)
            .unwrap();
        assert_eq!(outcome, DecisionOutcome::Advanced { to: second.clone() });

        let outcome = engine
            .apply_decision(&mut routing, &graph, &second, &signer("d1"), Decision::Approve, &resolver)
            .unwrap();
        assert_eq!(outcome, DecisionOutcome::Approved);
    }

    #[test]
    fn test_cancel_only_while_pending() {
        let engine = QuorumEngine::new();
        let (graph, review) = make_graph(1);
        let resolver = make_resolver(&["s1"]);
        let mut routing = engine.submit(&graph, RequestId::new("req-1")).unwrap();

        engine
            .apply_decision(&mut routing, &graph, &review, &signer("s1"), Decision::Approve, &resolver)
            .unwrap();
        assert!(matches!(
            engine.cancel(&mut routing),
            Err(RoutingError::RequestClosed(RequestStatus::Approved))
        ));

        let mut pending = engine.submit(&graph, RequestId::new("req-2")).unwrap();
        engine.cancel(&mut pending).unwrap();
        assert_eq!(pending.status, RequestStatus::Canceled);

        // The log is frozen: further decisions bounce
        let after = engine.apply_decision(
            &mut pending,
            &graph,
            &review,
            &signer("s1"),
            Decision::Approve,
            &resolver,
        );
        assert!(matches!(after, Err(RoutingError::RequestClosed(_))));
    }

    #[test]
    fn test_delete_only_while_pending() {
        let engine = QuorumEngine::new();
        let (graph, _) = make_graph(1);
        let mut routing = engine.submit(&graph, RequestId::new("req-1")).unwrap();

        engine.delete(&mut routing).unwrap();
        assert_eq!(routing.status, RequestStatus::Deleted);
        assert!(matches!(
            engine.delete(&mut routing),
            Err(RoutingError::RequestClosed(_))
        ));
    }

    #[test]
    fn test_submit_rejects_incomplete_graph() {
        let engine = QuorumEngine::new();
        let mut graph = RouteGraph::new("No End");
        graph.insert_node(RouteNode::origin().with_id("origin"));
        let result = engine.submit(&graph, RequestId::new("req-1"));
        assert!(result.is_err());
    }

    #[test]
    fn test_outcome_serializes_for_api_responses() {
        let outcome = DecisionOutcome::Recorded {
            approvals: 1,
            required: 2,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        let back: DecisionOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn test_quorum_counts_only_current_members() {
        let engine = QuorumEngine::new();
        let (graph, review) = make_graph(2);
        let mut routing = engine.submit(&graph, RequestId::new("req-1")).unwrap();

        // s1 approves while still a member
        let resolver = make_resolver(&["s1", "s2", "s3"]);
        engine
            .apply_decision(&mut routing, &graph, &review, &signer("s1"), Decision::Approve, &resolver)
            .unwrap();

        // s1 leaves the group; s2's approval alone does not meet quorum
        let resolver = make_resolver(&["s2", "s3"]);
        let outcome = engine
            .apply_decision(&mut routing, &graph, &review, &signer("s2"), Decision::Approve, &resolver)
            .unwrap();
        assert_eq!(
            outcome,
            DecisionOutcome::Recorded {
                approvals: 1,
                required: 2
            }
        );
        assert_eq!(routing.status, RequestStatus::Pending);
    }
}
