//! Serialized per-entity services
//!
//! Routing advancement and graph editing are single-writer critical
//! sections keyed by entity id: two concurrent decisions on one request
//! must not both observe a pre-quorum count and both advance. The lock
//! is fail-fast — contention surfaces as `ConcurrentModification` and
//! the caller retries — so no operation in the core ever blocks.

use crate::{
    DecisionOutcome, GraphEditor, GroupResolver, Notifier, Persistence, QuorumEngine,
    StatusNotification,
};
use chrono::Utc;
use form_types::RequestId;
use parking_lot::Mutex;
use routing_types::{
    Decision, GraphId, NodeId, RequestRouting, RouteGraph, RouteNode, RoutingError, RoutingResult,
    RoutingId, SignerId,
};
use std::collections::HashSet;
use std::hash::Hash;
use tracing::warn;

// ── Per-key lock registry ────────────────────────────────────────────

/// Fail-fast single-writer registry: at most one guard per key at a
/// time, acquisition never blocks.
pub(crate) struct LockMap<K: Eq + Hash + Clone> {
    active: Mutex<HashSet<K>>,
}

impl<K: Eq + Hash + Clone> LockMap<K> {
    pub(crate) fn new() -> Self {
        Self {
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Acquire the key's writer slot, or `None` if another writer
    /// holds it
    pub(crate) fn try_acquire(&self, key: K) -> Option<KeyGuard<'_, K>> {
        let mut active = self.active.lock();
        if active.contains(&key) {
            return None;
        }
        active.insert(key.clone());
        Some(KeyGuard { map: self, key })
    }
}

/// Releases the key's writer slot on drop
pub(crate) struct KeyGuard<'a, K: Eq + Hash + Clone> {
    map: &'a LockMap<K>,
    key: K,
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        self.map.active.lock().remove(&self.key);
    }
}

// ── Routing Service ──────────────────────────────────────────────────

/// Submission and decision processing, serialized per routing id.
///
/// Each operation is one critical section: read current state,
/// validate, append, recompute status, persist. Notifications are
/// dispatched after the save and never roll anything back.
pub struct RoutingService<P, R, N> {
    store: P,
    resolver: R,
    notifier: N,
    engine: QuorumEngine,
    locks: LockMap<RoutingId>,
}

impl<P: Persistence, R: GroupResolver, N: Notifier> RoutingService<P, R, N> {
    pub fn new(store: P, resolver: R, notifier: N) -> Self {
        Self {
            store,
            resolver,
            notifier,
            engine: QuorumEngine::new(),
            locks: LockMap::new(),
        }
    }

    /// The underlying store
    pub fn store(&self) -> &P {
        &self.store
    }

    /// Open a routing for a submitted request against a registered
    /// graph. Notifies the first node's signers (or the terminal
    /// status, for a route that approves on submission).
    pub fn submit(&self, request_id: RequestId, graph_id: &GraphId) -> RoutingResult<RoutingId> {
        let graph = self
            .store
            .load_graph(graph_id)
            .ok_or_else(|| RoutingError::GraphNotFound(graph_id.clone()))?;

        let routing = self.engine.submit(&graph, request_id)?;
        let id = routing.id.clone();
        let notification = self.notification_for(&routing, &graph);
        self.store.save_routing(routing);
        self.dispatch(notification);
        Ok(id)
    }

    /// Apply one signer decision, serialized per routing id
    pub fn decide(
        &self,
        routing_id: &RoutingId,
        node: &NodeId,
        signer: &SignerId,
        decision: Decision,
    ) -> RoutingResult<DecisionOutcome> {
        let _guard = self
            .locks
            .try_acquire(routing_id.clone())
            .ok_or_else(|| RoutingError::ConcurrentModification(routing_id.to_string()))?;

        let mut routing = self
            .store
            .load_routing(routing_id)
            .ok_or_else(|| RoutingError::RoutingNotFound(routing_id.clone()))?;
        let graph = self
            .store
            .load_graph(&routing.graph_id)
            .ok_or_else(|| RoutingError::GraphNotFound(routing.graph_id.clone()))?;

        let outcome = self
            .engine
            .apply_decision(&mut routing, &graph, node, signer, decision, &self.resolver)?;

        let notification = match outcome {
            DecisionOutcome::Advanced { .. }
            | DecisionOutcome::Approved
            | DecisionOutcome::Rejected => Some(self.notification_for(&routing, &graph)),
            DecisionOutcome::Recorded { .. } | DecisionOutcome::Duplicate => None,
        };

        self.store.save_routing(routing);
        if let Some(n) = notification {
            self.dispatch(n);
        }
        Ok(outcome)
    }

    /// Withdraw a pending request (owner action)
    pub fn cancel(&self, routing_id: &RoutingId) -> RoutingResult<()> {
        self.close_with(routing_id, |engine, routing| engine.cancel(routing))
    }

    /// Delete a pending request (owner action)
    pub fn delete(&self, routing_id: &RoutingId) -> RoutingResult<()> {
        self.close_with(routing_id, |engine, routing| engine.delete(routing))
    }

    /// Load a routing snapshot (pure read, no lock)
    pub fn get(&self, routing_id: &RoutingId) -> RoutingResult<RequestRouting> {
        self.store
            .load_routing(routing_id)
            .ok_or_else(|| RoutingError::RoutingNotFound(routing_id.clone()))
    }

    fn close_with(
        &self,
        routing_id: &RoutingId,
        op: impl FnOnce(&QuorumEngine, &mut RequestRouting) -> RoutingResult<()>,
    ) -> RoutingResult<()> {
        let _guard = self
            .locks
            .try_acquire(routing_id.clone())
            .ok_or_else(|| RoutingError::ConcurrentModification(routing_id.to_string()))?;

        let mut routing = self
            .store
            .load_routing(routing_id)
            .ok_or_else(|| RoutingError::RoutingNotFound(routing_id.clone()))?;
        op(&self.engine, &mut routing)?;

        let graph = self.store.load_graph(&routing.graph_id);
        let notification = graph.map(|g| self.notification_for(&routing, &g));
        self.store.save_routing(routing);
        if let Some(n) = notification {
            self.dispatch(n);
        }
        Ok(())
    }

    /// Recipients: the current node's signers while pending, everyone
    /// who acted once terminal.
    fn notification_for(&self, routing: &RequestRouting, graph: &RouteGraph) -> StatusNotification {
        let recipients = if routing.is_terminal() {
            let mut seen = HashSet::new();
            routing
                .actors()
                .into_iter()
                .filter(|s| seen.insert((*s).clone()))
                .cloned()
                .collect()
        } else {
            graph
                .get_node(&routing.current_node)
                .and_then(|n| n.assignment.as_ref())
                .map(|a| self.resolver.resolve(&a.group, Utc::now()))
                .unwrap_or_default()
        };

        StatusNotification {
            routing_id: routing.id.clone(),
            request_id: routing.request_id.clone(),
            status: routing.status,
            recipients,
        }
    }

    fn dispatch(&self, notification: StatusNotification) {
        if let Err(err) = self.notifier.notify(&notification) {
            warn!(routing = %notification.routing_id, %err, "notification delivery failed");
        }
    }
}

// ── Graph Service ────────────────────────────────────────────────────

/// Graph editing, serialized per graph id.
///
/// An edit session loads the latest snapshot, applies the closure
/// against a [`GraphEditor`], and persists only if the closure
/// succeeds — a rejected edit leaves the stored graph untouched.
pub struct GraphService<P> {
    store: P,
    locks: LockMap<GraphId>,
}

impl<P: Persistence> GraphService<P> {
    pub fn new(store: P) -> Self {
        Self {
            store,
            locks: LockMap::new(),
        }
    }

    /// The underlying store
    pub fn store(&self) -> &P {
        &self.store
    }

    /// Create a new graph seeded with its origin node
    pub fn create(&self, name: impl Into<String>) -> RoutingResult<GraphId> {
        let mut graph = RouteGraph::new(name);
        graph.insert_node(RouteNode::origin());
        let id = graph.id.clone();
        self.store.save_graph(graph);
        Ok(id)
    }

    /// Run an editing session against a graph, serialized per graph id
    pub fn edit<T>(
        &self,
        graph_id: &GraphId,
        session: impl FnOnce(&mut GraphEditor<'_>) -> RoutingResult<T>,
    ) -> RoutingResult<T> {
        let _guard = self
            .locks
            .try_acquire(graph_id.clone())
            .ok_or_else(|| RoutingError::ConcurrentModification(graph_id.to_string()))?;

        let mut graph = self
            .store
            .load_graph(graph_id)
            .ok_or_else(|| RoutingError::GraphNotFound(graph_id.clone()))?;

        let mut editor = GraphEditor::new(&mut graph);
        let out = session(&mut editor)?;

        self.store.save_graph(graph);
        Ok(out)
    }

    /// Load a graph snapshot (pure read, no lock)
    pub fn get(&self, graph_id: &GraphId) -> RoutingResult<RouteGraph> {
        self.store
            .load_graph(graph_id)
            .ok_or_else(|| RoutingError::GraphNotFound(graph_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryStore, RecordingNotifier, StaticGroupResolver};
    use routing_types::{NodeKind, Position, RequestStatus, SignerAssignment, SignerGroupId};

    fn make_service() -> RoutingService<InMemoryStore, StaticGroupResolver, RecordingNotifier> {
        let resolver = StaticGroupResolver::new().with_group(
            SignerGroupId::new("managers"),
            vec![SignerId::new("s1"), SignerId::new("s2")],
        );
        RoutingService::new(InMemoryStore::new(), resolver, RecordingNotifier::new())
    }

    fn seed_linear_graph<P: Persistence>(store: &P) -> GraphId {
        use routing_types::{RouteEdge, RouteNode};
        let mut graph = RouteGraph::new("Approval");
        let origin = graph.insert_node(RouteNode::origin());
        let review = graph.insert_node(
            RouteNode::basic("Review")
                .with_assignment(SignerAssignment::new(SignerGroupId::new("managers"), 1)),
        );
        let end = graph.insert_node(RouteNode::end());
        graph.insert_edge(RouteEdge::new(origin, review.clone()));
        graph.insert_edge(RouteEdge::new(review, end));
        let id = graph.id.clone();
        store.save_graph(graph);
        id
    }

    #[test]
    fn test_submit_and_decide_via_service() {
        let service = make_service();
        let graph_id = seed_linear_graph(service.store());

        let routing_id = service.submit(RequestId::new("req-1"), &graph_id).unwrap();
        let routing = service.get(&routing_id).unwrap();
        assert_eq!(routing.status, RequestStatus::Pending);

        let node = routing.current_node.clone();
        let outcome = service
            .decide(&routing_id, &node, &SignerId::new("s1"), Decision::Approve)
            .unwrap();
        assert_eq!(outcome, DecisionOutcome::Approved);

        let routing = service.get(&routing_id).unwrap();
        assert_eq!(routing.status, RequestStatus::Approved);
    }

    #[test]
    fn test_notifications_on_transitions() {
        let service = make_service();
        let graph_id = seed_linear_graph(service.store());

        let routing_id = service.submit(RequestId::new("req-1"), &graph_id).unwrap();
        let node = service.get(&routing_id).unwrap().current_node.clone();
        service
            .decide(&routing_id, &node, &SignerId::new("s1"), Decision::Approve)
            .unwrap();

        let sent = service.notifier.sent();
        // submission (pending, to the node's signers) + approval
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].status, RequestStatus::Pending);
        assert_eq!(sent[0].recipients.len(), 2);
        assert_eq!(sent[1].status, RequestStatus::Approved);
        assert_eq!(sent[1].recipients, vec![SignerId::new("s1")]);
    }

    #[test]
    fn test_cancel_via_service() {
        let service = make_service();
        let graph_id = seed_linear_graph(service.store());
        let routing_id = service.submit(RequestId::new("req-1"), &graph_id).unwrap();

        service.cancel(&routing_id).unwrap();
        assert_eq!(
            service.get(&routing_id).unwrap().status,
            RequestStatus::Canceled
        );
    }

    #[test]
    fn test_lock_contention_is_fail_fast() {
        let locks: LockMap<RoutingId> = LockMap::new();
        let key = RoutingId::new("r1");

        let guard = locks.try_acquire(key.clone());
        assert!(guard.is_some());
        assert!(locks.try_acquire(key.clone()).is_none());

        drop(guard);
        assert!(locks.try_acquire(key).is_some());
    }

    #[test]
    fn test_graph_service_edit_session() {
        let graphs = GraphService::new(InMemoryStore::new());
        let graph_id = graphs.create("Expense").unwrap();

        let (review, end) = graphs
            .edit(&graph_id, |editor| {
                let origin = editor.graph().origin().unwrap().id.clone();
                let review = editor.add_node(NodeKind::Basic, Position::default(), "Review")?;
                let end = editor.add_node(NodeKind::End, Position::default(), "Approved")?;
                editor.connect(&origin, &review)?;
                editor.connect(&review, &end)?;
                Ok((review, end))
            })
            .unwrap();

        let graph = graphs.get(&graph_id).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.outgoing(&review)[0].target, end);
    }

    #[test]
    fn test_failed_edit_session_not_persisted() {
        let graphs = GraphService::new(InMemoryStore::new());
        let graph_id = graphs.create("Expense").unwrap();

        let result = graphs.edit(&graph_id, |editor| {
            editor.add_node(NodeKind::Basic, Position::default(), "Review")?;
            // second origin bounces the whole session
            editor.add_node(NodeKind::Origin, Position::default(), "Another")?;
            Ok(())
        });
        assert!(matches!(result, Err(RoutingError::DuplicateOrigin)));

        // the stored graph still has only its seeded origin
        let graph = graphs.get(&graph_id).unwrap();
        assert_eq!(graph.node_count(), 1);
    }
}
