//! Approval routing runtime for Ringi
//!
//! The engine behind the approval workflow: invariant-enforcing graph
//! editing, signer quorum evaluation, and the serialized services that
//! tie them to the surrounding application's collaborators.
//!
//! # Key Principle
//!
//! **The engine derives state, it never performs I/O.**
//!
//! Storage, group membership, and notification delivery arrive through
//! the narrow traits in [`collaborators`]; every operation is a pure
//! state transition over values the caller loads and saves.
//!
//! # Architecture
//!
//! - [`GraphEditor`] — atomic, invariant-checked mutations on routing
//!   graphs (connect, delete, duplicate, reconnect, paste)
//! - [`GraphRegistry`] — submission-ready graphs, versioned by
//!   replacement
//! - [`QuorumEngine`] — evaluates signer decisions against per-node
//!   quorum rules and derives request status
//! - [`RoutingService`] / [`GraphService`] — single-writer-per-entity
//!   critical sections around load → validate → mutate → persist
//!
//! # Example
//!
//! ```rust
//! use form_types::RequestId;
//! use routing_engine::{DecisionOutcome, QuorumEngine, StaticGroupResolver};
//! use routing_types::*;
//!
//! // origin -> review (1 of "managers") -> end
//! let mut graph = RouteGraph::new("Expense Approval");
//! let origin = graph.insert_node(RouteNode::origin());
//! let review = graph.insert_node(
//!     RouteNode::basic("Review")
//!         .with_assignment(SignerAssignment::any_of(SignerGroupId::new("managers"))),
//! );
//! let end = graph.insert_node(RouteNode::end());
//! graph.insert_edge(RouteEdge::new(origin, review.clone()));
//! graph.insert_edge(RouteEdge::new(review.clone(), end));
//!
//! let resolver = StaticGroupResolver::new()
//!     .with_group(SignerGroupId::new("managers"), vec![SignerId::new("alice")]);
//!
//! let engine = QuorumEngine::new();
//! let mut routing = engine.submit(&graph, RequestId::new("req-1")).unwrap();
//! let outcome = engine
//!     .apply_decision(
//!         &mut routing,
//!         &graph,
//!         &review,
//!         &SignerId::new("alice"),
//!         Decision::Approve,
//!         &resolver,
//!     )
//!     .unwrap();
//!
//! assert_eq!(outcome, DecisionOutcome::Approved);
//! assert_eq!(routing.status, RequestStatus::Approved);
//! ```

#![deny(unsafe_code)]

pub mod collaborators;
pub mod editor;
pub mod quorum;
pub mod registry;
pub mod service;

pub use collaborators::{
    GroupResolver, InMemoryStore, Notifier, NotifyError, NullNotifier, Persistence,
    RecordingNotifier, StaticGroupResolver, StatusNotification,
};
pub use editor::GraphEditor;
pub use quorum::{DecisionOutcome, QuorumEngine};
pub use registry::GraphRegistry;
pub use service::{GraphService, RoutingService};
