//! Routing domain types for Ringi
//!
//! The approval routing model: user-edited graphs of origin, signing,
//! and end nodes; per-node signer quorum assignments with late-bound
//! group membership; and the live routing state of submitted requests.
//!
//! Graphs are arenas: nodes and edges live in flat maps keyed by
//! generated ids, and every cross-reference is an id lookup. Invariant
//! enforcement on edits lives in `routing-engine`; this crate holds the
//! data model, traversals, and the submission-time validation gate.

#![deny(unsafe_code)]

pub mod error;
pub mod graph;
pub mod routing;
pub mod signer;

pub use error::{EdgeViolation, RoutingError, RoutingResult};
pub use graph::{EdgeId, GraphId, NodeId, NodeKind, Position, RouteEdge, RouteGraph, RouteNode};
pub use routing::{RequestRouting, RequestStatus, RoutingEvent, RoutingId};
pub use signer::{Decision, SignerAction, SignerAssignment, SignerGroupId, SignerId};
