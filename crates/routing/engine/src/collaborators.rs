//! Narrow contracts with the surrounding application
//!
//! The core performs no network or disk access of its own. Storage,
//! group membership, and notification delivery arrive through these
//! traits; the in-memory implementations here serve tests and simple
//! embeddings.

use chrono::{DateTime, Utc};
use form_types::{FormSchema, FormSchemaId, RequestId};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use routing_types::{
    GraphId, RequestRouting, RequestStatus, RouteGraph, RoutingId, SignerGroupId, SignerId,
};
use std::collections::HashMap;
use thiserror::Error;

// ── Persistence ──────────────────────────────────────────────────────

/// Storage collaborator. Loads return the latest committed snapshot;
/// saves are atomic per entity. The core never assumes a particular
/// storage engine.
pub trait Persistence {
    fn load_schema(&self, id: &FormSchemaId) -> Option<FormSchema>;
    fn save_schema(&self, schema: FormSchema);
    fn load_graph(&self, id: &GraphId) -> Option<RouteGraph>;
    fn save_graph(&self, graph: RouteGraph);
    fn load_routing(&self, id: &RoutingId) -> Option<RequestRouting>;
    fn save_routing(&self, routing: RequestRouting);
}

impl<T: Persistence + ?Sized> Persistence for &T {
    fn load_schema(&self, id: &FormSchemaId) -> Option<FormSchema> {
        (**self).load_schema(id)
    }

    fn save_schema(&self, schema: FormSchema) {
        (**self).save_schema(schema)
    }

    fn load_graph(&self, id: &GraphId) -> Option<RouteGraph> {
        (**self).load_graph(id)
    }

    fn save_graph(&self, graph: RouteGraph) {
        (**self).save_graph(graph)
    }

    fn load_routing(&self, id: &RoutingId) -> Option<RequestRouting> {
        (**self).load_routing(id)
    }

    fn save_routing(&self, routing: RequestRouting) {
        (**self).save_routing(routing)
    }
}

/// Map-backed storage for tests and in-process embeddings
#[derive(Default)]
pub struct InMemoryStore {
    schemas: RwLock<HashMap<FormSchemaId, FormSchema>>,
    graphs: RwLock<HashMap<GraphId, RouteGraph>>,
    routings: RwLock<HashMap<RoutingId, RequestRouting>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryStore {
    fn load_schema(&self, id: &FormSchemaId) -> Option<FormSchema> {
        self.schemas.read().get(id).cloned()
    }

    fn save_schema(&self, schema: FormSchema) {
        self.schemas.write().insert(schema.id.clone(), schema);
    }

    fn load_graph(&self, id: &GraphId) -> Option<RouteGraph> {
        self.graphs.read().get(id).cloned()
    }

    fn save_graph(&self, graph: RouteGraph) {
        self.graphs.write().insert(graph.id.clone(), graph);
    }

    fn load_routing(&self, id: &RoutingId) -> Option<RequestRouting> {
        self.routings.read().get(id).cloned()
    }

    fn save_routing(&self, routing: RequestRouting) {
        self.routings.write().insert(routing.id.clone(), routing);
    }
}

// ── Identity ─────────────────────────────────────────────────────────

/// Identity collaborator: resolves a signer group to its concrete
/// member list as of a point in time.
///
/// Membership can change between graph authoring and a request's
/// evaluation, so the engine re-resolves on every decision and never
/// caches members in the graph.
pub trait GroupResolver {
    fn resolve(&self, group: &SignerGroupId, at: DateTime<Utc>) -> Vec<SignerId>;
}

/// Fixed group membership for tests and simple embeddings
#[derive(Clone, Debug, Default)]
pub struct StaticGroupResolver {
    groups: HashMap<SignerGroupId, Vec<SignerId>>,
}

impl StaticGroupResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: SignerGroupId, members: Vec<SignerId>) -> Self {
        self.groups.insert(group, members);
        self
    }

    /// Replace a group's membership in place
    pub fn set_members(&mut self, group: SignerGroupId, members: Vec<SignerId>) {
        self.groups.insert(group, members);
    }
}

impl GroupResolver for StaticGroupResolver {
    fn resolve(&self, group: &SignerGroupId, _at: DateTime<Utc>) -> Vec<SignerId> {
        self.groups.get(group).cloned().unwrap_or_default()
    }
}

// ── Notification ─────────────────────────────────────────────────────

/// A fire-and-forget status event, emitted on every terminal or
/// node-advance transition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusNotification {
    pub routing_id: RoutingId,
    pub request_id: RequestId,
    pub status: RequestStatus,
    pub recipients: Vec<SignerId>,
}

/// Notification delivery failure. Logged by the caller and swallowed:
/// delivery never rolls back a state transition.
#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Notification collaborator
pub trait Notifier {
    fn notify(&self, event: &StatusNotification) -> Result<(), NotifyError>;
}

/// Discards every notification
#[derive(Clone, Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: &StatusNotification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Records notifications for assertions in tests
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<StatusNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<StatusNotification> {
        self.sent.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &StatusNotification) -> Result<(), NotifyError> {
        self.sent.lock().push(event.clone());
        Ok(())
    }
}
