//! Connection registry.
//!
//! Live map from [`SessionToken`] to [`Connection`], shared by every
//! session task, the router, and the keepalive supervisor. A token is
//! present exactly while its connection has not finished teardown.

use crate::connection::Connection;
use dashmap::DashMap;
use signal_types::SessionToken;
use std::sync::Arc;

/// Concurrency-safe map of live connections.
///
/// Map guards are never held across an `.await`: every accessor clones
/// the `Arc` out before returning.
#[derive(Debug, Default)]
pub struct Registry {
    connections: DashMap<SessionToken, Arc<Connection>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `connection` under `token`, overwriting any prior entry.
    ///
    /// The displaced connection is returned, not closed.
    pub fn register(
        &self,
        token: SessionToken,
        connection: Arc<Connection>,
    ) -> Option<Arc<Connection>> {
        self.connections.insert(token, connection)
    }

    /// Insert only if `token` is not already live. Returns whether it was inserted.
    pub fn try_register(&self, token: SessionToken, connection: Arc<Connection>) -> bool {
        match self.connections.entry(token) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(connection);
                true
            }
        }
    }

    /// Find the connection registered under `token`.
    pub fn lookup(&self, token: &SessionToken) -> Option<Arc<Connection>> {
        self.connections
            .get(token)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Remove whatever is registered under `token`.
    pub fn remove(&self, token: &SessionToken) -> Option<Arc<Connection>> {
        self.connections.remove(token).map(|(_, connection)| connection)
    }

    /// Remove `token` only if it still maps to this exact `connection`.
    pub fn release(&self, token: &SessionToken, connection: &Arc<Connection>) -> bool {
        self.connections
            .remove_if(token, |_, current| Arc::ptr_eq(current, connection))
            .is_some()
    }

    /// Point-in-time copy of every entry.
    pub fn snapshot(&self) -> Vec<(SessionToken, Arc<Connection>)> {
        self.connections
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Visit every entry of a snapshot.
    ///
    /// Entries removed after the snapshot was taken are skipped; the
    /// visitor never sees a connection that is no longer registered
    /// at the moment it is visited.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&SessionToken, &Arc<Connection>),
    {
        for (token, connection) in self.snapshot() {
            if self.is_current(&token, &connection) {
                visitor(&token, &connection);
            }
        }
    }

    /// Whether `token` still maps to this exact `connection`.
    pub fn is_current(&self, token: &SessionToken, connection: &Arc<Connection>) -> bool {
        self.connections
            .get(token)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), connection))
    }

    /// Whether `token` is registered.
    pub fn contains(&self, token: &SessionToken) -> bool {
        self.connections.contains_key(token)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
