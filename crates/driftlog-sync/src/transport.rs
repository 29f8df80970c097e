//! Transport abstractions for log synchronization.
//!
//! A [`Transport`] provides topic-scoped pubsub plus point-to-point dials
//! with a request/response shape. The [`MemoryNetwork`] implementation
//! wires transports together in-process for tests and simulations.

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Unique identifier for a peer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Events delivered to a topic subscriber.
#[derive(Clone, Debug)]
pub enum TransportEvent {
    /// A peer subscribed to the topic.
    Subscribed { topic: String, peer: PeerId },

    /// A peer unsubscribed from the topic.
    Unsubscribed { topic: String, peer: PeerId },

    /// A peer published a message on the topic.
    Message {
        topic: String,
        from: PeerId,
        data: Vec<u8>,
    },
}

/// Handles inbound dials for a registered protocol.
#[async_trait]
pub trait StreamHandler: Send + Sync {
    /// Process a request from `from` and produce the response bytes.
    async fn handle(&self, from: &PeerId, request: Vec<u8>) -> Result<Vec<u8>>;
}

/// Abstract network transport.
///
/// Implementations provide pubsub topics for broadcast and peer discovery,
/// and dialable protocols for direct request/response exchanges.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The local peer id.
    fn local_peer(&self) -> &PeerId;

    /// Subscribe to a topic. Events for the topic arrive on the returned
    /// channel until [`Transport::unsubscribe`] is called.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Unsubscribe from a topic, notifying the remaining subscribers.
    async fn unsubscribe(&self, topic: &str) -> Result<()>;

    /// Publish a message to every other subscriber of the topic.
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()>;

    /// Register a handler for inbound dials on a protocol.
    async fn register_handler(&self, protocol: &str, handler: Arc<dyn StreamHandler>)
        -> Result<()>;

    /// Remove the handler for a protocol.
    async fn unregister_handler(&self, protocol: &str) -> Result<()>;

    /// Dial a peer on a protocol and await its response.
    async fn dial(&self, peer: &PeerId, protocol: &str, request: Vec<u8>) -> Result<Vec<u8>>;
}

#[derive(Default)]
struct HubState {
    /// Topic name to subscribed peers and their event channels.
    topics: HashMap<String, HashMap<PeerId, mpsc::Sender<TransportEvent>>>,

    /// Registered dial handlers, keyed by peer and protocol.
    handlers: HashMap<(PeerId, String), Arc<dyn StreamHandler>>,
}

/// In-process network hub connecting [`MemoryTransport`] instances.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<RwLock<HubState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport attached to this network.
    pub fn transport(&self, peer: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            local: PeerId::new(peer),
            hub: self.clone(),
        }
    }
}

/// In-memory transport for testing and simulation.
pub struct MemoryTransport {
    local: PeerId,
    hub: MemoryNetwork,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_peer(&self) -> &PeerId {
        &self.local
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<TransportEvent>> {
        let (tx, rx) = mpsc::channel(64);

        let existing: Vec<(PeerId, mpsc::Sender<TransportEvent>)> = {
            let mut state = self.hub.state.write();
            let members = state.topics.entry(topic.to_string()).or_default();
            let existing = members
                .iter()
                .map(|(peer, sender)| (peer.clone(), sender.clone()))
                .collect();
            members.insert(self.local.clone(), tx.clone());
            existing
        };

        // Announce the newcomer to existing members and vice versa, so
        // both sides observe the join.
        for (peer, sender) in existing {
            let _ = sender
                .send(TransportEvent::Subscribed {
                    topic: topic.to_string(),
                    peer: self.local.clone(),
                })
                .await;
            let _ = tx
                .send(TransportEvent::Subscribed {
                    topic: topic.to_string(),
                    peer,
                })
                .await;
        }

        Ok(rx)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        let remaining: Vec<mpsc::Sender<TransportEvent>> = {
            let mut state = self.hub.state.write();
            let members = match state.topics.get_mut(topic) {
                Some(members) => members,
                None => return Err(SyncError::NotSubscribed(topic.to_string())),
            };
            if members.remove(&self.local).is_none() {
                return Err(SyncError::NotSubscribed(topic.to_string()));
            }
            members.values().cloned().collect()
        };

        for sender in remaining {
            let _ = sender
                .send(TransportEvent::Unsubscribed {
                    topic: topic.to_string(),
                    peer: self.local.clone(),
                })
                .await;
        }

        Ok(())
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        let others: Vec<mpsc::Sender<TransportEvent>> = {
            let state = self.hub.state.read();
            let members = match state.topics.get(topic) {
                Some(members) => members,
                None => return Err(SyncError::NotSubscribed(topic.to_string())),
            };
            if !members.contains_key(&self.local) {
                return Err(SyncError::NotSubscribed(topic.to_string()));
            }
            members
                .iter()
                .filter(|(peer, _)| **peer != self.local)
                .map(|(_, sender)| sender.clone())
                .collect()
        };

        for sender in others {
            sender
                .send(TransportEvent::Message {
                    topic: topic.to_string(),
                    from: self.local.clone(),
                    data: data.clone(),
                })
                .await
                .map_err(|e| SyncError::SendFailed(e.to_string()))?;
        }

        Ok(())
    }

    async fn register_handler(
        &self,
        protocol: &str,
        handler: Arc<dyn StreamHandler>,
    ) -> Result<()> {
        self.hub
            .state
            .write()
            .handlers
            .insert((self.local.clone(), protocol.to_string()), handler);
        Ok(())
    }

    async fn unregister_handler(&self, protocol: &str) -> Result<()> {
        self.hub
            .state
            .write()
            .handlers
            .remove(&(self.local.clone(), protocol.to_string()));
        Ok(())
    }

    async fn dial(&self, peer: &PeerId, protocol: &str, request: Vec<u8>) -> Result<Vec<u8>> {
        let handler = self
            .hub
            .state
            .read()
            .handlers
            .get(&(peer.clone(), protocol.to_string()))
            .cloned();

        match handler {
            Some(handler) => handler.handle(&self.local, request).await,
            None => Err(SyncError::NoHandler {
                peer: peer.to_string(),
                protocol: protocol.to_string(),
            }),
        }
    }
}
