//! Live-update channel: subscriber registry and broadcast engine.
//!
//! Fan-out is fire-and-forget. Each subscriber is an unbounded outbound
//! queue owned by its WebSocket task, so a slow socket never stalls
//! delivery to the others; a failed send is logged and skipped, and the
//! dead subscriber removes itself from the registry on its own exit path.

pub mod simulator;

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::model::BroadcastMessage;
use crate::query::{QueryService, ThreatFilter};

pub type SubscriberId = Uuid;

/// Outbound handle for one live-update subscriber. Serialized frames go in,
/// the owning WebSocket task forwards them to the wire.
pub type SubscriberSender = mpsc::UnboundedSender<String>;

/// The set of currently connected live-update clients.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<SubscriberId, SubscriberSender>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and immediately queue its acknowledgment
    /// frame. Returns the id the connection task uses to remove itself.
    pub async fn add(&self, sender: SubscriberSender) -> SubscriberId {
        let id = Uuid::new_v4();
        if let Ok(ack) = serde_json::to_string(&BroadcastMessage::connected(id)) {
            let _ = sender.send(ack);
        }
        self.subscribers.write().await.insert(id, sender);
        info!(subscriber = %id, "subscriber connected");
        id
    }

    /// Idempotent: removing an unknown or already-removed id is a no-op.
    pub async fn remove(&self, id: SubscriberId) {
        if self.subscribers.write().await.remove(&id).is_some() {
            info!(subscriber = %id, "subscriber disconnected");
        }
    }

    pub async fn count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    async fn snapshot(&self) -> Vec<(SubscriberId, SubscriberSender)> {
        self.subscribers
            .read()
            .await
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect()
    }
}

/// Pushes typed messages to every registered subscriber.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    query: QueryService,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriberRegistry>, query: QueryService) -> Self {
        Self { registry, query }
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Deliver a message to every subscriber in the current registry
    /// snapshot. Per-subscriber failures are contained: a dead connection
    /// is skipped, the rest still receive the message, and nothing
    /// propagates to the caller.
    pub async fn broadcast(&self, message: &BroadcastMessage) {
        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "dropping unserializable broadcast message");
                return;
            }
        };
        let subscribers = self.registry.snapshot().await;
        let total = subscribers.len();
        let mut delivered = 0usize;
        for (id, sender) in subscribers {
            if sender.send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!(subscriber = %id, "send failed, subscriber presumed dead");
            }
        }
        debug!(delivered, total, "broadcast complete");
    }

    /// Broadcast a threat-detected alert. With an id: look the threat up
    /// and broadcast on a hit, silently skip (logged) on a miss. Without:
    /// broadcast a uniformly random entry from the current collection,
    /// doing nothing when it is empty. Never surfaces an error.
    pub async fn trigger_threat_alert(&self, threat_id: Option<&str>) {
        let threat = match threat_id {
            Some(id) => match self.query.get_threat_by_id(id).await {
                Ok(threat) => Some(threat),
                Err(e) => {
                    info!(threat_id = id, error = %e, "alert trigger skipped");
                    None
                }
            },
            None => match self.query.get_threats(&ThreatFilter::default()).await {
                Ok(threats) if !threats.is_empty() => {
                    let index = rand::thread_rng().gen_range(0..threats.len());
                    threats.into_iter().nth(index)
                }
                Ok(_) => {
                    info!("alert trigger skipped: threat collection is empty");
                    None
                }
                Err(e) => {
                    info!(error = %e, "alert trigger skipped");
                    None
                }
            },
        };
        if let Some(threat) = threat {
            self.broadcast(&BroadcastMessage::threat_detected(threat)).await;
        }
    }
}
