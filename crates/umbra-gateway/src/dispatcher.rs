use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use umbra_types::events::GatewayEvent;

/// Fans room-scoped events out to every gateway connection. Each connection
/// filters by its own room subscriptions.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Live connections: conn_id -> user_id
    connections: RwLock<HashMap<Uuid, i64>>,

    /// (user_id, room_id) pairs allowed to subscribe
    room_grants: RwLock<HashSet<(i64, i64)>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
                room_grants: RwLock::new(HashSet::new()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event. Having no connected clients is not an error.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    pub async fn register(&self, user_id: i64) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.inner.connections.write().await.insert(conn_id, user_id);
        conn_id
    }

    pub async fn unregister(&self, conn_id: Uuid) {
        self.inner.connections.write().await.remove(&conn_id);
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    /// Records that the user passed the room's entry check over HTTP.
    pub async fn grant_room(&self, user_id: i64, room_id: i64) {
        self.inner.room_grants.write().await.insert((user_id, room_id));
    }

    pub async fn may_join(&self, user_id: i64, room_id: i64) -> bool {
        self.inner.room_grants.read().await.contains(&(user_id, room_id))
    }
}
