use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

use crate::room::Room;

type Rooms = Arc<RwLock<HashMap<String, Arc<Room>>>>;

/// Maps room keys to live `Room` instances. Rooms are created lazily on the
/// first connection and evicted as soon as the last connection leaves; that
/// loses nothing because presence is always derived from live connections.
#[derive(Clone, Default)]
pub struct RoomRouter {
    rooms: Rooms,
}

impl RoomRouter {
    pub fn new() -> Self {
        RoomRouter {
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Room keys follow the `<namespace>-<id>` convention, e.g.
    /// `channel-42` or `workspace-7`. Anything else is not routable.
    pub fn is_valid_key(key: &str) -> bool {
        match key.split_once('-') {
            Some((namespace, id)) => {
                !namespace.is_empty()
                    && !id.is_empty()
                    && namespace.chars().all(|c| c.is_ascii_alphanumeric())
            }
            None => false,
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Resolve or create the room for `key` and register the connection in
    /// it. Holding the registry lock across the room insert keeps a
    /// concurrent eviction from dropping the room out from under us.
    async fn register(
        &self,
        key: &str,
        connection_id: String,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Arc<Room> {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(key) {
                let room = Arc::clone(room);
                room.join(connection_id, sender).await;
                return room;
            }
        }

        let mut rooms = self.rooms.write().await;
        let room = Arc::clone(
            rooms
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Room::new(key))),
        );
        room.join(connection_id, sender).await;
        room
    }

    /// Remove the connection from its room and evict the room if it ended
    /// up empty. The registry write lock is held across both steps so a
    /// racing `register` cannot land in a room we are about to drop.
    async fn unregister(&self, key: &str, connection_id: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(key) {
            if room.leave(connection_id).await {
                info!("room {} is empty, evicting", room.key());
                rooms.remove(key);
            }
        }
    }

    /// Pump one accepted WebSocket: an unbounded outbound queue drained by a
    /// writer task, and a reader loop feeding frames into the room. Reader
    /// termination, clean or not, is the only disconnect signal.
    pub async fn handle_connection(self, key: String, ws: WebSocket) {
        let connection_id = Uuid::new_v4().to_string();
        let (mut ws_tx, mut ws_rx) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let room = self.register(&key, connection_id.clone(), tx).await;

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = ws_tx.send(message).await {
                    warn!("failed to send WebSocket message: {e}");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            while let Some(result) = ws_rx.next().await {
                match result {
                    Ok(msg) => {
                        if let Ok(text) = msg.to_str() {
                            room.handle_frame(&connection_id, text).await;
                        } else if msg.is_close() {
                            break;
                        } else {
                            debug!("ignoring non-text frame from {connection_id}");
                        }
                    }
                    Err(e) => {
                        warn!("WebSocket error on {connection_id}: {e}");
                        break;
                    }
                }
            }

            self.unregister(&key, &connection_id).await;
        });
    }
}
