use std::collections::HashMap;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use warp::ws::Message;

use crate::protocol::{self, ChannelEvent, Inbound, PresenceMessage, PresenceUsers, User};

struct ConnectionState {
    sender: mpsc::UnboundedSender<Message>,
    user: Option<User>,
}

/// One room's connection set and presence state. All mutation goes through
/// the room's own lock, so callbacks for one room are processed one at a
/// time; different rooms share nothing.
pub struct Room {
    key: String,
    state: Mutex<HashMap<String, ConnectionState>>,
}

impl Room {
    pub fn new(key: impl Into<String>) -> Self {
        Room {
            key: key.into(),
            state: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Register a connection with no identity yet and send it the current
    /// presence snapshot, so it sees the occupants before announcing itself.
    pub async fn join(&self, connection_id: String, sender: mpsc::UnboundedSender<Message>) {
        let mut connections = self.state.lock().await;
        info!("connection {} joined room {}", connection_id, self.key);

        let snapshot = Self::presence_frame(&connections);
        Self::send_to(&connection_id, &sender, &snapshot);

        connections.insert(connection_id, ConnectionState { sender, user: None });
    }

    /// Process one inbound frame from `connection_id`. Presence mutations
    /// rebroadcast a full snapshot to everyone including the sender; channel
    /// events are relayed verbatim to everyone else. Frames that fail
    /// validation are dropped without touching any state.
    pub async fn handle_frame(&self, connection_id: &str, raw: &str) {
        let parsed = match protocol::parse(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("dropping frame from {connection_id} in {}: {e}", self.key);
                return;
            }
        };

        let mut connections = self.state.lock().await;
        match parsed {
            Inbound::Presence(PresenceMessage::AddUser(user)) => {
                if let Some(state) = connections.get_mut(connection_id) {
                    state.user = Some(user);
                }
                let frame = Self::presence_frame(&connections);
                Self::broadcast(&connections, &frame, None);
            }
            Inbound::Presence(PresenceMessage::RemoveUser) => {
                if let Some(state) = connections.get_mut(connection_id) {
                    state.user = None;
                }
                let frame = Self::presence_frame(&connections);
                Self::broadcast(&connections, &frame, None);
            }
            Inbound::Presence(PresenceMessage::Presence(_)) => {
                // Server-only message type; a client sending it is ignored.
                debug!(
                    "ignoring client presence frame from {connection_id} in {}",
                    self.key
                );
            }
            Inbound::Event(event) => {
                Self::relay(&connections, raw, connection_id, &event);
            }
        }
    }

    /// Drop a connection's state (close and error paths are identical) and
    /// broadcast recomputed presence to whoever is left. Returns true when
    /// the room is now empty and can be evicted.
    pub async fn leave(&self, connection_id: &str) -> bool {
        let mut connections = self.state.lock().await;
        if connections.remove(connection_id).is_some() {
            info!("connection {connection_id} left room {}", self.key);
            let frame = Self::presence_frame(&connections);
            Self::broadcast(&connections, &frame, None);
        }
        connections.is_empty()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.is_empty()
    }

    /// Presence is derived, never stored: collect the identified users
    /// across live connections, deduplicated by id. Ordering is whatever the
    /// map iteration yields; only the id set is deterministic.
    fn online_users(connections: &HashMap<String, ConnectionState>) -> Vec<User> {
        let mut users: HashMap<&str, &User> = HashMap::new();
        for state in connections.values() {
            if let Some(user) = &state.user {
                users.insert(user.id.as_str(), user);
            }
        }
        users.into_values().cloned().collect()
    }

    fn presence_frame(connections: &HashMap<String, ConnectionState>) -> String {
        let message = PresenceMessage::Presence(PresenceUsers {
            users: Self::online_users(connections),
        });
        serde_json::to_string(&message).unwrap_or_else(|e| {
            warn!("failed to serialize presence snapshot: {e}");
            String::from(r#"{"type":"presence","payload":{"users":[]}}"#)
        })
    }

    fn relay(
        connections: &HashMap<String, ConnectionState>,
        raw: &str,
        sender_id: &str,
        event: &ChannelEvent,
    ) {
        debug!("relaying {event:?} from {sender_id}");
        Self::broadcast(connections, raw, Some(sender_id));
    }

    /// Serialize-once fan-out. Each send is independent: one unreachable
    /// target never aborts delivery to the others.
    fn broadcast(connections: &HashMap<String, ConnectionState>, frame: &str, skip: Option<&str>) {
        for (id, state) in connections {
            if skip == Some(id.as_str()) {
                continue;
            }
            Self::send_to(id, &state.sender, frame);
        }
    }

    fn send_to(connection_id: &str, sender: &mpsc::UnboundedSender<Message>, frame: &str) {
        if sender.send(Message::text(frame)).is_err() {
            warn!("failed to send to connection {connection_id}");
        }
    }
}
