use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PresenceUsers {
    pub users: Vec<User>,
}

/// Presence control family. Clients send `add-user`/`remove-user`;
/// only the server emits `presence`.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type", content = "payload")]
pub enum PresenceMessage {
    #[serde(rename = "add-user")]
    AddUser(User),
    #[serde(rename = "remove-user")]
    RemoveUser,
    #[serde(rename = "presence")]
    Presence(PresenceUsers),
}

/// Channel domain events. The envelope tag set is closed but the payload
/// is opaque cargo: rooms relay it without looking inside.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type", content = "payload")]
pub enum ChannelEvent {
    #[serde(rename = "message:created")]
    MessageCreated(Value),
    #[serde(rename = "message:updated")]
    MessageUpdated(Value),
    #[serde(rename = "reaction:updated")]
    ReactionUpdated(Value),
    #[serde(rename = "message:replies:increment")]
    RepliesIncrement(Value),
    #[serde(rename = "thread:reply:created")]
    ThreadReplyCreated(Value),
    #[serde(rename = "thread:reaction:updated")]
    ThreadReactionUpdated(Value),
}

#[derive(Clone, Debug)]
pub enum Inbound {
    Presence(PresenceMessage),
    Event(ChannelEvent),
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown message type")]
    UnknownType,
}

/// Classify one inbound frame. A frame that is valid JSON but matches
/// neither message family is rejected, never forwarded.
pub fn parse(raw: &str) -> Result<Inbound, ParseError> {
    let value: Value = serde_json::from_str(raw)?;

    if let Ok(presence) = serde_json::from_value::<PresenceMessage>(value.clone()) {
        return Ok(Inbound::Presence(presence));
    }

    match serde_json::from_value::<ChannelEvent>(value) {
        Ok(event) => Ok(Inbound::Event(event)),
        Err(_) => Err(ParseError::UnknownType),
    }
}
