//! Messages originated by the hub itself.

use serde::{Deserialize, Serialize};

use crate::ids::ClientId;

/// Presence and membership messages sent from the hub to room members.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HubMessage {
    /// Full membership snapshot of a room, sent after every change.
    RoomPresence {
        /// Room the snapshot describes.
        room_id: String,
        /// Every current member, ascending.
        user_ids: Vec<ClientId>,
    },
    /// A client joined the room.
    UserJoined {
        /// Room that was joined.
        room_id: String,
        /// Identity of the joining client.
        user_id: ClientId,
    },
    /// A client left the room (explicitly or by disconnecting).
    UserLeft {
        /// Room that was left.
        room_id: String,
        /// Identity of the departing client.
        user_id: ClientId,
    },
}

impl HubMessage {
    /// Serialize to frame text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn presence_wire_shape() {
        let msg = HubMessage::RoomPresence {
            room_id: "bridge".into(),
            user_ids: vec![ClientId::new(1), ClientId::new(2)],
        };
        let v: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(v["type"], "room-presence");
        assert_eq!(v["room_id"], "bridge");
        assert_eq!(v["user_ids"], serde_json::json!([1, 2]));
    }

    #[test]
    fn membership_notice_wire_shape() {
        let joined = HubMessage::UserJoined {
            room_id: "bridge".into(),
            user_id: ClientId::new(9),
        };
        let v: Value = serde_json::from_str(&joined.to_json().unwrap()).unwrap();
        assert_eq!(v["type"], "user-joined");
        assert_eq!(v["user_id"], 9);

        let left = HubMessage::UserLeft {
            room_id: "bridge".into(),
            user_id: ClientId::new(9),
        };
        let v: Value = serde_json::from_str(&left.to_json().unwrap()).unwrap();
        assert_eq!(v["type"], "user-left");
        assert_eq!(v["room_id"], "bridge");
    }

    #[test]
    fn parses_back_from_wire() {
        let text = r#"{"type":"user-left","room_id":"r","user_id":3}"#;
        let msg: HubMessage = serde_json::from_str(text).unwrap();
        assert_eq!(
            msg,
            HubMessage::UserLeft {
                room_id: "r".into(),
                user_id: ClientId::new(3)
            }
        );
    }
}
