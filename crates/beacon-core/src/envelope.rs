//! Client-sent signaling envelopes.
//!
//! An envelope is a JSON object. The hub reads only four fields (`type`,
//! `room_id`, `target_id` and `sender_id`) and carries everything else
//! through untouched. Field presence decides the routing mode:
//!
//! | `target_id` | `room_id` | `type`    | route                |
//! |-------------|-----------|-----------|----------------------|
//! | present     | any       | any       | [`Route::Direct`]    |
//! | absent      | present   | `join`    | [`Route::Join`]      |
//! | absent      | present   | `leave`   | [`Route::Leave`]     |
//! | absent      | present   | other     | [`Route::Room`]      |
//! | absent      | absent    | any       | [`Route::Unroutable`]|
//!
//! A `target_id` that is not a non-negative integer, or a `room_id` that is
//! not a string, counts as absent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::ClientId;

/// Envelope `type` that joins a room.
pub const KIND_JOIN: &str = "join";
/// Envelope `type` that leaves a room.
pub const KIND_LEAVE: &str = "leave";

const FIELD_TYPE: &str = "type";
const FIELD_ROOM_ID: &str = "room_id";
const FIELD_TARGET_ID: &str = "target_id";
const FIELD_SENDER_ID: &str = "sender_id";

/// Errors decoding an inbound frame into an [`Envelope`].
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The frame was not valid JSON.
    #[error("invalid envelope JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The frame was valid JSON but not an object.
    #[error("envelope must be a JSON object")]
    NotAnObject,
}

/// Routing decision for an envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Deliver to a single client.
    Direct(ClientId),
    /// Join the named room.
    Join(String),
    /// Leave the named room.
    Leave(String),
    /// Fan out to the other members of the named room.
    Room(String),
    /// Neither a target nor a room; dropped.
    Unroutable,
}

/// One routable unit of signaling data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope {
    fields: Map<String, Value>,
}

impl Envelope {
    /// Decode an envelope from frame text.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(EnvelopeError::NotAnObject),
        }
    }

    /// The `type` discriminator, if it is a string.
    pub fn kind(&self) -> Option<&str> {
        self.fields.get(FIELD_TYPE).and_then(Value::as_str)
    }

    /// The `room_id`, if it is a string.
    pub fn room_id(&self) -> Option<&str> {
        self.fields.get(FIELD_ROOM_ID).and_then(Value::as_str)
    }

    /// The `target_id`, if it is a non-negative integer.
    pub fn target_id(&self) -> Option<ClientId> {
        self.fields.get(FIELD_TARGET_ID).and_then(as_client_id)
    }

    /// The `sender_id` as currently stamped.
    pub fn sender_id(&self) -> Option<ClientId> {
        self.fields.get(FIELD_SENDER_ID).and_then(as_client_id)
    }

    /// Decide how this envelope is routed.
    pub fn route(&self) -> Route {
        if let Some(target) = self.target_id() {
            return Route::Direct(target);
        }
        let Some(room) = self.room_id() else {
            return Route::Unroutable;
        };
        let room = room.to_owned();
        match self.kind() {
            Some(KIND_JOIN) => Route::Join(room),
            Some(KIND_LEAVE) => Route::Leave(room),
            _ => Route::Room(room),
        }
    }

    /// Overwrite `sender_id` with the true sender identity.
    pub fn stamp_sender(&mut self, sender: ClientId) {
        let _ = self
            .fields
            .insert(FIELD_SENDER_ID.to_owned(), Value::from(sender.get()));
    }

    /// Serialize back to frame text.
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(&self.fields)?)
    }
}

/// JSON numbers arrive as floats from some clients; accept integral values.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn as_client_id(value: &Value) -> Option<ClientId> {
    let Value::Number(number) = value else {
        return None;
    };
    if let Some(n) = number.as_u64() {
        return Some(ClientId::new(n));
    }
    let f = number.as_f64()?;
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64)
        .then(|| ClientId::new(f as u64))
}
