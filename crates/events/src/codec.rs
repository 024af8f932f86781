//! Typed event <-> (`type`, `payload`) conversion.
//!
//! Domain event enums are expected to be serde *adjacently tagged*
//! (`#[serde(tag = "type", content = "payload")]`) so the variant name is the
//! envelope's `type` and the variant body is its `payload`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use crate::Event;

#[derive(Debug, Error)]
pub enum EventCodecError {
    #[error("failed to serialize event: {0}")]
    Serialize(String),

    #[error("event is not adjacently tagged (missing {0})")]
    MissingField(&'static str),

    #[error("event type mismatch (tag={tag}, event_type={event_type})")]
    TypeMismatch { tag: String, event_type: String },

    #[error("failed to decode '{event_type}' payload: {reason}")]
    Decode { event_type: String, reason: String },
}

/// Serialize a typed event and return its payload part.
pub fn encode_event<E>(event: &E) -> Result<JsonValue, EventCodecError>
where
    E: Event + Serialize,
{
    let tagged = serde_json::to_value(event).map_err(|e| EventCodecError::Serialize(e.to_string()))?;
    let JsonValue::Object(mut obj) = tagged else {
        return Err(EventCodecError::MissingField("type"));
    };

    let tag = obj
        .get("type")
        .and_then(JsonValue::as_str)
        .ok_or(EventCodecError::MissingField("type"))?;
    if tag != event.event_type() {
        return Err(EventCodecError::TypeMismatch {
            tag: tag.to_string(),
            event_type: event.event_type().to_string(),
        });
    }

    obj.remove("payload").ok_or(EventCodecError::MissingField("payload"))
}

/// Rebuild a typed event from its `type` discriminant and payload.
pub fn decode_event<E>(event_type: &str, payload: &JsonValue) -> Result<E, EventCodecError>
where
    E: Event + DeserializeOwned,
{
    let mut obj = Map::new();
    obj.insert("type".to_string(), JsonValue::String(event_type.to_string()));
    obj.insert("payload".to_string(), payload.clone());

    serde_json::from_value(JsonValue::Object(obj)).map_err(|e| EventCodecError::Decode {
        event_type: event_type.to_string(),
        reason: e.to_string(),
    })
}
