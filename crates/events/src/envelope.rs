use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use ledgerflow_core::AggregateId;

use crate::codec::{self, EventCodecError};
use crate::Event;

/// Envelope for an event: the wire contract between write and read side.
///
/// Serialized as exactly `{aggregateId, version, type, payload, occurredAt}`,
/// one physical message per event.
///
/// Notes:
/// - `version` is the 1-based, gap-free position in the aggregate stream.
/// - `payload` holds the variant-specific fields.
/// - Once appended an event is never mutated; envelopes are plain copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<E> {
    aggregate_id: AggregateId,
    version: u64,
    #[serde(rename = "type")]
    event_type: String,
    payload: E,
    occurred_at: DateTime<Utc>,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        aggregate_id: AggregateId,
        version: u64,
        event_type: impl Into<String>,
        payload: E,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            aggregate_id,
            version,
            event_type: event_type.into(),
            payload,
            occurred_at,
        }
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl EventEnvelope<JsonValue> {
    /// Wrap a typed domain event for the given stream position.
    pub fn from_typed<E>(aggregate_id: AggregateId, version: u64, event: &E) -> Result<Self, EventCodecError>
    where
        E: Event + Serialize,
    {
        let payload = codec::encode_event(event)?;
        Ok(Self::new(
            aggregate_id,
            version,
            event.event_type(),
            payload,
            event.occurred_at(),
        ))
    }

    /// Decode the `type` + `payload` pair back into the typed domain event.
    pub fn decode<E>(&self) -> Result<E, EventCodecError>
    where
        E: Event + serde::de::DeserializeOwned,
    {
        codec::decode_event(&self.event_type, &self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn wire_shape_is_exact() {
        let id = AggregateId::from_uuid(Uuid::nil());
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let env = EventEnvelope::new(id, 3, "FundsDeposited", json!({"amount": 500}), at);

        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(
            wire,
            json!({
                "aggregateId": "00000000-0000-0000-0000-000000000000",
                "version": 3,
                "type": "FundsDeposited",
                "payload": {"amount": 500},
                "occurredAt": "2024-01-02T03:04:05Z",
            })
        );

        let back: EventEnvelope<JsonValue> = serde_json::from_value(wire).unwrap();
        assert_eq!(back, env);
    }
}
