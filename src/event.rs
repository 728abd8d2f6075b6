//! Event encoding, decoding, and the stored-event envelope.
//!
//! This module provides the data types and pure functions that the store,
//! the projections and the live loop all depend on. No I/O occurs here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::command::CommandContext;

/// Fixed namespace UUID for deterministic stream ID derivation.
///
/// All stream IDs are UUID v5 values derived from this namespace and the
/// `"{aggregate_type}/{instance_id}"` string, so the same entity always maps
/// to the same stream regardless of which process performs the mapping.
const STREAM_NAMESPACE: Uuid = Uuid::from_bytes([
    0x4f, 0x1d, 0x2a, 0x86, 0x0c, 0x5b, 0x4e, 0x21, 0x9d, 0x37, 0x6a, 0xe2, 0x58, 0x13, 0xb0, 0x7c,
]);

/// Derive a deterministic stream UUID from aggregate type and entity ID.
///
/// # Examples
///
/// ```
/// use address_registry_es::stream_uuid;
/// use uuid::Uuid;
///
/// let id = Uuid::new_v4();
/// assert_eq!(stream_uuid("road", id), stream_uuid("road", id));
/// assert_ne!(stream_uuid("road", id), stream_uuid("post-code", id));
/// ```
pub fn stream_uuid(aggregate_type: &str, instance_id: Uuid) -> Uuid {
    let name = format!("{aggregate_type}/{instance_id}");
    Uuid::new_v5(&STREAM_NAMESPACE, name.as_bytes())
}

/// Infrastructure metadata stamped on every persisted event.
///
/// `aggregate_type` and `instance_id` make each event self-describing, so
/// projections can recover the entity identity without an external
/// registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Aggregate type name (e.g., "post-code").
    pub aggregate_type: String,
    /// Entity identifier.
    pub instance_id: Uuid,
    /// Actor identity from the command context, if provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Correlation ID from the command context, if provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// An encoded event ready to be appended to a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedEventData {
    /// Freshly generated UUID v4 event ID.
    pub event_id: Uuid,
    /// Event type tag extracted from the adjacently tagged domain event.
    pub event_type: String,
    /// JSON payload (the `"data"` portion of the tagged enum).
    pub payload: serde_json::Value,
    /// Infrastructure metadata.
    pub metadata: EventMetadata,
}

/// An event as recorded by the event log and delivered to projections.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Client-assigned event ID.
    pub event_id: Uuid,
    /// Stream UUID.
    pub stream_id: Uuid,
    /// Zero-based version within the stream.
    pub stream_version: u64,
    /// Zero-based position in the global log.
    pub global_position: u64,
    /// Event type tag (e.g., "PostCodeCreated").
    pub event_type: String,
    /// JSON payload (the domain event data).
    pub payload: serde_json::Value,
    /// Aggregate identity and audit metadata.
    pub metadata: EventMetadata,
    /// Log-assigned timestamp (Unix epoch milliseconds). Informational only;
    /// never consulted when applying the event.
    pub recorded_at: u64,
}

impl StoredEvent {
    /// Aggregate type of the stream this event belongs to.
    pub fn aggregate_type(&self) -> &str {
        &self.metadata.aggregate_type
    }

    /// Identifier of the entity this event belongs to.
    pub fn instance_id(&self) -> Uuid {
        self.metadata.instance_id
    }
}

/// Encode a domain event into a [`ProposedEventData`].
///
/// Serializes the adjacently tagged domain event, splits it into the
/// `"type"` tag and `"data"` payload, and stamps metadata from the command
/// context and the entity identity.
///
/// # Errors
///
/// Returns `serde_json::Error` if the event cannot be serialized or does
/// not serialize to an adjacently tagged object.
pub fn encode_domain_event<A: Aggregate>(
    event: &A::DomainEvent,
    ctx: &CommandContext,
    instance_id: Uuid,
) -> serde_json::Result<ProposedEventData> {
    // Produces {"type": "PostCodeDeleted", "data": {...}}.
    let value = serde_json::to_value(event)?;
    let serde_json::Value::Object(mut obj) = value else {
        return Err(serde::ser::Error::custom(
            "domain event must serialize to an adjacently tagged object",
        ));
    };

    let event_type = match obj.remove("type") {
        Some(serde_json::Value::String(tag)) => tag,
        _ => {
            return Err(serde::ser::Error::custom(
                "domain event is missing a string \"type\" tag",
            ));
        }
    };

    // Absent for unit variants.
    let payload = obj.remove("data").unwrap_or(serde_json::Value::Null);

    Ok(ProposedEventData {
        event_id: Uuid::new_v4(),
        event_type,
        payload,
        metadata: EventMetadata {
            aggregate_type: A::AGGREGATE_TYPE.to_string(),
            instance_id,
            actor: ctx.actor.clone(),
            correlation_id: ctx.correlation_id.clone(),
        },
    })
}

/// Decode a stored event back into the aggregate's domain event type.
///
/// Reconstructs the adjacently tagged JSON object from the envelope's
/// `event_type` and `payload` and deserializes it.
///
/// # Errors
///
/// Returns `serde_json::Error` if the event type is unknown to `A` or the
/// payload does not match the variant's fields.
pub fn decode_domain_event<A: Aggregate>(event: &StoredEvent) -> serde_json::Result<A::DomainEvent> {
    let tagged = if event.payload.is_null() {
        serde_json::json!({ "type": event.event_type })
    } else {
        serde_json::json!({
            "type": event.event_type,
            "data": event.payload,
        })
    };
    serde_json::from_value(tagged)
}
