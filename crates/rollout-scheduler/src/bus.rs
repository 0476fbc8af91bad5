//! Message bus (C6): publish/consume over `rollout-db`'s per-topic claim
//! queue, routing-strategy selection, and the schema compatibility checker
//! gating new schema registrations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rollout_core::id::ResourceId;
use rollout_core::message::{
    FieldSchema, FieldType, Message, MessageStatus, RoutingStrategy, SchemaCompatibilityMode,
    TopicSchema, TopicType, MAX_DELIVERY_ATTEMPTS,
};
use rollout_core::{Error, Result};
use rollout_db::MessageRepo;

/// A message to publish, before routing is applied.
pub struct PublishRequest<'a> {
    pub topic: &'a str,
    pub topic_type: TopicType,
    pub schema_version: u32,
    pub payload: serde_json::Value,
    pub priority: u8,
    pub headers: HashMap<String, String>,
    /// Subscriber group names; only consulted when the topic's routing
    /// strategy resolves to `FanOut`, in which case one independent copy is
    /// published per group so each can claim and acknowledge on its own
    /// schedule.
    pub fan_out_groups: &'a [String],
}

pub struct MessageBus {
    messages: Arc<dyn MessageRepo>,
}

impl MessageBus {
    pub fn new(messages: Arc<dyn MessageRepo>) -> Self {
        Self { messages }
    }

    pub async fn publish(&self, req: PublishRequest<'_>) -> Result<Vec<ResourceId>> {
        let strategy = RoutingStrategy::default_for(req.topic_type);
        let targets: Vec<String> = match strategy {
            RoutingStrategy::FanOut if !req.fan_out_groups.is_empty() => req
                .fan_out_groups
                .iter()
                .map(|group| format!("{}::{group}", req.topic))
                .collect(),
            _ => vec![req.topic.to_string()],
        };

        let mut ids = Vec::with_capacity(targets.len());
        for target in targets {
            let message = Message {
                id: ResourceId::new(),
                topic: target,
                schema_version: req.schema_version,
                payload: req.payload.clone(),
                priority: req.priority,
                headers: req.headers.clone(),
                created_at: chrono::Utc::now(),
                status: MessageStatus::Pending,
                delivery_attempts: 0,
                acknowledged_at: None,
                locked_until: None,
                processing_instance: None,
                error_message: None,
            };
            self.messages.publish(&message).await?;
            ids.push(message.id);
        }
        Ok(ids)
    }

    pub async fn consume(&self, topic: &str, consumer_id: &str, lease: Duration) -> Result<Option<Message>> {
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| Error::InvalidInput(format!("lease out of range: {e}")))?;
        self.messages
            .claim(topic, consumer_id, lease)
            .await
            .map_err(Into::into)
    }

    pub async fn acknowledge(&self, id: ResourceId) -> Result<()> {
        self.messages.acknowledge(id).await.map_err(Into::into)
    }

    /// Requeues the message for another delivery attempt, or dead-letters it
    /// once `MAX_DELIVERY_ATTEMPTS` is reached.
    pub async fn fail(&self, message: &Message, error: &str) -> Result<()> {
        let attempts = message.delivery_attempts;
        if attempts >= MAX_DELIVERY_ATTEMPTS {
            self.messages.dead_letter(message.id, error).await?;
        } else {
            self.messages.fail(message.id, error, attempts).await?;
        }
        Ok(())
    }

    /// Registers a new schema version for `topic`, rejecting it if it
    /// violates the previous version's declared compatibility mode.
    pub async fn register_schema(&self, topic: &str, schema: TopicSchema) -> Result<()> {
        if let Some(latest) = self.messages.latest_schema(topic).await? {
            if !is_compatible(&latest, &schema) {
                return Err(Error::Conflict(format!(
                    "schema version {} for topic {topic} violates {:?} compatibility with version {}",
                    schema.version, schema.compatibility, latest.version
                )));
            }
        }
        self.messages.register_schema(topic, &schema).await.map_err(Into::into)
    }

    pub async fn sweep_expired_leases(&self) -> Result<u64> {
        self.messages.sweep_expired_leases().await.map_err(Into::into)
    }
}

/// Checks `new` against `old` under `new.compatibility`. Follows the same
/// backward/forward definitions as a schema registry: backward compatibility
/// means a consumer reading with the new schema can still read old-schema
/// payloads (no newly-required field may be absent from the old schema, and
/// no shared field may change type); forward compatibility means a consumer
/// still on the old schema can read new-schema payloads.
fn is_compatible(old: &TopicSchema, new: &TopicSchema) -> bool {
    match new.compatibility {
        SchemaCompatibilityMode::None => true,
        SchemaCompatibilityMode::Backward => is_backward_compatible(old, new),
        SchemaCompatibilityMode::Forward => is_forward_compatible(old, new),
        SchemaCompatibilityMode::Full => is_backward_compatible(old, new) && is_forward_compatible(old, new),
    }
}

fn is_backward_compatible(old: &TopicSchema, new: &TopicSchema) -> bool {
    let new_required_fields_are_satisfiable = new.fields.iter().all(|(name, field)| {
        if !field.required {
            return true;
        }
        matches!(old.fields.get(name), Some(old_field) if types_match(old_field.field_type, field.field_type))
    });
    let shared_fields_did_not_narrow = old.fields.iter().all(|(name, old_field)| match new.fields.get(name) {
        Some(new_field) => types_match(old_field.field_type, new_field.field_type) && !narrows(old_field, new_field),
        None => true,
    });
    new_required_fields_are_satisfiable && shared_fields_did_not_narrow
}

fn is_forward_compatible(old: &TopicSchema, new: &TopicSchema) -> bool {
    let old_required_fields_still_produced = old.fields.iter().all(|(name, field)| {
        if !field.required {
            return true;
        }
        matches!(new.fields.get(name), Some(new_field) if types_match(field.field_type, new_field.field_type))
    });
    let shared_fields_did_not_narrow = old.fields.iter().all(|(name, old_field)| match new.fields.get(name) {
        Some(new_field) => types_match(old_field.field_type, new_field.field_type) && !narrows(new_field, old_field),
        None => true,
    });
    old_required_fields_still_produced && shared_fields_did_not_narrow
}

fn types_match(a: FieldType, b: FieldType) -> bool {
    a == b
}

/// Whether `candidate`'s value range is a strict subset of `reference`'s: a
/// tighter `min`/`max` bound, or an `enum_values` list missing a value
/// `reference` allowed.
fn narrows(reference: &FieldSchema, candidate: &FieldSchema) -> bool {
    let min_narrowed = candidate
        .min
        .is_some_and(|c| c > reference.min.unwrap_or(f64::NEG_INFINITY));
    let max_narrowed = candidate
        .max
        .is_some_and(|c| c < reference.max.unwrap_or(f64::INFINITY));
    let enum_narrowed = match (&reference.enum_values, &candidate.enum_values) {
        (Some(ref_values), Some(cand_values)) => ref_values.iter().any(|v| !cand_values.contains(v)),
        (None, Some(_)) => true,
        _ => false,
    };
    min_narrowed || max_narrowed || enum_narrowed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(required: bool, field_type: FieldType) -> FieldSchema {
        FieldSchema {
            required,
            field_type,
            min: None,
            max: None,
            enum_values: None,
        }
    }

    fn schema(version: u32, mode: SchemaCompatibilityMode, fields: &[(&str, FieldSchema)]) -> TopicSchema {
        TopicSchema {
            version,
            compatibility: mode,
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        }
    }

    #[test]
    fn adding_an_optional_field_is_backward_compatible() {
        let old = schema(1, SchemaCompatibilityMode::Backward, &[("id", field(true, FieldType::String))]);
        let new = schema(
            2,
            SchemaCompatibilityMode::Backward,
            &[
                ("id", field(true, FieldType::String)),
                ("note", field(false, FieldType::String)),
            ],
        );
        assert!(is_compatible(&old, &new));
    }

    #[test]
    fn adding_a_required_field_breaks_backward_compatibility() {
        let old = schema(1, SchemaCompatibilityMode::Backward, &[("id", field(true, FieldType::String))]);
        let new = schema(
            2,
            SchemaCompatibilityMode::Backward,
            &[
                ("id", field(true, FieldType::String)),
                ("tenant", field(true, FieldType::String)),
            ],
        );
        assert!(!is_compatible(&old, &new));
    }

    #[test]
    fn removing_a_required_field_breaks_forward_compatibility() {
        let old = schema(
            1,
            SchemaCompatibilityMode::Forward,
            &[
                ("id", field(true, FieldType::String)),
                ("tenant", field(true, FieldType::String)),
            ],
        );
        let new = schema(2, SchemaCompatibilityMode::Forward, &[("id", field(true, FieldType::String))]);
        assert!(!is_compatible(&old, &new));
    }

    #[test]
    fn none_mode_accepts_anything() {
        let old = schema(1, SchemaCompatibilityMode::None, &[("id", field(true, FieldType::Number))]);
        let new = schema(2, SchemaCompatibilityMode::None, &[("id", field(true, FieldType::String))]);
        assert!(is_compatible(&old, &new));
    }

    #[test]
    fn removing_an_enum_value_breaks_backward_compatibility() {
        let mut status = field(true, FieldType::String);
        status.enum_values = Some(vec!["pending".into(), "active".into(), "closed".into()]);
        let old = schema(1, SchemaCompatibilityMode::Backward, &[("status", status.clone())]);

        let mut narrowed_status = status;
        narrowed_status.enum_values = Some(vec!["pending".into(), "active".into()]);
        let new = schema(2, SchemaCompatibilityMode::Backward, &[("status", narrowed_status)]);

        assert!(!is_compatible(&old, &new));
    }

    #[test]
    fn narrowing_a_numeric_bound_breaks_backward_compatibility() {
        let mut amount = field(true, FieldType::Number);
        amount.min = Some(0.0);
        amount.max = Some(1000.0);
        let old = schema(1, SchemaCompatibilityMode::Backward, &[("amount", amount.clone())]);

        let mut narrowed_amount = amount;
        narrowed_amount.max = Some(500.0);
        let new = schema(2, SchemaCompatibilityMode::Backward, &[("amount", narrowed_amount)]);

        assert!(!is_compatible(&old, &new));
    }

    #[test]
    fn widening_a_numeric_bound_stays_backward_compatible() {
        let mut amount = field(true, FieldType::Number);
        amount.min = Some(0.0);
        amount.max = Some(1000.0);
        let old = schema(1, SchemaCompatibilityMode::Backward, &[("amount", amount.clone())]);

        let mut widened_amount = amount;
        widened_amount.max = Some(2000.0);
        let new = schema(2, SchemaCompatibilityMode::Backward, &[("amount", widened_amount)]);

        assert!(is_compatible(&old, &new));
    }
}
