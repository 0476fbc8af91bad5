//! Message bus data model (C6): topics, routing strategies, and schema
//! compatibility modes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::id::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicType {
    Queue,
    PubSub,
}

/// The sealed set of routing strategies. Selection logic lives in
/// `rollout-scheduler::bus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    Direct,
    LoadBalanced,
    FanOut,
    Priority,
    ContentBased,
}

impl RoutingStrategy {
    /// Default routing strategy derived from the topic type.
    pub fn default_for(topic_type: TopicType) -> Self {
        match topic_type {
            TopicType::Queue => RoutingStrategy::LoadBalanced,
            TopicType::PubSub => RoutingStrategy::FanOut,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaCompatibilityMode {
    None,
    Backward,
    Forward,
    Full,
}

/// A topic's registered schema: the wire contract for one topic version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSchema {
    pub version: u32,
    pub compatibility: SchemaCompatibilityMode,
    /// JSON-schema-ish field descriptors, keyed by field name. Kept
    /// intentionally small: required-ness, a primitive type tag, and
    /// optional numeric/length bounds and enum values, which is exactly
    /// what the compatibility checker inspects.
    pub fields: HashMap<String, FieldSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub required: bool,
    pub field_type: FieldType,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub enum_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Bool,
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Claimed,
    Acknowledged,
    Failed,
    DeadLetter,
}

/// A message persisted to the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: ResourceId,
    pub topic: String,
    pub schema_version: u32,
    pub payload: serde_json::Value,
    pub priority: u8,
    pub headers: HashMap<String, String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub status: MessageStatus,
    pub delivery_attempts: u32,
    pub acknowledged_at: Option<chrono::DateTime<chrono::Utc>>,
    pub locked_until: Option<chrono::DateTime<chrono::Utc>>,
    pub processing_instance: Option<String>,
    pub error_message: Option<String>,
}

pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// W3C traceparent header key, injected by producers and extracted by
/// consumers to link spans across the bus.
pub const TRACEPARENT_HEADER: &str = "traceparent";
