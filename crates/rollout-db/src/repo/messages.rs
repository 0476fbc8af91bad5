//! Message bus repository (C6): per-topic claim queue plus the schema
//! registry used by the compatibility checker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollout_core::id::ResourceId;
use rollout_core::message::{Message, MessageStatus, SchemaCompatibilityMode, TopicSchema};
use sqlx::PgPool;
use std::collections::HashMap;

use crate::codec::{enum_to_text, text_to_enum};
use crate::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: uuid::Uuid,
    topic: String,
    schema_version: i32,
    payload: serde_json::Value,
    priority: i16,
    headers: serde_json::Value,
    created_at: DateTime<Utc>,
    status: String,
    delivery_attempts: i32,
    acknowledged_at: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
    processing_instance: Option<String>,
    error_message: Option<String>,
}

fn row_to_message(row: MessageRow) -> DbResult<Message> {
    let headers: HashMap<String, String> = serde_json::from_value(row.headers)
        .map_err(|e| DbError::Database(sqlx::Error::Decode(Box::new(e))))?;
    Ok(Message {
        id: ResourceId::from_uuid(row.id),
        topic: row.topic,
        schema_version: row.schema_version as u32,
        payload: row.payload,
        priority: row.priority as u8,
        headers,
        created_at: row.created_at,
        status: text_to_enum::<MessageStatus>(&row.status)?,
        delivery_attempts: row.delivery_attempts as u32,
        acknowledged_at: row.acknowledged_at,
        locked_until: row.locked_until,
        processing_instance: row.processing_instance,
        error_message: row.error_message,
    })
}

#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn publish(&self, message: &Message) -> DbResult<()>;
    async fn get(&self, id: ResourceId) -> DbResult<Message>;
    async fn claim(
        &self,
        topic: &str,
        worker_id: &str,
        lease: chrono::Duration,
    ) -> DbResult<Option<Message>>;
    async fn acknowledge(&self, id: ResourceId) -> DbResult<()>;
    async fn fail(&self, id: ResourceId, error: &str, delivery_attempts: u32) -> DbResult<()>;
    async fn dead_letter(&self, id: ResourceId, error: &str) -> DbResult<()>;
    async fn sweep_expired_leases(&self) -> DbResult<u64>;

    async fn register_schema(&self, topic: &str, schema: &TopicSchema) -> DbResult<()>;
    async fn latest_schema(&self, topic: &str) -> DbResult<Option<TopicSchema>>;
    async fn schema(&self, topic: &str, version: u32) -> DbResult<Option<TopicSchema>>;
}

pub struct PgMessageRepo {
    pool: PgPool,
}

impl PgMessageRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepo for PgMessageRepo {
    async fn publish(&self, message: &Message) -> DbResult<()> {
        let headers = serde_json::to_value(&message.headers)
            .map_err(|e| DbError::Database(sqlx::Error::Protocol(e.to_string())))?;
        sqlx::query(
            r#"
            INSERT INTO messages (id, topic, schema_version, payload, priority, headers, status,
                                   delivery_attempts, created_at, acknowledged_at, locked_until,
                                   processing_instance, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(message.id.as_uuid())
        .bind(&message.topic)
        .bind(message.schema_version as i32)
        .bind(&message.payload)
        .bind(message.priority as i16)
        .bind(headers)
        .bind(enum_to_text(&message.status)?)
        .bind(message.delivery_attempts as i32)
        .bind(message.created_at)
        .bind(message.acknowledged_at)
        .bind(message.locked_until)
        .bind(&message.processing_instance)
        .bind(&message.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: ResourceId) -> DbResult<Message> {
        let row = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("message {id}")))?;
        row_to_message(row)
    }

    async fn claim(
        &self,
        topic: &str,
        worker_id: &str,
        lease: chrono::Duration,
    ) -> DbResult<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            UPDATE messages
            SET status = 'claimed', delivery_attempts = delivery_attempts + 1,
                locked_until = NOW() + $3::interval, processing_instance = $2
            WHERE id = (
                SELECT id FROM messages
                WHERE topic = $1
                  AND (status = 'pending' OR (status = 'claimed' AND locked_until < NOW()))
                ORDER BY priority DESC, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(topic)
        .bind(worker_id)
        .bind(format!("{} seconds", lease.num_seconds()))
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_message).transpose()
    }

    async fn acknowledge(&self, id: ResourceId) -> DbResult<()> {
        sqlx::query(
            "UPDATE messages SET status = 'acknowledged', acknowledged_at = NOW(), locked_until = NULL WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(&self, id: ResourceId, error: &str, delivery_attempts: u32) -> DbResult<()> {
        sqlx::query(
            "UPDATE messages SET status = 'pending', error_message = $2, delivery_attempts = $3, locked_until = NULL WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(error)
        .bind(delivery_attempts as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn dead_letter(&self, id: ResourceId, error: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE messages SET status = 'dead_letter', error_message = $2, locked_until = NULL WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sweep_expired_leases(&self) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE messages SET status = 'pending', locked_until = NULL, processing_instance = NULL
             WHERE status = 'claimed' AND locked_until < NOW()",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn register_schema(&self, topic: &str, schema: &TopicSchema) -> DbResult<()> {
        let compatibility = enum_to_text(&schema.compatibility)?;
        let fields = serde_json::to_value(&schema.fields)
            .map_err(|e| DbError::Database(sqlx::Error::Protocol(e.to_string())))?;
        sqlx::query(
            r#"
            INSERT INTO topic_schemas (topic, version, compatibility, fields)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (topic, version) DO UPDATE SET
                compatibility = EXCLUDED.compatibility, fields = EXCLUDED.fields
            "#,
        )
        .bind(topic)
        .bind(schema.version as i32)
        .bind(compatibility)
        .bind(fields)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_schema(&self, topic: &str) -> DbResult<Option<TopicSchema>> {
        let row: Option<(i32, String, serde_json::Value)> = sqlx::query_as(
            "SELECT version, compatibility, fields FROM topic_schemas WHERE topic = $1 ORDER BY version DESC LIMIT 1",
        )
        .bind(topic)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(version, compatibility, fields)| {
            Ok(TopicSchema {
                version: version as u32,
                compatibility: text_to_enum::<SchemaCompatibilityMode>(&compatibility)?,
                fields: serde_json::from_value(fields)
                    .map_err(|e| DbError::Database(sqlx::Error::Decode(Box::new(e))))?,
            })
        })
        .transpose()
    }

    async fn schema(&self, topic: &str, version: u32) -> DbResult<Option<TopicSchema>> {
        let row: Option<(i32, String, serde_json::Value)> = sqlx::query_as(
            "SELECT version, compatibility, fields FROM topic_schemas WHERE topic = $1 AND version = $2",
        )
        .bind(topic)
        .bind(version as i32)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(version, compatibility, fields)| {
            Ok(TopicSchema {
                version: version as u32,
                compatibility: text_to_enum::<SchemaCompatibilityMode>(&compatibility)?,
                fields: serde_json::from_value(fields)
                    .map_err(|e| DbError::Database(sqlx::Error::Decode(Box::new(e))))?,
            })
        })
        .transpose()
    }
}
