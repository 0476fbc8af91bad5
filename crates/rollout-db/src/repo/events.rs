//! Durable audit sink (C11): an append-only `audit_events` table. This is
//! one fan-out target among several (tracing spans, metrics counters are
//! wired alongside it at the call site); it never reads events back.

use async_trait::async_trait;
use rollout_core::event::{Event, EventSink};
use sqlx::PgPool;
use tracing::warn;

pub struct PgEventSink {
    pool: PgPool,
}

impl PgEventSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventSink for PgEventSink {
    async fn emit(&self, event: Event) {
        let payload = match serde_json::to_value(&event.payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to serialize event payload");
                return;
            }
        };
        let result = sqlx::query(
            r#"
            INSERT INTO audit_events (id, deployment_execution_id, trace_id, span_id, occurred_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(event.deployment_execution_id.as_uuid())
        .bind(&event.trace_id)
        .bind(&event.span_id)
        .bind(event.timestamp)
        .bind(payload)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(error = %e, execution_id = %event.deployment_execution_id, "failed to persist audit event");
        }
    }
}
