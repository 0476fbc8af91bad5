//! Fan-out event sink (C11): every event is logged as a tracing span,
//! persisted durably, and broadcast to subscribed WebSocket clients.

use async_trait::async_trait;
use rollout_core::event::{Event, EventSink};
use rollout_db::PgEventSink;
use std::sync::Arc;
use tracing::info;

use crate::ws::Broadcaster;

pub struct FanOutSink {
    durable: PgEventSink,
    broadcaster: Arc<Broadcaster>,
}

impl FanOutSink {
    pub fn new(durable: PgEventSink, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            durable,
            broadcaster,
        }
    }
}

#[async_trait]
impl EventSink for FanOutSink {
    async fn emit(&self, event: Event) {
        info!(
            execution_id = %event.deployment_execution_id,
            trace_id = %event.trace_id,
            payload = ?event.payload,
            "deployment event"
        );
        self.durable.emit(event.clone()).await;
        self.broadcaster.emit(event).await;
    }
}
