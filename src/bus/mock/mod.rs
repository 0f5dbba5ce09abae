//! Mock event bus implementation for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BusError, EventBus, ProtocolEvent, Result};

/// Mock event bus for testing.
#[derive(Default)]
pub struct MockEventBus {
    published: RwLock<Vec<ProtocolEvent>>,
    fail_on_publish: RwLock<bool>,
}

impl MockEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn published(&self) -> Vec<ProtocolEvent> {
        self.published.read().await.clone()
    }

    pub async fn take_published(&self) -> Vec<ProtocolEvent> {
        std::mem::take(&mut *self.published.write().await)
    }
}

#[async_trait]
impl EventBus for MockEventBus {
    async fn publish(&self, event: ProtocolEvent) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Publish("Mock publish failure".to_string()));
        }
        self.published.write().await.push(event);
        Ok(())
    }
}
