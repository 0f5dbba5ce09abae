//! In-memory channel-based event bus.
//!
//! Uses a tokio broadcast channel to fan protocol events out to every
//! component of the host process that subscribed.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{EventBus, ProtocolEvent, Result};

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 256;

/// In-memory event bus using a tokio broadcast channel.
pub struct ChannelEventBus {
    sender: broadcast::Sender<ProtocolEvent>,
}

impl ChannelEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        info!(capacity = CHANNEL_CAPACITY, "Channel event bus initialized");
        Self { sender }
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ProtocolEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChannelEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for ChannelEventBus {
    async fn publish(&self, event: ProtocolEvent) -> Result<()> {
        let name = event.name();

        // Send to channel (ignore error if no receivers)
        match self.sender.send(event) {
            Ok(receiver_count) => {
                debug!(event = name, receivers = receiver_count, "Published event");
            }
            Err(_) => {
                debug!(event = name, "No subscribers for event");
            }
        }
        Ok(())
    }
}
