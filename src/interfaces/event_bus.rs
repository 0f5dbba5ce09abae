//! Event bus interface for notifying the host.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::protocol::{Cents, ResponseCode};

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Publish failed: {0}")]
    Publish(String),
}

/// Why the connection must be torn down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// No response was received.
    TransportFailure(String),
    /// The server answered with a code that invalidates the connection.
    Response(ResponseCode),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::TransportFailure(detail) => write!(f, "transport failure: {detail}"),
            DisconnectReason::Response(code) => write!(f, "server responded {code}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceDisconnectEvent {
    pub reason: DisconnectReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerPlacedEvent {
    pub amount: Cents,
}

/// The terminal must cash out the player's credits locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedCashOutEvent {
    pub amount: Cents,
}

/// Events raised by the command layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    ForceDisconnect(ForceDisconnectEvent),
    WagerPlaced(WagerPlacedEvent),
    ForcedCashOut(ForcedCashOutEvent),
}

impl ProtocolEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolEvent::ForceDisconnect(_) => "ForceDisconnect",
            ProtocolEvent::WagerPlaced(_) => "WagerPlaced",
            ProtocolEvent::ForcedCashOut(_) => "ForcedCashOut",
        }
    }
}

/// Publish-only event delivery.
///
/// Implementations:
/// - `ChannelEventBus`: tokio broadcast channel inside the host process
/// - `MockEventBus`: records events for tests
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: ProtocolEvent) -> Result<()>;
}
