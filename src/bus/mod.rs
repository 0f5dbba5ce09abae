//! Event bus implementations.
//!
//! - `ChannelEventBus`: in-process broadcast channel
//! - `MockEventBus`: in-memory recorder for testing

pub mod channel;
pub mod mock;

pub use channel::ChannelEventBus;
pub use mock::MockEventBus;

pub use crate::interfaces::event_bus::*;
