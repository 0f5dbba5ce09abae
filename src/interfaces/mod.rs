//! Abstract interfaces for the protocol engine's collaborators.
//!
//! These traits define the contracts for:
//! - VLT service transports (session, registration, currency)
//! - Durable storage (unit of work over sessions, vouchers, host identity)
//! - Event bus (publish-only notifications to the host)
//! - Terminal services (lockups, notifications, outcomes, clock)
//!
//! Every collaborator is injected through constructors as `Arc<dyn Trait>`.

pub mod event_bus;
pub mod services;
pub mod store;
pub mod transport;

pub use event_bus::{
    BusError, DisconnectReason, EventBus, ForceDisconnectEvent, ForcedCashOutEvent, ProtocolEvent,
    WagerPlacedEvent,
};
pub use services::{
    LockupPriority, LockupService, NotificationCode, NotificationService, Outcome,
    OutcomeException, OutcomeProvider, OutcomeType, TimeService,
};
pub use store::{
    HostRepository, SessionRepository, StorageError, UnitOfWork, UnitOfWorkFactory,
    VoucherRepository,
};
pub use transport::{CurrencyService, RegistrationService, SessionService};
