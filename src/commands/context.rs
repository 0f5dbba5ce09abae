//! Collaborators shared by the command handlers.

use std::future::Future;
use std::sync::Arc;

use tracing::{error, warn};

use super::{CommandError, CommandKind};
use crate::config::ProtocolConfig;
use crate::instance::ActiveInstance;
use crate::interfaces::{
    CurrencyService, DisconnectReason, EventBus, LockupService, NotificationCode,
    NotificationService, OutcomeProvider, ProtocolEvent, SessionService, UnitOfWorkFactory,
};
use crate::protocol::{
    classify_terminal, exchange_code, Exchange, HasResponseCode, InstanceId, ResponseClass, Scope,
};
use crate::storage::Session;
use crate::utils::cancel::CancelSignal;
use crate::utils::retry::RetryPolicy;

use super::registry::RetryRegistry;

/// Everything a handler is constructed with.
#[derive(Clone)]
pub struct CommandContext {
    pub config: ProtocolConfig,
    pub registry: Arc<RetryRegistry>,
    pub store: Arc<dyn UnitOfWorkFactory>,
    pub instance: Arc<ActiveInstance>,
    pub sessions: Arc<dyn SessionService>,
    pub currency: Arc<dyn CurrencyService>,
    pub events: Arc<dyn EventBus>,
    pub lockups: Arc<dyn LockupService>,
    pub notifications: Arc<dyn NotificationService>,
    pub outcomes: Arc<dyn OutcomeProvider>,
}

impl CommandContext {
    pub(crate) fn require_instance(&self) -> Result<InstanceId, CommandError> {
        self.instance
            .instance_id()
            .ok_or(CommandError::NotRegistered)
    }

    /// The persisted session row, if any.
    pub(crate) async fn current_session(&self) -> Result<Option<Session>, CommandError> {
        let mut uow = self.store.begin().await?;
        Ok(uow.sessions().single().await?)
    }

    pub(crate) async fn require_session(&self) -> Result<Session, CommandError> {
        self.current_session()
            .await?
            .ok_or(CommandError::NoActiveSession)
    }

    pub(crate) async fn lockup(&self, message: String) {
        warn!(%message, "Employee card lockup");
        self.lockups
            .lockup_for_employee_card(message, self.config.lockup.priority)
            .await;
    }

    pub(crate) async fn notify(&self, code: NotificationCode, payload: String) {
        warn!(?code, %payload, "Notifying site controller");
        self.notifications.notify(code, payload).await;
    }

    /// Events are advisory; a failed publish is logged, not propagated.
    pub(crate) async fn publish(&self, event: ProtocolEvent) {
        let name = event.name();
        if let Err(e) = self.events.publish(event).await {
            error!(event = name, error = %e, "Failed to publish event");
        }
    }
}

/// Why an exchange forces a disconnect.
pub(crate) fn disconnect_reason<R: HasResponseCode>(
    exchange: &Exchange<R>,
) -> DisconnectReason {
    match exchange {
        Ok(response) => DisconnectReason::Response(response.response_code()),
        Err(e) => DisconnectReason::TransportFailure(e.0.clone()),
    }
}

/// The received response, or the forced disconnect a missing one implies.
pub(crate) fn received<R>(kind: CommandKind, exchange: Exchange<R>) -> Result<R, CommandError> {
    exchange.map_err(|e| CommandError::Disconnected {
        kind,
        reason: DisconnectReason::TransportFailure(e.0),
    })
}

/// Send a registry-tracked request under the standard policy.
///
/// Cancellation and forced disconnects come back as errors; the caller's
/// pending transaction is untouched either way.
pub(crate) async fn send_transactional<R, F, Fut>(
    context: &CommandContext,
    kind: CommandKind,
    cancel: &CancelSignal,
    request: F,
) -> Result<R, CommandError>
where
    R: HasResponseCode,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Exchange<R>>,
{
    let policy = RetryPolicy::standard(&context.config.retry);
    let exchange = policy
        .run(cancel, request)
        .await
        .map_err(|_| CommandError::Cancelled { kind })?;

    if classify_terminal(exchange_code(&exchange), Scope::Transactional)
        == ResponseClass::ForceDisconnect
    {
        return Err(CommandError::Disconnected {
            kind,
            reason: disconnect_reason(&exchange),
        });
    }
    received(kind, exchange)
}
