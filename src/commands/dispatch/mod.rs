//! Command dispatch table.
//!
//! One handler per [`CommandKind`], resolved from a closed table built at
//! startup. The dispatcher is also where a forced disconnect takes effect:
//! it publishes the `ForceDisconnectEvent` and clears the active instance
//! once per failed command, so handlers only report the outcome.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::registry::{PendingTransaction, RetryRegistry};
use super::{
    BeginSessionHandler, BeginSessionWithSessionIdHandler, Command, CommandContext, CommandError,
    CommandKind, CommandOutput, CreditCashHandler, CreditVoucherHandler, DispatchError,
    EndSessionHandler, EscrowCashHandler, RequestPlayHandler, ValidateVoucherHandler,
    VoucherPrintedHandler,
};
use crate::instance::ActiveInstance;
use crate::interfaces::{DisconnectReason, EventBus, ForceDisconnectEvent, ProtocolEvent};
use crate::utils::cancel::CancelSignal;

/// Executes commands of one kind.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn kind(&self) -> CommandKind;

    /// Execute `command`.
    ///
    /// `pending` is set when the command is replayed from the retry registry;
    /// a first send of a transactional command registers itself.
    async fn handle(
        &self,
        command: Command,
        pending: Option<PendingTransaction>,
        cancel: &CancelSignal,
    ) -> Result<CommandOutput, CommandError>;
}

/// Results of replaying the retry registry after a reconnect.
#[derive(Debug, Default)]
pub struct ReplaySummary {
    /// Outcome of every resent command, in replay order.
    pub results: Vec<(CommandKind, Result<CommandOutput, CommandError>)>,
    /// Replay stopped on a forced disconnect or cancellation; the commands
    /// not yet resent stay registered.
    pub halted: bool,
}

/// Resolves and invokes the handler for each command.
pub struct CommandDispatcher {
    handlers: HashMap<CommandKind, Arc<dyn CommandHandler>>,
    registry: Arc<RetryRegistry>,
    events: Arc<dyn EventBus>,
    instance: Arc<ActiveInstance>,
}

fn default_handlers(context: &CommandContext) -> Vec<Arc<dyn CommandHandler>> {
    vec![
        Arc::new(BeginSessionHandler::new(context.clone())),
        Arc::new(BeginSessionWithSessionIdHandler::new(context.clone())),
        Arc::new(EndSessionHandler::new(context.clone())),
        Arc::new(RequestPlayHandler::new(context.clone())),
        Arc::new(CreditCashHandler::new(context.clone())),
        Arc::new(CreditVoucherHandler::new(context.clone())),
        Arc::new(EscrowCashHandler::new(context.clone())),
        Arc::new(ValidateVoucherHandler::new(context.clone())),
        Arc::new(VoucherPrintedHandler::new(context.clone())),
    ]
}

impl CommandDispatcher {
    /// Dispatcher with the standard handler for every command kind.
    pub fn new(context: CommandContext) -> Self {
        let handlers = default_handlers(&context)
            .into_iter()
            .map(|handler| (handler.kind(), handler))
            .collect();

        Self {
            handlers,
            registry: context.registry,
            events: context.events,
            instance: context.instance,
        }
    }

    pub fn builder(context: &CommandContext) -> CommandDispatcherBuilder {
        CommandDispatcherBuilder::new(context)
    }

    pub fn registry(&self) -> &Arc<RetryRegistry> {
        &self.registry
    }

    pub async fn execute(
        &self,
        command: impl Into<Command>,
    ) -> Result<CommandOutput, CommandError> {
        self.execute_with_cancel(command, &CancelSignal::never())
            .await
    }

    /// Execute `command`, aborting waits when `cancel` fires.
    ///
    /// A cancelled transactional command stays registered for replay.
    pub async fn execute_with_cancel(
        &self,
        command: impl Into<Command>,
        cancel: &CancelSignal,
    ) -> Result<CommandOutput, CommandError> {
        let command = command.into();
        let kind = command.kind();
        let handler = self.resolve(kind)?;

        let result = handler.handle(command, None, cancel).await;
        self.observe(kind, result).await
    }

    /// Resend every unresolved transactional command in registration order.
    pub async fn replay_pending(&self) -> ReplaySummary {
        self.replay_pending_with_cancel(&CancelSignal::never())
            .await
    }

    /// Replay entry point for the connection owner.
    ///
    /// Stops at the first forced disconnect; the rest are resent on the next
    /// reconnect.
    pub async fn replay_pending_with_cancel(&self, cancel: &CancelSignal) -> ReplaySummary {
        let pending = self.registry.checkout_pending();
        if pending.is_empty() {
            return ReplaySummary::default();
        }
        info!(count = pending.len(), "Replaying unresolved transactions");

        let mut summary = ReplaySummary::default();
        for transaction in pending {
            if summary.halted {
                // Dropping releases the entry for the next replay.
                continue;
            }

            let kind = transaction.kind();
            let result = match self.resolve(kind) {
                Ok(handler) => {
                    let command = transaction.command().clone();
                    let result = handler.handle(command, Some(transaction), cancel).await;
                    self.observe(kind, result).await
                }
                Err(e) => Err(e),
            };

            summary.halted = matches!(
                &result,
                Err(e) if e.is_force_disconnect() || matches!(e, CommandError::Cancelled { .. })
            );
            summary.results.push((kind, result));
        }

        if summary.halted {
            warn!(
                replayed = summary.results.len(),
                remaining = self.registry.len(),
                "Replay halted"
            );
        }
        summary
    }

    fn resolve(&self, kind: CommandKind) -> Result<Arc<dyn CommandHandler>, CommandError> {
        self.handlers.get(&kind).cloned().ok_or_else(|| {
            error!(command = %kind, "No handler registered");
            CommandError::Unhandled(kind)
        })
    }

    async fn observe(
        &self,
        kind: CommandKind,
        result: Result<CommandOutput, CommandError>,
    ) -> Result<CommandOutput, CommandError> {
        match &result {
            Err(CommandError::Disconnected { reason, .. }) => {
                self.force_disconnect(kind, reason.clone()).await;
            }
            Err(CommandError::Rejected { code, .. }) => {
                warn!(command = %kind, %code, "Command rejected");
            }
            Err(e) => {
                warn!(command = %kind, error = %e, "Command failed");
            }
            Ok(_) => {}
        }
        result
    }

    async fn force_disconnect(&self, kind: CommandKind, reason: DisconnectReason) {
        error!(command = %kind, %reason, "Forcing disconnect");
        self.instance.clear();

        let event = ProtocolEvent::ForceDisconnect(ForceDisconnectEvent { reason });
        if let Err(e) = self.events.publish(event).await {
            error!(error = %e, "Failed to publish disconnect event");
        }
    }
}

/// Builds a dispatch table, checking it covers every command kind.
pub struct CommandDispatcherBuilder {
    handlers: HashMap<CommandKind, Arc<dyn CommandHandler>>,
    registry: Arc<RetryRegistry>,
    events: Arc<dyn EventBus>,
    instance: Arc<ActiveInstance>,
}

impl CommandDispatcherBuilder {
    pub fn new(context: &CommandContext) -> Self {
        Self {
            handlers: HashMap::new(),
            registry: context.registry.clone(),
            events: context.events.clone(),
            instance: context.instance.clone(),
        }
    }

    /// Register the standard handlers; later registrations replace them.
    pub fn with_default_handlers(mut self, context: &CommandContext) -> Self {
        for handler in default_handlers(context) {
            self.handlers.insert(handler.kind(), handler);
        }
        self
    }

    /// Register `handler` for its kind, replacing any previous one.
    pub fn register_handler(mut self, handler: Arc<dyn CommandHandler>) -> Self {
        self.handlers.insert(handler.kind(), handler);
        self
    }

    pub fn build(self) -> Result<CommandDispatcher, DispatchError> {
        if let Some(kind) = CommandKind::ALL
            .into_iter()
            .find(|kind| !self.handlers.contains_key(kind))
        {
            return Err(DispatchError::MissingHandler(kind));
        }

        Ok(CommandDispatcher {
            handlers: self.handlers,
            registry: self.registry,
            events: self.events,
            instance: self.instance,
        })
    }
}
