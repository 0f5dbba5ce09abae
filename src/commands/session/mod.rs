//! Session lifecycle handlers.
//!
//! The persisted [`Session`] row mirrors the server session: written when
//! BeginSession succeeds, removed when EndSession (or a server-side close)
//! resolves it. The handlers keep it at a single row.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use super::context::{disconnect_reason, received};
use super::registry::PendingTransaction;
use super::{Command, CommandContext, CommandError, CommandHandler, CommandKind, CommandOutput};
use crate::interfaces::{ForcedCashOutEvent, NotificationCode, ProtocolEvent};
use crate::protocol::messages::{
    BeginSessionMessage, BeginSessionResponse, BeginSessionWithSessionIdMessage, EndSessionMessage,
};
use crate::protocol::{
    classify_terminal, exchange_code, format_cents, Cents, Exchange, ResponseClass, ResponseCode,
    Scope, SessionId,
};
use crate::storage::{Session, StorageError, Voucher};
use crate::utils::cancel::CancelSignal;
use crate::utils::retry::RetryPolicy;

/// The first stored session, other than `reopening`, whose value has not
/// been settled. A row flagged `offline_voucher_printed` is settled.
fn open_session(rows: Vec<Session>, reopening: Option<SessionId>) -> Option<Session> {
    rows.into_iter().find(|session| {
        !session.offline_voucher_printed && Some(session.server_session_id) != reopening
    })
}

fn session_open(open: &Session) -> CommandError {
    warn!(
        session_id = open.server_session_id,
        balance = open.balance(),
        "Previous session must be ended first"
    );
    CommandError::SessionOpen {
        session_id: open.server_session_id,
    }
}

/// Refuse to open a session while another one still holds value.
async fn ensure_no_open_session(
    context: &CommandContext,
    reopening: Option<SessionId>,
) -> Result<(), CommandError> {
    let mut uow = context.store.begin().await?;
    match open_session(uow.sessions().all().await?, reopening) {
        Some(open) => Err(session_open(&open)),
        None => Ok(()),
    }
}

/// Store the session the server just opened, dropping settled rows.
async fn store_new_session(
    context: &CommandContext,
    response: &BeginSessionResponse,
) -> Result<Session, CommandError> {
    let session = Session::new(
        response.session_id,
        response.cash_balance,
        response.coupon_balance,
    );

    let mut uow = context.store.begin().await?;
    let rows = uow.sessions().all().await?;
    if let Some(open) = open_session(rows.clone(), Some(session.server_session_id)) {
        return Err(session_open(&open));
    }
    for settled in rows
        .iter()
        .filter(|row| row.server_session_id != session.server_session_id)
    {
        info!(
            session_id = settled.server_session_id,
            "Dropping session settled offline"
        );
        uow.sessions().delete(settled.server_session_id).await?;
    }
    uow.sessions().add_or_update(session.clone()).await?;
    uow.commit().await?;

    info!(
        session_id = session.server_session_id,
        cash_balance = session.cash_balance,
        coupon_balance = session.coupon_balance,
        "Session started"
    );
    Ok(session)
}

async fn clear_session(
    context: &CommandContext,
    session_id: SessionId,
) -> Result<(), CommandError> {
    let mut uow = context.store.begin().await?;
    uow.sessions().delete(session_id).await?;
    uow.commit().await?;
    Ok(())
}

/// Shared outcome handling of both BeginSession variants.
async fn finish_begin_session(
    context: &CommandContext,
    kind: CommandKind,
    reopening: Option<SessionId>,
    exchange: Exchange<BeginSessionResponse>,
) -> Result<CommandOutput, CommandError> {
    if classify_terminal(exchange_code(&exchange), Scope::Session) == ResponseClass::ForceDisconnect
    {
        return Err(CommandError::Disconnected {
            kind,
            reason: disconnect_reason(&exchange),
        });
    }
    let response = received(kind, exchange)?;

    let code = response.response_code;
    if code.is_ok() {
        let session = store_new_session(context, &response).await?;
        return Ok(CommandOutput::SessionStarted(session));
    }

    if let (Some(session_id), ResponseCode::SessionEndedVoucherPrintedOffline) =
        (reopening, code)
    {
        info!(session_id, "Session already closed offline by the server");
        clear_session(context, session_id).await?;
        return Ok(CommandOutput::SessionResolvedOffline);
    }

    context
        .lockup(format!("Begin session failed: {code}"))
        .await;
    if response.cash_balance != 0 || response.coupon_balance != 0 {
        context
            .notify(
                NotificationCode::SessionBalanceOnFailure,
                format!(
                    "cash {} coupon {}",
                    format_cents(response.cash_balance),
                    format_cents(response.coupon_balance)
                ),
            )
            .await;
    }
    Err(CommandError::Rejected { kind, code })
}

/// Opens a player session.
pub struct BeginSessionHandler {
    context: CommandContext,
}

impl BeginSessionHandler {
    pub fn new(context: CommandContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl CommandHandler for BeginSessionHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::BeginSession
    }

    async fn handle(
        &self,
        command: Command,
        _pending: Option<PendingTransaction>,
        cancel: &CancelSignal,
    ) -> Result<CommandOutput, CommandError> {
        let Command::BeginSession(_) = &command else {
            return Err(CommandError::Unhandled(command.kind()));
        };
        let kind = self.kind();
        let instance_id = self.context.require_instance()?;
        ensure_no_open_session(&self.context, None).await?;

        let service = &self.context.sessions;
        let policy = RetryPolicy::standard(&self.context.config.retry);
        let exchange = policy
            .run(cancel, |_| {
                service.begin_session(BeginSessionMessage { instance_id })
            })
            .await
            .map_err(|_| CommandError::Cancelled { kind })?;

        finish_begin_session(&self.context, kind, None, exchange).await
    }
}

/// Reopens a session the server already holds.
pub struct BeginSessionWithSessionIdHandler {
    context: CommandContext,
}

impl BeginSessionWithSessionIdHandler {
    pub fn new(context: CommandContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl CommandHandler for BeginSessionWithSessionIdHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::BeginSessionWithSessionId
    }

    async fn handle(
        &self,
        command: Command,
        _pending: Option<PendingTransaction>,
        cancel: &CancelSignal,
    ) -> Result<CommandOutput, CommandError> {
        let Command::BeginSessionWithSessionId(reopen) = &command else {
            return Err(CommandError::Unhandled(command.kind()));
        };
        let kind = self.kind();
        let instance_id = self.context.require_instance()?;
        ensure_no_open_session(&self.context, Some(reopen.session_id)).await?;

        let service = &self.context.sessions;
        let policy = RetryPolicy::standard(&self.context.config.retry);
        let exchange = policy
            .run(cancel, |_| {
                service.begin_session_with_session_id(BeginSessionWithSessionIdMessage {
                    instance_id,
                    session_id: reopen.session_id,
                })
            })
            .await
            .map_err(|_| CommandError::Cancelled { kind })?;

        finish_begin_session(&self.context, kind, Some(reopen.session_id), exchange).await
    }
}

/// Closes the session and records the cash-out voucher.
pub struct EndSessionHandler {
    context: CommandContext,
}

impl EndSessionHandler {
    pub fn new(context: CommandContext) -> Self {
        Self { context }
    }

    /// The stored row for `session_id`, if any.
    async fn stored_session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<Session>, CommandError> {
        let mut uow = self.context.store.begin().await?;
        Ok(uow
            .sessions()
            .all()
            .await?
            .into_iter()
            .find(|session| session.server_session_id == session_id))
    }

    /// Write the voucher and drop the session in one unit of work.
    ///
    /// Returns `None` without writing when the session row is already gone:
    /// another send of this EndSession settled it. A voucher with the same
    /// barcode already on file is tolerated the same way.
    async fn settle_voucher(
        &self,
        session: &Session,
        voucher: Voucher,
    ) -> Result<Option<Voucher>, CommandError> {
        let mut uow = self.context.store.begin().await?;
        let still_open = uow
            .sessions()
            .all()
            .await?
            .iter()
            .any(|row| row.server_session_id == session.server_session_id);
        if !still_open {
            return Ok(None);
        }
        match uow.vouchers().add(voucher.clone()).await {
            Ok(()) => {}
            Err(StorageError::DuplicateVoucher(barcode)) => {
                warn!(%barcode, "Voucher already recorded");
            }
            Err(e) => return Err(e.into()),
        }
        uow.sessions().delete(session.server_session_id).await?;
        uow.commit().await?;
        Ok(Some(voucher))
    }

    async fn delete_session(&self, session: &Session) -> Result<(), CommandError> {
        let mut uow = self.context.store.begin().await?;
        uow.sessions().delete(session.server_session_id).await?;
        uow.commit().await?;
        Ok(())
    }

    async fn lockup_with_balance(&self, code: ResponseCode, balance: Cents) {
        self.context
            .lockup(format!(
                "End session failed ({code}), balance {}",
                format_cents(balance)
            ))
            .await;
    }
}

#[async_trait]
impl CommandHandler for EndSessionHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::EndSession
    }

    async fn handle(
        &self,
        command: Command,
        pending: Option<PendingTransaction>,
        cancel: &CancelSignal,
    ) -> Result<CommandOutput, CommandError> {
        let Command::EndSession(end_session) = &command else {
            return Err(CommandError::Unhandled(command.kind()));
        };
        let kind = self.kind();

        // A replay acts on the session the command was first sent for, never
        // on one opened since.
        let target = pending.as_ref().and_then(PendingTransaction::session_id);
        let stored = match target {
            Some(session_id) => self.stored_session(session_id).await?,
            None => self.context.current_session().await?,
        };
        let session = match stored {
            Some(session) if !session.offline_voucher_printed => session,
            stored => {
                info!("Session already ended offline");
                if let Some(session) = stored {
                    self.delete_session(&session).await?;
                }
                if let Some(pending) = pending {
                    pending.remove(ResponseCode::SessionEndedVoucherPrintedOffline)?;
                }
                return Ok(CommandOutput::SessionEndedOffline);
            }
        };
        let instance_id = self.context.require_instance()?;
        let mut pending = match pending {
            Some(pending) => pending,
            None => self
                .context
                .registry
                .register_for_session(&command, session.server_session_id),
        };

        let config = &self.context.config;
        let outer =
            RetryPolicy::duplicate_voucher(config.duplicate_voucher_retries, config.retry.delay());
        let inner = RetryPolicy::standard(&config.retry);
        let service = &self.context.sessions;
        let session_id = session.server_session_id;

        let result = outer
            .run(cancel, |attempt| {
                // The server reported the previous id as ambiguous.
                if attempt > 1 {
                    pending.rotate_local_transaction_id();
                }
                let message = EndSessionMessage {
                    instance_id,
                    session_id,
                    local_transaction_id: pending.local_transaction_id(),
                };
                let inner = &inner;
                async move {
                    inner
                        .run(cancel, |_| service.end_session(message.clone()))
                        .await
                }
            })
            .await;
        let exchange = result
            .and_then(|inner| inner)
            .map_err(|_| CommandError::Cancelled { kind })?;

        let code = exchange_code(&exchange);
        if classify_terminal(code, Scope::Voucher) == ResponseClass::ForceDisconnect {
            if let Some(code) = code {
                self.lockup_with_balance(code, end_session.balance).await;
            }
            return Err(CommandError::Disconnected {
                kind,
                reason: disconnect_reason(&exchange),
            });
        }
        let response = received(kind, exchange)?;

        match response.response_code {
            ResponseCode::Ok => {
                let barcode = Some(response.voucher_barcode.clone()).filter(|b| !b.is_empty());
                let voucher = Voucher {
                    barcode,
                    session_id: Some(session_id),
                    amount: response.cash_balance + response.coupon_balance,
                    cash_amount: response.cash_balance,
                    coupon_amount: response.coupon_balance,
                    offline_reason: None,
                    created_at: Utc::now(),
                };
                let Some(voucher) = self.settle_voucher(&session, voucher).await? else {
                    pending.remove(ResponseCode::Ok)?;
                    info!(session_id, "Session already settled by another send");
                    return Ok(CommandOutput::SessionEndedOffline);
                };
                pending.remove(ResponseCode::Ok)?;
                info!(
                    session_id,
                    amount = voucher.amount,
                    "Session ended with voucher"
                );
                Ok(CommandOutput::SessionEnded(voucher))
            }
            code @ (ResponseCode::DoNotPrintVoucher | ResponseCode::InvalidSessionId) => {
                self.delete_session(&session).await?;
                pending.remove(code)?;
                if end_session.balance > 0 {
                    self.context
                        .publish(ProtocolEvent::ForcedCashOut(ForcedCashOutEvent {
                            amount: end_session.balance,
                        }))
                        .await;
                    self.lockup_with_balance(code, end_session.balance).await;
                }
                Err(CommandError::Rejected { kind, code })
            }
            ResponseCode::SessionEndedVoucherPrintedOffline => {
                self.delete_session(&session).await?;
                pending.remove(ResponseCode::SessionEndedVoucherPrintedOffline)?;
                info!(session_id, "Session ended offline by the server");
                Ok(CommandOutput::SessionEndedOffline)
            }
            code => {
                self.lockup_with_balance(code, end_session.balance).await;
                pending.settle(code);
                Err(CommandError::Rejected { kind, code })
            }
        }
    }
}
