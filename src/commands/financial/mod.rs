//! Cash and voucher handlers.
//!
//! Every command here is registry-tracked: it is registered before the first
//! attempt and removed only once the server resolves it.

use async_trait::async_trait;
use tracing::info;

use super::context::send_transactional;
use super::registry::PendingTransaction;
use super::{Command, CommandContext, CommandError, CommandHandler, CommandKind, CommandOutput};
use crate::interfaces::NotificationCode;
use crate::protocol::messages::{
    CreditCashMessage, CreditResponse, CreditVoucherMessage, EscrowCashMessage,
    ValidateVoucherMessage, VoucherPrintedMessage,
};
use crate::protocol::{format_cents, ResponseCode, SessionId};
use crate::utils::cancel::CancelSignal;

/// Store the balances the server reported after a credit.
async fn update_balances(
    context: &CommandContext,
    session_id: SessionId,
    response: &CreditResponse,
) -> Result<(), CommandError> {
    let mut uow = context.store.begin().await?;
    let Some(mut session) = uow
        .sessions()
        .single()
        .await?
        .filter(|session| session.server_session_id == session_id)
    else {
        // The session ended while the credit was in flight.
        return Ok(());
    };
    session.cash_balance = response.cash_balance;
    session.coupon_balance = response.coupon_balance;
    uow.sessions().add_or_update(session).await?;
    uow.commit().await?;
    Ok(())
}

fn take_or_register(
    context: &CommandContext,
    command: &Command,
    pending: Option<PendingTransaction>,
) -> PendingTransaction {
    pending.unwrap_or_else(|| context.registry.register(command))
}

/// Adds inserted cash to the session.
pub struct CreditCashHandler {
    context: CommandContext,
}

impl CreditCashHandler {
    pub fn new(context: CommandContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl CommandHandler for CreditCashHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::CreditCash
    }

    async fn handle(
        &self,
        command: Command,
        pending: Option<PendingTransaction>,
        cancel: &CancelSignal,
    ) -> Result<CommandOutput, CommandError> {
        let Command::CreditCash(credit) = &command else {
            return Err(CommandError::Unhandled(command.kind()));
        };
        let kind = self.kind();
        let instance_id = self.context.require_instance()?;
        let session = self.context.require_session().await?;
        let pending = take_or_register(&self.context, &command, pending);

        let message = CreditCashMessage {
            instance_id,
            session_id: session.server_session_id,
            amount: credit.amount,
            local_transaction_id: pending.local_transaction_id(),
        };
        let service = &self.context.currency;
        let response = send_transactional(&self.context, kind, cancel, |_| {
            service.credit_cash(message.clone())
        })
        .await?;

        match response.response_code {
            ResponseCode::Ok => {
                update_balances(&self.context, session.server_session_id, &response).await?;
                pending.remove(ResponseCode::Ok)?;
                info!(amount = credit.amount, "Cash credited");
                Ok(CommandOutput::Credited {
                    cash_balance: response.cash_balance,
                    coupon_balance: response.coupon_balance,
                })
            }
            code => {
                let amount = format_cents(credit.amount);
                self.context
                    .lockup(format!("Cash credit of {amount} failed: {code}"))
                    .await;
                self.context
                    .notify(NotificationCode::CashCreditFailed, amount)
                    .await;
                pending.settle(code);
                Err(CommandError::Rejected { kind, code })
            }
        }
    }
}

/// Adds a redeemed voucher to the session.
pub struct CreditVoucherHandler {
    context: CommandContext,
}

impl CreditVoucherHandler {
    pub fn new(context: CommandContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl CommandHandler for CreditVoucherHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::CreditVoucher
    }

    async fn handle(
        &self,
        command: Command,
        pending: Option<PendingTransaction>,
        cancel: &CancelSignal,
    ) -> Result<CommandOutput, CommandError> {
        let Command::CreditVoucher(credit) = &command else {
            return Err(CommandError::Unhandled(command.kind()));
        };
        let kind = self.kind();
        let instance_id = self.context.require_instance()?;
        let session = self.context.require_session().await?;
        let pending = take_or_register(&self.context, &command, pending);

        let message = CreditVoucherMessage {
            instance_id,
            session_id: session.server_session_id,
            barcode: credit.barcode.clone(),
            amount: credit.amount,
            local_transaction_id: pending.local_transaction_id(),
        };
        let service = &self.context.currency;
        let response = send_transactional(&self.context, kind, cancel, |_| {
            service.credit_voucher(message.clone())
        })
        .await?;

        match response.response_code {
            ResponseCode::Ok => {
                update_balances(&self.context, session.server_session_id, &response).await?;
                pending.remove(ResponseCode::Ok)?;
                info!(barcode = %credit.barcode, amount = credit.amount, "Voucher credited");
                Ok(CommandOutput::Credited {
                    cash_balance: response.cash_balance,
                    coupon_balance: response.coupon_balance,
                })
            }
            code => {
                self.context
                    .lockup(format!(
                        "Voucher credit of {} failed: {code}",
                        format_cents(credit.amount)
                    ))
                    .await;
                self.context
                    .notify(NotificationCode::VoucherCreditFailed, credit.barcode.clone())
                    .await;
                pending.settle(code);
                Err(CommandError::Rejected { kind, code })
            }
        }
    }
}

/// Holds inserted cash in escrow until it is stacked or returned.
pub struct EscrowCashHandler {
    context: CommandContext,
}

impl EscrowCashHandler {
    pub fn new(context: CommandContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl CommandHandler for EscrowCashHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::EscrowCash
    }

    async fn handle(
        &self,
        command: Command,
        pending: Option<PendingTransaction>,
        cancel: &CancelSignal,
    ) -> Result<CommandOutput, CommandError> {
        let Command::EscrowCash(escrow) = &command else {
            return Err(CommandError::Unhandled(command.kind()));
        };
        let kind = self.kind();
        let instance_id = self.context.require_instance()?;
        let pending = take_or_register(&self.context, &command, pending);

        let message = EscrowCashMessage {
            instance_id,
            amount: escrow.amount,
            local_transaction_id: pending.local_transaction_id(),
        };
        let service = &self.context.currency;
        let response = send_transactional(&self.context, kind, cancel, |_| {
            service.escrow_cash(message.clone())
        })
        .await?;

        let code = response.response_code;
        if code.is_ok() {
            pending.remove(code)?;
            info!(amount = escrow.amount, "Cash escrowed");
            return Ok(CommandOutput::Escrowed);
        }
        pending.settle(code);
        Err(CommandError::Rejected { kind, code })
    }
}

/// Asks the server whether a voucher may be redeemed.
pub struct ValidateVoucherHandler {
    context: CommandContext,
}

impl ValidateVoucherHandler {
    pub fn new(context: CommandContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl CommandHandler for ValidateVoucherHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::ValidateVoucher
    }

    async fn handle(
        &self,
        command: Command,
        pending: Option<PendingTransaction>,
        cancel: &CancelSignal,
    ) -> Result<CommandOutput, CommandError> {
        let Command::ValidateVoucher(validate) = &command else {
            return Err(CommandError::Unhandled(command.kind()));
        };
        let kind = self.kind();
        let instance_id = self.context.require_instance()?;
        let pending = take_or_register(&self.context, &command, pending);

        let message = ValidateVoucherMessage {
            instance_id,
            barcode: validate.barcode.clone(),
            local_transaction_id: pending.local_transaction_id(),
        };
        let service = &self.context.currency;
        let response = send_transactional(&self.context, kind, cancel, |_| {
            service.validate_voucher(message.clone())
        })
        .await?;

        let code = response.response_code;
        if code.is_ok() {
            pending.remove(code)?;
            return Ok(CommandOutput::VoucherValidated {
                cash_amount: response.cash_amount,
                coupon_amount: response.coupon_amount,
            });
        }
        pending.settle(code);
        Err(CommandError::Rejected { kind, code })
    }
}

/// Confirms a voucher came out of the printer.
pub struct VoucherPrintedHandler {
    context: CommandContext,
}

impl VoucherPrintedHandler {
    pub fn new(context: CommandContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl CommandHandler for VoucherPrintedHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::VoucherPrinted
    }

    async fn handle(
        &self,
        command: Command,
        pending: Option<PendingTransaction>,
        cancel: &CancelSignal,
    ) -> Result<CommandOutput, CommandError> {
        let Command::VoucherPrinted(printed) = &command else {
            return Err(CommandError::Unhandled(command.kind()));
        };
        let kind = self.kind();
        let instance_id = self.context.require_instance()?;
        let pending = take_or_register(&self.context, &command, pending);

        let message = VoucherPrintedMessage {
            instance_id,
            barcode: printed.barcode.clone(),
            local_transaction_id: pending.local_transaction_id(),
        };
        let service = &self.context.currency;
        let response = send_transactional(&self.context, kind, cancel, |_| {
            service.voucher_printed(message.clone())
        })
        .await?;

        let code = response.response_code;
        if code.is_ok() {
            pending.remove(code)?;
            info!(barcode = %printed.barcode, "Voucher printed");
            return Ok(CommandOutput::VoucherPrinted);
        }
        if code.is_barcode_failure() {
            self.context
                .lockup(format!("Voucher {} rejected: {code}", printed.barcode))
                .await;
        }
        pending.settle(code);
        Err(CommandError::Rejected { kind, code })
    }
}
