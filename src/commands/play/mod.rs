//! Central-determination play requests.
//!
//! RequestPlay is retried at most once whatever the standard policy allows.
//! Every request ends with exactly one report to the outcome provider: the
//! outcomes of a granted prize, or an outcome exception. When a play is
//! rejected without a prize, the offline voucher is committed before that
//! report.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use super::context::disconnect_reason;
use super::registry::PendingTransaction;
use super::{
    Command, CommandContext, CommandError, CommandHandler, CommandKind, CommandOutput,
    OutcomeError, PlayResult, RequestPlay,
};
use crate::interfaces::{Outcome, OutcomeException, OutcomeType, ProtocolEvent, WagerPlacedEvent};
use crate::protocol::messages::{RequestPlayMessage, RequestPlayResponse};
use crate::protocol::{
    cents_to_millicents, classify_terminal, Cents, InstanceId, ResponseClass, ResponseCode, Scope,
    SessionId,
};
use crate::storage::{OfflineReason, Voucher};
use crate::utils::cancel::CancelSignal;
use crate::utils::retry::RetryPolicy;

/// Outcomes carried by a play response.
pub(crate) fn decode_outcomes(
    response: &RequestPlayResponse,
    game_id: i32,
) -> Result<Vec<Outcome>, OutcomeError> {
    let value = cents_to_millicents(response.prize_value)
        .ok_or(OutcomeError::PrizeOverflow(response.prize_value))?;
    let mut outcomes = vec![Outcome {
        outcome_type: OutcomeType::Standard,
        value,
        reference: response.prize_index,
        game_id,
    }];

    if response.progressive_win {
        let value = cents_to_millicents(response.progressive_win_value)
            .ok_or(OutcomeError::PrizeOverflow(response.progressive_win_value))?;
        outcomes.push(Outcome {
            outcome_type: OutcomeType::Progressive,
            value,
            reference: response.prize_index,
            game_id,
        });
    }
    Ok(outcomes)
}

fn wager(play: &RequestPlay) -> Result<Cents, OutcomeError> {
    play.credits
        .checked_mul(play.denomination)
        .ok_or(OutcomeError::WagerOverflow {
            credits: play.credits,
            denomination: play.denomination,
        })
}

/// Sends play requests and reports their outcomes.
pub struct RequestPlayHandler {
    context: CommandContext,
}

impl RequestPlayHandler {
    pub fn new(context: CommandContext) -> Self {
        Self { context }
    }

    async fn report(
        &self,
        play: &RequestPlay,
        outcomes: Vec<Outcome>,
        exception: Option<OutcomeException>,
    ) {
        self.context
            .outcomes
            .outcome_response(play.transaction_id, outcomes, exception)
            .await;
    }

    async fn play_target(&self) -> Result<(InstanceId, SessionId), CommandError> {
        let instance_id = self.context.require_instance()?;
        let session = self.context.require_session().await?;
        Ok((instance_id, session.server_session_id))
    }

    /// The play never reached a response: the game is told it timed out.
    async fn abandon(&self, play: &RequestPlay, error: CommandError) -> CommandError {
        warn!(error = %error, "Play abandoned before a response");
        self.report(play, Vec::new(), Some(OutcomeException::TimedOut))
            .await;
        error
    }

    /// A prize was granted: report it and settle the wager.
    async fn granted(
        &self,
        play: &RequestPlay,
        session_id: SessionId,
        response: &RequestPlayResponse,
    ) -> Result<CommandOutput, CommandError> {
        let decoded = decode_outcomes(response, play.game_id)
            .and_then(|outcomes| Ok((outcomes, wager(play)?)));
        let (outcomes, amount) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                error!(error = %e, "Could not decode play outcome");
                self.report(play, Vec::new(), Some(OutcomeException::TimedOut))
                    .await;
                return Err(e.into());
            }
        };

        self.report(play, outcomes.clone(), None).await;
        self.context
            .publish(ProtocolEvent::WagerPlaced(WagerPlacedEvent { amount }))
            .await;
        self.update_balances(session_id, response).await?;

        let force_cash_out = !response.response_code.is_ok();
        if force_cash_out {
            warn!(
                code = %response.response_code,
                prize_index = response.prize_index,
                "Prize granted on a failed play; forcing cash-out"
            );
        } else {
            info!(
                prize_index = response.prize_index,
                prize_value = response.prize_value,
                "Play completed"
            );
        }
        Ok(CommandOutput::Played(PlayResult {
            outcomes,
            force_cash_out,
        }))
    }

    /// No prize was granted: commit the offline voucher, then report the
    /// exception.
    async fn rejected(
        &self,
        play: &RequestPlay,
        session_id: SessionId,
        code: ResponseCode,
    ) -> Result<(), CommandError> {
        let (exception, reason) = match code {
            ResponseCode::InvalidPayTableIndex => (
                OutcomeException::InvalidPaytableIndex,
                OfflineReason::InvalidPaytableIndex,
            ),
            _ => (OutcomeException::Invalid, OfflineReason::PlayRejected),
        };

        let voucher = Voucher {
            barcode: None,
            session_id: Some(session_id),
            amount: play.cash_balance + play.coupon_balance,
            cash_amount: play.cash_balance,
            coupon_amount: play.coupon_balance,
            offline_reason: Some(reason),
            created_at: Utc::now(),
        };
        let written = self.write_voucher(voucher).await;
        self.report(play, Vec::new(), Some(exception)).await;
        warn!(%code, ?exception, "Play rejected without a prize");
        written
    }

    async fn write_voucher(&self, voucher: Voucher) -> Result<(), CommandError> {
        let mut uow = self.context.store.begin().await?;
        uow.vouchers().add(voucher).await?;
        uow.commit().await?;
        Ok(())
    }

    async fn update_balances(
        &self,
        session_id: SessionId,
        response: &RequestPlayResponse,
    ) -> Result<(), CommandError> {
        let mut uow = self.context.store.begin().await?;
        if let Some(mut session) = uow
            .sessions()
            .single()
            .await?
            .filter(|session| session.server_session_id == session_id)
        {
            session.cash_balance = response.cash_balance;
            session.coupon_balance = response.coupon_balance;
            uow.sessions().add_or_update(session).await?;
            uow.commit().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for RequestPlayHandler {
    fn kind(&self) -> CommandKind {
        CommandKind::RequestPlay
    }

    async fn handle(
        &self,
        command: Command,
        _pending: Option<PendingTransaction>,
        cancel: &CancelSignal,
    ) -> Result<CommandOutput, CommandError> {
        let Command::RequestPlay(play) = &command else {
            return Err(CommandError::Unhandled(command.kind()));
        };
        let kind = self.kind();
        let (instance_id, session_id) = match self.play_target().await {
            Ok(target) => target,
            Err(e) => return Err(self.abandon(play, e).await),
        };

        let registry = &self.context.registry;
        let service = &self.context.sessions;
        let policy = RetryPolicy::single_retry(self.context.config.request_play_delay());
        let exchange = policy
            .run(cancel, |attempt| {
                // Each attempt carries a fresh id so a retry is never taken
                // for a duplicate of the first request.
                let local_transaction_id = registry.next_local_transaction_id();
                info!(attempt, %local_transaction_id, "Requesting play");
                service.request_play(RequestPlayMessage {
                    instance_id,
                    session_id,
                    paytable_index: play.paytable_index,
                    num_credits: play.credits,
                    denomination: play.denomination,
                    game_id: play.game_id,
                    local_transaction_id: Some(local_transaction_id),
                })
            })
            .await;
        let Ok(exchange) = exchange else {
            return Err(self.abandon(play, CommandError::Cancelled { kind }).await);
        };

        let response = match &exchange {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "No play response");
                self.report(play, Vec::new(), Some(OutcomeException::TimedOut))
                    .await;
                return Err(CommandError::Disconnected {
                    kind,
                    reason: disconnect_reason(&exchange),
                });
            }
        };

        let code = response.response_code;
        if code.is_ok() || response.prize_index != 0 {
            return self.granted(play, session_id, response).await;
        }

        self.rejected(play, session_id, code).await?;
        match classify_terminal(Some(code), Scope::Session) {
            ResponseClass::ForceDisconnect => Err(CommandError::Disconnected {
                kind,
                reason: disconnect_reason(&exchange),
            }),
            _ => Err(CommandError::Rejected { kind, code }),
        }
    }
}

#[cfg(test)]
mod tests;
