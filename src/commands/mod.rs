//! Outbound protocol commands.
//!
//! A caller builds a [`Command`] and hands it to the [`CommandDispatcher`],
//! which resolves the one handler for its [`CommandKind`]. Transactional
//! commands are tracked by the [`RetryRegistry`] until the server resolves
//! them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::interfaces::Outcome;
use crate::protocol::{Cents, ResponseCode, SessionId};
use crate::storage::{Session, Voucher};

mod context;
pub mod dispatch;
mod error;
mod financial;
mod play;
pub mod registry;
mod session;

pub use context::CommandContext;
pub use dispatch::{CommandDispatcher, CommandDispatcherBuilder, CommandHandler, ReplaySummary};
pub use error::{CommandError, DispatchError, OutcomeError};
pub use financial::{
    CreditCashHandler, CreditVoucherHandler, EscrowCashHandler, ValidateVoucherHandler,
    VoucherPrintedHandler,
};
pub use play::RequestPlayHandler;
pub use registry::{PendingTransaction, RegistryEntry, RegistryError, RetryRegistry};
pub use session::{BeginSessionHandler, BeginSessionWithSessionIdHandler, EndSessionHandler};

/// Open a session for the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginSession;

/// Reopen a session the server already knows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginSessionWithSessionId {
    pub session_id: SessionId,
}

/// Close the session and cash out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndSession {
    /// Balance shown to the player when the cash-out started.
    pub balance: Cents,
}

/// Central-determination play request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPlay {
    pub cash_balance: Cents,
    pub coupon_balance: Cents,
    pub paytable_index: i32,
    pub credits: i64,
    pub denomination: Cents,
    pub game_id: i32,
    /// Game-side transaction the outcome is reported against.
    pub transaction_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCash {
    pub amount: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditVoucher {
    pub barcode: String,
    pub amount: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowCash {
    pub amount: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateVoucher {
    pub barcode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherPrinted {
    pub barcode: String,
}

/// Every command the dispatcher accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    BeginSession(BeginSession),
    BeginSessionWithSessionId(BeginSessionWithSessionId),
    EndSession(EndSession),
    RequestPlay(RequestPlay),
    CreditCash(CreditCash),
    CreditVoucher(CreditVoucher),
    EscrowCash(EscrowCash),
    ValidateVoucher(ValidateVoucher),
    VoucherPrinted(VoucherPrinted),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::BeginSession(_) => CommandKind::BeginSession,
            Command::BeginSessionWithSessionId(_) => CommandKind::BeginSessionWithSessionId,
            Command::EndSession(_) => CommandKind::EndSession,
            Command::RequestPlay(_) => CommandKind::RequestPlay,
            Command::CreditCash(_) => CommandKind::CreditCash,
            Command::CreditVoucher(_) => CommandKind::CreditVoucher,
            Command::EscrowCash(_) => CommandKind::EscrowCash,
            Command::ValidateVoucher(_) => CommandKind::ValidateVoucher,
            Command::VoucherPrinted(_) => CommandKind::VoucherPrinted,
        }
    }
}

macro_rules! impl_from_command {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Command {
                fn from(command: $variant) -> Self {
                    Command::$variant(command)
                }
            }
        )*
    };
}

impl_from_command!(
    BeginSession,
    BeginSessionWithSessionId,
    EndSession,
    RequestPlay,
    CreditCash,
    CreditVoucher,
    EscrowCash,
    ValidateVoucher,
    VoucherPrinted,
);

/// Runtime type tag of a command; the dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommandKind {
    BeginSession,
    BeginSessionWithSessionId,
    EndSession,
    RequestPlay,
    CreditCash,
    CreditVoucher,
    EscrowCash,
    ValidateVoucher,
    VoucherPrinted,
}

impl CommandKind {
    pub const ALL: [CommandKind; 9] = [
        CommandKind::BeginSession,
        CommandKind::BeginSessionWithSessionId,
        CommandKind::EndSession,
        CommandKind::RequestPlay,
        CommandKind::CreditCash,
        CommandKind::CreditVoucher,
        CommandKind::EscrowCash,
        CommandKind::ValidateVoucher,
        CommandKind::VoucherPrinted,
    ];

    /// Whether commands of this kind are tracked by the retry registry.
    pub fn is_transactional(self) -> bool {
        !matches!(
            self,
            CommandKind::BeginSession
                | CommandKind::BeginSessionWithSessionId
                | CommandKind::RequestPlay
        )
    }

    /// Codes proving the server has resolved a command of this kind.
    ///
    /// Only these codes remove a registry entry; anything else keeps the
    /// command for resend.
    pub fn terminal_codes(self) -> &'static [ResponseCode] {
        use ResponseCode::*;

        match self {
            CommandKind::EndSession => &[
                Ok,
                DoNotPrintVoucher,
                InvalidSessionId,
                SessionEndedVoucherPrintedOffline,
            ],
            CommandKind::CreditVoucher
            | CommandKind::ValidateVoucher
            | CommandKind::VoucherPrinted => &[
                Ok,
                DoNotPrintVoucher,
                BarcodeNotFound,
                InvalidBarcode,
                InvalidBarcodeLength,
                VoucherAlreadyRedeemed,
                InvalidAmount,
            ],
            CommandKind::CreditCash | CommandKind::EscrowCash => {
                &[Ok, DoNotPrintVoucher, InvalidAmount]
            }
            CommandKind::BeginSession
            | CommandKind::BeginSessionWithSessionId
            | CommandKind::RequestPlay => &[],
        }
    }

    pub fn is_terminal(self, code: ResponseCode) -> bool {
        self.terminal_codes().contains(&code)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of a completed play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayResult {
    pub outcomes: Vec<Outcome>,
    /// The round must end with a cash-out.
    pub force_cash_out: bool,
}

/// Successful outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    SessionStarted(Session),
    /// The server closed the session offline; local rows were removed.
    SessionResolvedOffline,
    SessionEnded(Voucher),
    /// Nothing to end, or the session already ended with an offline voucher.
    SessionEndedOffline,
    Credited {
        cash_balance: Cents,
        coupon_balance: Cents,
    },
    Escrowed,
    VoucherValidated {
        cash_amount: Cents,
        coupon_amount: Cents,
    },
    VoucherPrinted,
    Played(PlayResult),
}

#[cfg(test)]
mod tests;
