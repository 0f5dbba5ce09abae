//! Terminal-side services the command layer reports to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::Millicents;

/// Priority of an employee-card lockup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockupPriority {
    Normal,
    High,
    Critical,
}

/// Disables the terminal until an attendant inserts an employee card.
#[async_trait]
pub trait LockupService: Send + Sync {
    async fn lockup_for_employee_card(&self, message: String, priority: LockupPriority);
}

/// Failure conditions reported to the site controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationCode {
    /// BeginSession failed while the server reported a balance.
    SessionBalanceOnFailure,
    /// CreditCash was rejected; payload is the amount.
    CashCreditFailed,
    /// CreditVoucher was rejected; payload is the barcode.
    VoucherCreditFailed,
}

/// Informs the remote system of a locally detected failure.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn notify(&self, code: NotificationCode, payload: String);
}

/// Kind of outcome produced by a play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeType {
    Standard,
    Progressive,
}

/// A single central-determination outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub outcome_type: OutcomeType,
    pub value: Millicents,
    /// Prize index reported by the server.
    pub reference: i32,
    pub game_id: i32,
}

/// Why a play produced no usable outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeException {
    Invalid,
    InvalidPaytableIndex,
    TimedOut,
}

/// Receives the outcomes of a central-determination play request.
#[async_trait]
pub trait OutcomeProvider: Send + Sync {
    async fn outcome_response(
        &self,
        transaction_id: i64,
        outcomes: Vec<Outcome>,
        exception: Option<OutcomeException>,
    );
}

/// Terminal clock, synchronized at registration.
pub trait TimeService: Send + Sync {
    fn update(&self, time: DateTime<Utc>);
}
