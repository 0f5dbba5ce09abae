//! Persisted records and store implementations.
//!
//! The records are what the terminal must still know after a crash: the open
//! session, the voucher ledger and the identity of the last registration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::{Cents, InstanceId, SessionId};

pub mod memory;

pub use memory::MemoryStore;

pub use crate::interfaces::store::*;

/// The open player session. At most one row exists at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub server_session_id: SessionId,
    pub cash_balance: Cents,
    pub coupon_balance: Cents,
    /// The session was closed by a voucher printed while offline.
    pub offline_voucher_printed: bool,
}

impl Session {
    pub fn new(server_session_id: SessionId, cash_balance: Cents, coupon_balance: Cents) -> Self {
        Self {
            server_session_id,
            cash_balance,
            coupon_balance,
            offline_voucher_printed: false,
        }
    }

    pub fn balance(&self) -> Cents {
        self.cash_balance + self.coupon_balance
    }
}

/// Why a voucher was written without the server confirming a payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfflineReason {
    /// The server rejected the paytable of a play.
    InvalidPaytableIndex,
    /// The server rejected a play without granting a prize.
    PlayRejected,
}

/// A cash payout. Rows are appended, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    /// Barcode issued by the server; offline vouchers have none.
    pub barcode: Option<String>,
    pub session_id: Option<SessionId>,
    pub amount: Cents,
    pub cash_amount: Cents,
    pub coupon_amount: Cents,
    pub offline_reason: Option<OfflineReason>,
    pub created_at: DateTime<Utc>,
}

/// Identity assigned by the site controller at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentity {
    pub instance_id: InstanceId,
    pub site_id: i32,
    pub device_id: i32,
    pub registered_at: DateTime<Utc>,
}
