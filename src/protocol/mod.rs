//! Protocol vocabulary shared by every command.
//!
//! Response codes, identifiers and money helpers. The wire encoding of these
//! values belongs to the transport implementation and is not defined here.

pub mod classify;
pub mod messages;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use classify::{classify, classify_terminal, ResponseClass, Scope};

/// Amount of money in cents.
pub type Cents = i64;

/// Amount of money in millicents, the unit the outcome provider expects.
pub type Millicents = i64;

/// Millicents per cent.
pub const MILLICENTS_PER_CENT: i64 = 1_000;

/// Instance identifier assigned by the site controller at registration.
pub type InstanceId = i32;

/// Server-side session identifier.
pub type SessionId = i32;

/// Client-assigned sequence number the server uses to detect duplicate delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocalTransactionId(pub u64);

impl fmt::Display for LocalTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server outcome of a request.
///
/// A missing response (transport failure) is not a code; it is carried as
/// `Err(TransportError)` next to the typed response instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseCode {
    Ok,
    ServerError,
    InvalidInstanceId,
    VltServiceNotRegistered,
    DeviceStillRegisteredWithVltSvc,
    DeviceStillRegisteredWithLauncherSvc,
    InvalidSessionId,
    SessionNoSessionInProgress,
    SessionEndedVoucherPrintedOffline,
    DuplicateVoucherRetry,
    DoNotPrintVoucher,
    BarcodeNotFound,
    InvalidBarcode,
    InvalidBarcodeLength,
    VoucherAlreadyRedeemed,
    InvalidAmount,
    InsufficientBalance,
    InvalidPayTableIndex,
    InvalidDenomination,
    InstanceAlreadyRegistered,
    AttributeAlreadyRegistered,
    CommandAlreadyRegistered,
    ActionAlreadyRegistered,
    NotificationAlreadyRegistered,
    GameAlreadyRegistered,
    DenominationAlreadyRegistered,
    ProgressiveAlreadyRegistered,
    InvalidDeviceGuid,
    InvalidApplicationGuid,
}

impl ResponseCode {
    pub fn is_ok(self) -> bool {
        self == ResponseCode::Ok
    }

    /// Business failures that describe a problem with a voucher barcode.
    pub fn is_barcode_failure(self) -> bool {
        matches!(
            self,
            ResponseCode::BarcodeNotFound
                | ResponseCode::InvalidBarcode
                | ResponseCode::InvalidBarcodeLength
        )
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Access to the response code of a typed response.
pub trait HasResponseCode {
    fn response_code(&self) -> ResponseCode;
}

/// No response was received for a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no response from site controller: {0}")]
pub struct TransportError(pub String);

/// Result of one request/response exchange.
pub type Exchange<R> = Result<R, TransportError>;

/// Response code of an exchange, `None` when nothing was received.
pub fn exchange_code<R: HasResponseCode>(exchange: &Exchange<R>) -> Option<ResponseCode> {
    exchange.as_ref().ok().map(HasResponseCode::response_code)
}

/// Render cents the way attendant-facing messages show money.
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

/// Scale cents to millicents, `None` on overflow.
pub fn cents_to_millicents(cents: Cents) -> Option<Millicents> {
    cents.checked_mul(MILLICENTS_PER_CENT)
}
