//! Request and response messages exchanged with the VLT service.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, HasResponseCode, InstanceId, LocalTransactionId, ResponseCode, SessionId};

// Session messages

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginSessionMessage {
    pub instance_id: InstanceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginSessionWithSessionIdMessage {
    pub instance_id: InstanceId,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndSessionMessage {
    pub instance_id: InstanceId,
    pub session_id: SessionId,
    pub local_transaction_id: LocalTransactionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPlayMessage {
    pub instance_id: InstanceId,
    pub session_id: SessionId,
    pub paytable_index: i32,
    pub num_credits: i64,
    pub denomination: Cents,
    pub game_id: i32,
    pub local_transaction_id: Option<LocalTransactionId>,
}

// Currency messages

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCashMessage {
    pub instance_id: InstanceId,
    pub session_id: SessionId,
    pub amount: Cents,
    pub local_transaction_id: LocalTransactionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditVoucherMessage {
    pub instance_id: InstanceId,
    pub session_id: SessionId,
    pub barcode: String,
    pub amount: Cents,
    pub local_transaction_id: LocalTransactionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowCashMessage {
    pub instance_id: InstanceId,
    pub amount: Cents,
    pub local_transaction_id: LocalTransactionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateVoucherMessage {
    pub instance_id: InstanceId,
    pub barcode: String,
    pub local_transaction_id: LocalTransactionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherPrintedMessage {
    pub instance_id: InstanceId,
    pub barcode: String,
    pub local_transaction_id: LocalTransactionId,
}

// Registration messages

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterInstanceMessage {
    pub device_guid: Uuid,
    pub device_name: String,
    pub manufacturer_name: String,
    pub application_guid: Uuid,
    pub application_name: String,
}

/// Which part of the system an attribute describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeScope {
    Site,
    Application,
    Installation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterAttributeMessage {
    pub instance_id: InstanceId,
    pub scope: AttributeScope,
    pub name: String,
    pub value: String,
    pub allowed_values: Vec<String>,
    pub control_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCommandMessage {
    pub instance_id: InstanceId,
    pub command_id: i32,
    pub description: String,
    pub parameter_name: String,
    pub default_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterActionMessage {
    pub instance_id: InstanceId,
    pub action_guid: Uuid,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterNotificationMessage {
    pub instance_id: InstanceId,
    pub notification_id: i32,
    pub description: String,
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterGameMessage {
    pub instance_id: InstanceId,
    pub game_upc_number: i32,
    pub game_description: String,
    pub paytable_id: String,
    pub paytable_index: i32,
    pub max_wager_credits: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDenominationMessage {
    pub instance_id: InstanceId,
    pub game_upc_number: i32,
    pub denomination: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProgressiveMessage {
    pub instance_id: InstanceId,
    pub progressive_name: String,
    pub pool_name: String,
    pub signs: String,
}

// Responses

/// Response carrying nothing but its code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub response_code: ResponseCode,
}

impl CommandResponse {
    pub fn new(response_code: ResponseCode) -> Self {
        Self { response_code }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterInstanceResponse {
    pub response_code: ResponseCode,
    pub instance_id: InstanceId,
    pub site_id: i32,
    pub device_id: i32,
    /// Site controller clock, used to synchronize the terminal.
    pub date_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginSessionResponse {
    pub response_code: ResponseCode,
    pub session_id: SessionId,
    pub cash_balance: Cents,
    pub coupon_balance: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndSessionResponse {
    pub response_code: ResponseCode,
    pub voucher_barcode: String,
    pub cash_balance: Cents,
    pub coupon_balance: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditResponse {
    pub response_code: ResponseCode,
    pub cash_balance: Cents,
    pub coupon_balance: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateVoucherResponse {
    pub response_code: ResponseCode,
    pub cash_amount: Cents,
    pub coupon_amount: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPlayResponse {
    pub response_code: ResponseCode,
    pub prize_index: i32,
    pub prize_value: Cents,
    pub progressive_win: bool,
    pub progressive_win_value: Cents,
    pub cash_balance: Cents,
    pub coupon_balance: Cents,
}

macro_rules! impl_has_response_code {
    ($($response:ty),* $(,)?) => {
        $(
            impl HasResponseCode for $response {
                fn response_code(&self) -> ResponseCode {
                    self.response_code
                }
            }
        )*
    };
}

impl_has_response_code!(
    CommandResponse,
    RegisterInstanceResponse,
    BeginSessionResponse,
    EndSessionResponse,
    CreditResponse,
    ValidateVoucherResponse,
    RequestPlayResponse,
);
