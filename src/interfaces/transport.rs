//! VLT service transports.
//!
//! Each call is one request/response exchange. `Err(TransportError)` means
//! nothing was received; any received response carries its own code.

use async_trait::async_trait;

use crate::protocol::messages::{
    BeginSessionMessage, BeginSessionResponse, BeginSessionWithSessionIdMessage, CommandResponse,
    CreditCashMessage, CreditResponse, CreditVoucherMessage, EndSessionMessage,
    EndSessionResponse, EscrowCashMessage, RegisterActionMessage, RegisterAttributeMessage,
    RegisterCommandMessage, RegisterDenominationMessage, RegisterGameMessage,
    RegisterInstanceMessage, RegisterInstanceResponse, RegisterNotificationMessage,
    RegisterProgressiveMessage, RequestPlayMessage, RequestPlayResponse, ValidateVoucherMessage,
    ValidateVoucherResponse, VoucherPrintedMessage,
};
use crate::protocol::Exchange;

/// Session commands.
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn begin_session(&self, message: BeginSessionMessage) -> Exchange<BeginSessionResponse>;

    async fn begin_session_with_session_id(
        &self,
        message: BeginSessionWithSessionIdMessage,
    ) -> Exchange<BeginSessionResponse>;

    async fn end_session(&self, message: EndSessionMessage) -> Exchange<EndSessionResponse>;

    async fn request_play(&self, message: RequestPlayMessage) -> Exchange<RequestPlayResponse>;
}

/// Registration handshake messages.
#[async_trait]
pub trait RegistrationService: Send + Sync {
    async fn register_instance(
        &self,
        message: RegisterInstanceMessage,
    ) -> Exchange<RegisterInstanceResponse>;

    async fn register_attribute(
        &self,
        message: RegisterAttributeMessage,
    ) -> Exchange<CommandResponse>;

    async fn register_command(&self, message: RegisterCommandMessage) -> Exchange<CommandResponse>;

    async fn register_action(&self, message: RegisterActionMessage) -> Exchange<CommandResponse>;

    async fn register_notification(
        &self,
        message: RegisterNotificationMessage,
    ) -> Exchange<CommandResponse>;

    async fn register_game(&self, message: RegisterGameMessage) -> Exchange<CommandResponse>;

    async fn register_denomination(
        &self,
        message: RegisterDenominationMessage,
    ) -> Exchange<CommandResponse>;

    async fn register_progressive(
        &self,
        message: RegisterProgressiveMessage,
    ) -> Exchange<CommandResponse>;
}

/// Cash and voucher commands.
#[async_trait]
pub trait CurrencyService: Send + Sync {
    async fn credit_cash(&self, message: CreditCashMessage) -> Exchange<CreditResponse>;

    async fn credit_voucher(&self, message: CreditVoucherMessage) -> Exchange<CreditResponse>;

    async fn escrow_cash(&self, message: EscrowCashMessage) -> Exchange<CommandResponse>;

    async fn validate_voucher(
        &self,
        message: ValidateVoucherMessage,
    ) -> Exchange<ValidateVoucherResponse>;

    async fn voucher_printed(&self, message: VoucherPrintedMessage) -> Exchange<CommandResponse>;
}
