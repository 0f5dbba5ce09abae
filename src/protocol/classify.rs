//! Response classification.
//!
//! Pure mapping from a response code (or its absence) to the way the command
//! layer reacts to it. Publishing side effects happen in the dispatcher.

use std::fmt;

use super::ResponseCode;

/// How a response is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// Proceed with local success side effects.
    Ok,
    /// Transient server failure, eligible for a bounded retry.
    RetryableServerError,
    /// Tear the connection down and register again from scratch.
    ForceDisconnect,
    /// Rejected by the server; handled locally by the command.
    BusinessFailure,
}

/// Which layer a command belongs to. The same code means different things
/// depending on the layer that receives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Registration messages.
    Standard,
    /// Session commands (BeginSession, RequestPlay).
    Session,
    /// Registry-tracked currency and voucher commands.
    Transactional,
    /// Voucher-issuing session commands (EndSession).
    Voucher,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Classify the outcome of a single attempt.
pub fn classify(code: Option<ResponseCode>, scope: Scope) -> ResponseClass {
    let Some(code) = code else {
        return ResponseClass::ForceDisconnect;
    };

    match code {
        ResponseCode::Ok => ResponseClass::Ok,
        ResponseCode::InvalidInstanceId
        | ResponseCode::VltServiceNotRegistered
        | ResponseCode::DeviceStillRegisteredWithLauncherSvc => ResponseClass::ForceDisconnect,
        ResponseCode::ServerError => ResponseClass::RetryableServerError,
        ResponseCode::DuplicateVoucherRetry => match scope {
            Scope::Voucher => ResponseClass::RetryableServerError,
            Scope::Transactional => ResponseClass::ForceDisconnect,
            Scope::Standard | Scope::Session => ResponseClass::BusinessFailure,
        },
        _ => ResponseClass::BusinessFailure,
    }
}

/// Classify the final outcome once the retry policy has given up.
///
/// A retryable error that survived every attempt degrades to a forced
/// disconnect on session-layer commands and to a business failure elsewhere.
pub fn classify_terminal(code: Option<ResponseCode>, scope: Scope) -> ResponseClass {
    match classify(code, scope) {
        ResponseClass::RetryableServerError => match scope {
            Scope::Session | Scope::Voucher => ResponseClass::ForceDisconnect,
            Scope::Transactional => match code {
                Some(ResponseCode::DuplicateVoucherRetry) => ResponseClass::ForceDisconnect,
                _ => ResponseClass::BusinessFailure,
            },
            Scope::Standard => ResponseClass::BusinessFailure,
        },
        class => class,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_SCOPES: [Scope; 4] = [
        Scope::Standard,
        Scope::Session,
        Scope::Transactional,
        Scope::Voucher,
    ];

    #[test]
    fn missing_response_forces_disconnect() {
        for scope in ALL_SCOPES {
            assert_eq!(classify(None, scope), ResponseClass::ForceDisconnect);
            assert_eq!(classify_terminal(None, scope), ResponseClass::ForceDisconnect);
        }
    }

    #[test]
    fn ok_is_ok_everywhere() {
        for scope in ALL_SCOPES {
            assert_eq!(classify(Some(ResponseCode::Ok), scope), ResponseClass::Ok);
        }
    }

    #[test]
    fn registration_state_codes_force_disconnect() {
        for code in [
            ResponseCode::InvalidInstanceId,
            ResponseCode::VltServiceNotRegistered,
            ResponseCode::DeviceStillRegisteredWithLauncherSvc,
        ] {
            for scope in ALL_SCOPES {
                assert_eq!(classify(Some(code), scope), ResponseClass::ForceDisconnect);
            }
        }
    }

    #[test]
    fn server_error_is_retryable_then_depends_on_scope() {
        let code = Some(ResponseCode::ServerError);
        for scope in ALL_SCOPES {
            assert_eq!(classify(code, scope), ResponseClass::RetryableServerError);
        }
        assert_eq!(
            classify_terminal(code, Scope::Session),
            ResponseClass::ForceDisconnect
        );
        assert_eq!(
            classify_terminal(code, Scope::Voucher),
            ResponseClass::ForceDisconnect
        );
        assert_eq!(
            classify_terminal(code, Scope::Transactional),
            ResponseClass::BusinessFailure
        );
        assert_eq!(
            classify_terminal(code, Scope::Standard),
            ResponseClass::BusinessFailure
        );
    }

    #[test]
    fn duplicate_voucher_retry_by_scope() {
        let code = Some(ResponseCode::DuplicateVoucherRetry);
        assert_eq!(
            classify(code, Scope::Voucher),
            ResponseClass::RetryableServerError
        );
        assert_eq!(
            classify(code, Scope::Transactional),
            ResponseClass::ForceDisconnect
        );
        assert_eq!(
            classify(code, Scope::Session),
            ResponseClass::BusinessFailure
        );
        assert_eq!(
            classify_terminal(code, Scope::Voucher),
            ResponseClass::ForceDisconnect
        );
    }

    #[test]
    fn other_codes_are_business_failures() {
        for code in [
            ResponseCode::DoNotPrintVoucher,
            ResponseCode::InvalidBarcode,
            ResponseCode::InvalidSessionId,
            ResponseCode::InvalidPayTableIndex,
            ResponseCode::DeviceStillRegisteredWithVltSvc,
        ] {
            assert_eq!(
                classify_terminal(Some(code), Scope::Session),
                ResponseClass::BusinessFailure
            );
        }
    }
}
