use super::*;

#[test]
fn test_command_kind_matches_variant() {
    let command: Command = CreditVoucher {
        barcode: "123".to_string(),
        amount: 100,
    }
    .into();

    assert_eq!(command.kind(), CommandKind::CreditVoucher);
}

#[test]
fn test_transactional_kinds() {
    let transactional: Vec<_> = CommandKind::ALL
        .into_iter()
        .filter(|kind| kind.is_transactional())
        .collect();

    assert_eq!(
        transactional,
        vec![
            CommandKind::EndSession,
            CommandKind::CreditCash,
            CommandKind::CreditVoucher,
            CommandKind::EscrowCash,
            CommandKind::ValidateVoucher,
            CommandKind::VoucherPrinted,
        ]
    );
}

#[test]
fn test_terminal_codes_always_include_ok_and_do_not_print() {
    for kind in CommandKind::ALL.into_iter().filter(|k| k.is_transactional()) {
        assert!(kind.is_terminal(ResponseCode::Ok), "{kind}");
        assert!(kind.is_terminal(ResponseCode::DoNotPrintVoucher), "{kind}");
        assert!(!kind.is_terminal(ResponseCode::ServerError), "{kind}");
        assert!(!kind.is_terminal(ResponseCode::DuplicateVoucherRetry), "{kind}");
    }
}

#[test]
fn test_end_session_terminal_codes() {
    assert!(CommandKind::EndSession.is_terminal(ResponseCode::InvalidSessionId));
    assert!(CommandKind::EndSession.is_terminal(ResponseCode::SessionEndedVoucherPrintedOffline));
    assert!(!CommandKind::CreditCash.is_terminal(ResponseCode::InvalidSessionId));
}
