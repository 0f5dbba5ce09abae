//! Session lifecycle: open, cash out, offline resolution.

use mgam::commands::{BeginSession, EndSession};
use mgam::interfaces::{ForcedCashOutEvent, ProtocolEvent};
use mgam::protocol::ResponseCode;
use mgam::storage::Session;
use mgam::test_utils::{begin_session_response, end_session_response, Harness};
use mgam::{CommandError, CommandOutput};

#[tokio::test]
async fn test_begin_session_persists_server_balances() {
    let harness = Harness::new();
    harness
        .sessions
        .begin_session
        .respond(begin_session_response(ResponseCode::Ok, 7, 500, 0))
        .await;

    let output = harness.dispatcher().execute(BeginSession).await.unwrap();

    assert!(matches!(output, CommandOutput::SessionStarted(_)));
    assert_eq!(harness.store.sessions().await, vec![Session::new(7, 500, 0)]);
}

#[tokio::test]
async fn test_do_not_print_voucher_forces_cash_out() {
    let harness = Harness::new();
    let dispatcher = harness.dispatcher();
    harness
        .sessions
        .begin_session
        .respond(begin_session_response(ResponseCode::Ok, 7, 500, 0))
        .await;
    dispatcher.execute(BeginSession).await.unwrap();
    harness
        .sessions
        .end_session
        .respond(end_session_response(ResponseCode::DoNotPrintVoucher, "", 0))
        .await;

    let err = dispatcher
        .execute(EndSession { balance: 500 })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CommandError::Rejected {
            code: ResponseCode::DoNotPrintVoucher,
            ..
        }
    ));
    assert!(harness.store.sessions().await.is_empty());
    assert!(harness.store.vouchers().await.is_empty());
    assert_eq!(
        harness.events.take_published().await,
        vec![ProtocolEvent::ForcedCashOut(ForcedCashOutEvent { amount: 500 })]
    );
    let messages = harness.lockups.messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("$5.00"), "{}", messages[0]);
    assert!(harness.registry.is_empty());
}

#[tokio::test]
async fn test_end_session_without_session_stays_offline() {
    let harness = Harness::new();

    let output = harness
        .dispatcher()
        .execute(EndSession { balance: 0 })
        .await
        .unwrap();

    assert!(matches!(output, CommandOutput::SessionEndedOffline));
    assert_eq!(harness.sessions.end_session.call_count().await, 0);
    assert!(harness.registry.is_empty());
}

#[tokio::test]
async fn test_end_session_after_offline_voucher_stays_offline() {
    let harness = Harness::new();
    harness
        .store
        .insert_session(Session {
            offline_voucher_printed: true,
            ..Session::new(7, 300, 0)
        })
        .await;

    let output = harness
        .dispatcher()
        .execute(EndSession { balance: 300 })
        .await
        .unwrap();

    assert!(matches!(output, CommandOutput::SessionEndedOffline));
    assert_eq!(harness.sessions.end_session.call_count().await, 0);
    assert!(harness.store.vouchers().await.is_empty());
}

#[tokio::test]
async fn test_end_session_ok_writes_one_voucher() {
    let harness = Harness::new();
    harness.store.insert_session(Session::new(7, 500, 0)).await;
    harness
        .sessions
        .end_session
        .respond(end_session_response(ResponseCode::Ok, "123456789", 500))
        .await;

    let output = harness
        .dispatcher()
        .execute(EndSession { balance: 500 })
        .await
        .unwrap();

    let CommandOutput::SessionEnded(voucher) = output else {
        panic!("unexpected output {output:?}");
    };
    assert_eq!(voucher.barcode.as_deref(), Some("123456789"));
    assert_eq!(harness.store.vouchers().await.len(), 1);
    assert!(harness.store.sessions().await.is_empty());
    assert!(harness.lockups.messages().await.is_empty());
}
