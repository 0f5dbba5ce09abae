//! Registry bookkeeping and replay after reconnect.

use mgam::commands::{BeginSession, CreditCash, EndSession};
use mgam::protocol::{LocalTransactionId, ResponseCode};
use mgam::storage::Session;
use mgam::test_utils::{begin_session_response, credit_response, end_session_response, Harness};
use mgam::{CommandError, CommandKind, CommandOutput};

#[tokio::test]
async fn test_exhausted_server_error_keeps_entry_registered() {
    let harness = Harness::new();
    harness.store.insert_session(Session::new(7, 0, 0)).await;
    harness
        .currency
        .credit_cash
        .set_fallback(credit_response(ResponseCode::ServerError, 0, 0))
        .await;

    let err = harness
        .dispatcher()
        .execute(CreditCash { amount: 1_000 })
        .await
        .unwrap_err();

    assert_eq!(err.response_code(), Some(ResponseCode::ServerError));
    let entries = harness.registry.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, CommandKind::CreditCash);
    assert!(!entries[0].in_flight);
}

#[tokio::test]
async fn test_replay_settles_entry_with_the_same_transaction_id() {
    let harness = Harness::new();
    let dispatcher = harness.dispatcher();
    harness.store.insert_session(Session::new(7, 0, 0)).await;
    harness.currency.credit_cash.fail("link down").await;

    let err = dispatcher
        .execute(CreditCash { amount: 1_000 })
        .await
        .unwrap_err();
    assert!(err.is_force_disconnect());
    assert_eq!(harness.registry.len(), 1);

    harness.reconnect();
    harness
        .currency
        .credit_cash
        .respond(credit_response(ResponseCode::Ok, 1_000, 0))
        .await;
    let summary = dispatcher.replay_pending().await;

    assert!(!summary.halted);
    assert_eq!(summary.results.len(), 1);
    assert!(summary.results[0].1.is_ok());
    assert!(harness.registry.is_empty());

    let ids: Vec<_> = harness
        .currency
        .credit_cash
        .requests()
        .await
        .into_iter()
        .map(|m| m.local_transaction_id)
        .collect();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], ids[1]);
    assert_eq!(harness.store.sessions().await[0].cash_balance, 1_000);
}

#[tokio::test]
async fn test_replayed_end_session_never_writes_two_vouchers() {
    let harness = Harness::new();
    let dispatcher = harness.dispatcher();
    harness.store.insert_session(Session::new(7, 500, 0)).await;
    harness
        .sessions
        .end_session
        .set_fallback(end_session_response(ResponseCode::Ok, "998877", 500))
        .await;

    // The server accepted the cash-out but the local commit failed.
    harness.store.set_fail_on_commit(true).await;
    let err = dispatcher
        .execute(EndSession { balance: 500 })
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::Storage(_)));
    assert!(harness.store.vouchers().await.is_empty());
    assert_eq!(harness.registry.len(), 1);

    harness.store.set_fail_on_commit(false).await;
    let summary = dispatcher.replay_pending().await;
    assert!(summary.results[0].1.is_ok());

    let again = dispatcher.replay_pending().await;
    assert!(again.results.is_empty());

    assert_eq!(harness.store.vouchers().await.len(), 1);
    assert!(harness.store.sessions().await.is_empty());
    assert!(harness.registry.is_empty());
}

#[tokio::test]
async fn test_duplicate_voucher_retry_rotates_to_a_greater_id() {
    let harness = Harness::new();
    harness.store.insert_session(Session::new(7, 500, 0)).await;
    harness
        .sessions
        .end_session
        .respond(end_session_response(ResponseCode::DuplicateVoucherRetry, "", 0))
        .await;
    harness
        .sessions
        .end_session
        .respond(end_session_response(ResponseCode::DuplicateVoucherRetry, "", 0))
        .await;
    harness
        .sessions
        .end_session
        .respond(end_session_response(ResponseCode::Ok, "555", 500))
        .await;

    harness
        .dispatcher()
        .execute(EndSession { balance: 500 })
        .await
        .unwrap();

    let ids: Vec<LocalTransactionId> = harness
        .sessions
        .end_session
        .requests()
        .await
        .into_iter()
        .map(|m| m.local_transaction_id)
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids[0] < ids[1]);
    assert!(ids[1] < ids[2]);
    assert_eq!(harness.store.vouchers().await.len(), 1);
}

#[tokio::test]
async fn test_non_terminal_rejection_cannot_remove_entry() {
    let harness = Harness::new();
    let pending = harness
        .registry
        .register(&mgam::Command::CreditCash(CreditCash { amount: 5 }));

    let result = pending.remove(ResponseCode::ServerError);

    assert!(result.is_err());
    assert_eq!(harness.registry.len(), 1);
}

#[tokio::test]
async fn test_unsettled_session_survives_reconnect_and_new_session() {
    let harness = Harness::new();
    let dispatcher = harness.dispatcher();
    harness.store.insert_session(Session::new(7, 500, 0)).await;

    // The cash-out request is lost.
    harness.sessions.end_session.fail("link down").await;
    dispatcher
        .execute(EndSession { balance: 500 })
        .await
        .unwrap_err();
    harness.reconnect();

    // No new session while the old one still holds the player's money.
    harness
        .sessions
        .begin_session
        .respond(begin_session_response(ResponseCode::Ok, 8, 0, 0))
        .await;
    let err = dispatcher.execute(BeginSession).await.unwrap_err();
    assert!(matches!(err, CommandError::SessionOpen { session_id: 7 }));
    assert_eq!(harness.sessions.begin_session.call_count().await, 0);

    harness
        .sessions
        .end_session
        .respond(end_session_response(ResponseCode::Ok, "442211", 500))
        .await;
    let summary = dispatcher.replay_pending().await;
    assert!(matches!(
        summary.results[0].1,
        Ok(CommandOutput::SessionEnded(_))
    ));

    dispatcher.execute(BeginSession).await.unwrap();

    let ended: Vec<_> = harness
        .sessions
        .end_session
        .requests()
        .await
        .into_iter()
        .map(|m| m.session_id)
        .collect();
    assert!(ended.len() >= 2);
    assert!(ended.iter().all(|session_id| *session_id == 7));
    let vouchers = harness.store.vouchers().await;
    assert_eq!(vouchers.len(), 1);
    assert_eq!(vouchers[0].session_id, Some(7));
    assert_eq!(vouchers[0].amount, 500);
    assert_eq!(harness.store.sessions().await, vec![Session::new(8, 0, 0)]);
    assert!(harness.registry.is_empty());
}
