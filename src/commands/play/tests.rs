use super::*;
use crate::storage::Session;
use crate::test_utils::{play_response, Harness};
use crate::utils::cancel::cancel_pair;

fn play() -> RequestPlay {
    RequestPlay {
        cash_balance: 400,
        coupon_balance: 100,
        paytable_index: 2,
        credits: 5,
        denomination: 25,
        game_id: 100,
        transaction_id: 9001,
    }
}

async fn harness_with_session() -> Harness {
    let harness = Harness::new();
    harness.store.insert_session(Session::new(7, 500, 0)).await;
    harness
}

#[test]
fn test_decode_outcomes_scales_to_millicents() {
    let outcomes = decode_outcomes(&play_response(ResponseCode::Ok, 3, 250), 100).unwrap();

    assert_eq!(
        outcomes,
        vec![Outcome {
            outcome_type: OutcomeType::Standard,
            value: 250_000,
            reference: 3,
            game_id: 100,
        }]
    );
}

#[test]
fn test_decode_outcomes_adds_progressive() {
    let response = RequestPlayResponse {
        progressive_win: true,
        progressive_win_value: 10_000,
        ..play_response(ResponseCode::Ok, 1, 50)
    };

    let outcomes = decode_outcomes(&response, 100).unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[1].outcome_type, OutcomeType::Progressive);
    assert_eq!(outcomes[1].value, 10_000_000);
}

#[test]
fn test_decode_outcomes_overflow() {
    let response = play_response(ResponseCode::Ok, 1, i64::MAX);

    assert_eq!(
        decode_outcomes(&response, 100),
        Err(OutcomeError::PrizeOverflow(i64::MAX))
    );
}

#[tokio::test]
async fn test_ok_play_reports_outcome_and_wager() {
    let harness = harness_with_session().await;
    harness
        .sessions
        .request_play
        .respond(RequestPlayResponse {
            cash_balance: 625,
            ..play_response(ResponseCode::Ok, 3, 250)
        })
        .await;

    let output = harness.dispatcher().execute(play()).await.unwrap();

    let CommandOutput::Played(result) = output else {
        panic!("unexpected output {output:?}");
    };
    assert!(!result.force_cash_out);
    assert_eq!(result.outcomes.len(), 1);

    let reports = harness.outcomes.reports().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].transaction_id, 9001);
    assert_eq!(reports[0].outcomes[0].value, 250_000);
    assert_eq!(reports[0].exception, None);

    assert_eq!(
        harness.events.take_published().await,
        vec![ProtocolEvent::WagerPlaced(WagerPlacedEvent { amount: 125 })]
    );
    assert!(harness.store.vouchers().await.is_empty());
    assert_eq!(harness.store.sessions().await[0].cash_balance, 625);
    assert!(harness.registry.is_empty());
}

#[tokio::test]
async fn test_prize_on_failed_play_forces_cash_out() {
    let harness = harness_with_session().await;
    harness
        .sessions
        .request_play
        .respond(play_response(ResponseCode::InvalidDenomination, 4, 100))
        .await;

    let output = harness.dispatcher().execute(play()).await.unwrap();

    let CommandOutput::Played(result) = output else {
        panic!("unexpected output {output:?}");
    };
    assert!(result.force_cash_out);
    assert_eq!(result.outcomes[0].value, 100_000);
    assert!(harness.store.vouchers().await.is_empty());
}

#[tokio::test]
async fn test_invalid_paytable_writes_offline_voucher_before_report() {
    let harness = harness_with_session().await;
    harness
        .sessions
        .request_play
        .respond(play_response(ResponseCode::InvalidPayTableIndex, 0, 0))
        .await;

    let err = harness.dispatcher().execute(play()).await.unwrap_err();

    assert_eq!(err.response_code(), Some(ResponseCode::InvalidPayTableIndex));
    let vouchers = harness.store.vouchers().await;
    assert_eq!(vouchers.len(), 1);
    assert_eq!(vouchers[0].offline_reason, Some(OfflineReason::InvalidPaytableIndex));
    assert_eq!(vouchers[0].amount, 500);
    assert_eq!(vouchers[0].barcode, None);

    let reports = harness.outcomes.reports().await;
    assert_eq!(
        reports[0].exception,
        Some(OutcomeException::InvalidPaytableIndex)
    );
    assert!(reports[0].outcomes.is_empty());
    assert_eq!(harness.events.published_count().await, 0);
}

#[tokio::test]
async fn test_other_rejection_is_invalid() {
    let harness = harness_with_session().await;
    harness
        .sessions
        .request_play
        .respond(play_response(ResponseCode::InsufficientBalance, 0, 0))
        .await;

    harness.dispatcher().execute(play()).await.unwrap_err();

    assert_eq!(
        harness.outcomes.reports().await[0].exception,
        Some(OutcomeException::Invalid)
    );
    assert_eq!(
        harness.store.vouchers().await[0].offline_reason,
        Some(OfflineReason::PlayRejected)
    );
}

#[tokio::test]
async fn test_retries_at_most_once() {
    let mut config = crate::test_utils::fast_config();
    config.retry.retries = 10;
    let harness = Harness::with_config(config);
    harness.store.insert_session(Session::new(7, 500, 0)).await;
    harness
        .sessions
        .request_play
        .set_fallback(play_response(ResponseCode::SessionNoSessionInProgress, 0, 0))
        .await;

    harness.dispatcher().execute(play()).await.unwrap_err();

    assert_eq!(harness.sessions.request_play.call_count().await, 2);
}

#[tokio::test]
async fn test_retry_uses_fresh_local_transaction_id() {
    let harness = harness_with_session().await;
    harness
        .sessions
        .request_play
        .respond(play_response(ResponseCode::ServerError, 0, 0))
        .await;
    harness
        .sessions
        .request_play
        .respond(play_response(ResponseCode::Ok, 0, 0))
        .await;

    harness.dispatcher().execute(play()).await.unwrap();

    let ids: Vec<_> = harness
        .sessions
        .request_play
        .requests()
        .await
        .into_iter()
        .map(|m| m.local_transaction_id)
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids[1] > ids[0]);
}

#[tokio::test]
async fn test_exhausted_server_error_forces_disconnect_after_voucher() {
    let harness = harness_with_session().await;
    harness
        .sessions
        .request_play
        .set_fallback(play_response(ResponseCode::ServerError, 0, 0))
        .await;

    let err = harness.dispatcher().execute(play()).await.unwrap_err();

    assert!(err.is_force_disconnect());
    assert_eq!(harness.store.vouchers().await.len(), 1);
    assert_eq!(
        harness.outcomes.reports().await[0].exception,
        Some(OutcomeException::Invalid)
    );
}

#[tokio::test]
async fn test_no_response_reports_timeout_without_voucher() {
    let harness = harness_with_session().await;

    let err = harness.dispatcher().execute(play()).await.unwrap_err();

    assert!(err.is_force_disconnect());
    assert!(harness.store.vouchers().await.is_empty());
    assert_eq!(
        harness.outcomes.reports().await[0].exception,
        Some(OutcomeException::TimedOut)
    );
}

#[tokio::test]
async fn test_decode_failure_reports_timeout() {
    let harness = harness_with_session().await;
    harness
        .sessions
        .request_play
        .respond(play_response(ResponseCode::Ok, 1, i64::MAX))
        .await;

    let err = harness.dispatcher().execute(play()).await.unwrap_err();

    assert!(matches!(err, CommandError::Outcome(_)));
    let reports = harness.outcomes.reports().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].exception, Some(OutcomeException::TimedOut));
    assert_eq!(harness.events.published_count().await, 0);
}

#[tokio::test]
async fn test_requires_session() {
    let harness = Harness::new();

    let err = harness.dispatcher().execute(play()).await.unwrap_err();

    assert!(matches!(err, CommandError::NoActiveSession));
    let reports = harness.outcomes.reports().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].transaction_id, 9001);
    assert_eq!(reports[0].exception, Some(OutcomeException::TimedOut));
    assert_eq!(harness.sessions.request_play.call_count().await, 0);
}

#[tokio::test]
async fn test_not_registered_reports_timeout() {
    let harness = harness_with_session().await;
    harness.instance.clear();

    let err = harness.dispatcher().execute(play()).await.unwrap_err();

    assert!(matches!(err, CommandError::NotRegistered));
    let reports = harness.outcomes.reports().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].exception, Some(OutcomeException::TimedOut));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_retry_delay_reports_timeout() {
    let mut config = crate::test_utils::fast_config();
    config.request_play_delay_ms = 10_000;
    let harness = Harness::with_config(config);
    harness.store.insert_session(Session::new(7, 500, 0)).await;
    harness
        .sessions
        .request_play
        .respond(play_response(ResponseCode::ServerError, 0, 0))
        .await;
    let dispatcher = harness.dispatcher();
    let (handle, signal) = cancel_pair();

    let (result, ()) = tokio::join!(dispatcher.execute_with_cancel(play(), &signal), async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.cancel();
    });

    assert!(matches!(result, Err(CommandError::Cancelled { .. })));
    assert_eq!(harness.sessions.request_play.call_count().await, 1);
    assert!(harness.store.vouchers().await.is_empty());
    let reports = harness.outcomes.reports().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].exception, Some(OutcomeException::TimedOut));
}
