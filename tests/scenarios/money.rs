//! Voucher credits and central-determination play.

use mgam::commands::{CreditVoucher, RequestPlay};
use mgam::interfaces::{NotificationCode, OutcomeType};
use mgam::protocol::ResponseCode;
use mgam::storage::Session;
use mgam::test_utils::{fast_config, play_response, Harness};
use mgam::{CommandError, CommandOutput};

fn play() -> RequestPlay {
    RequestPlay {
        cash_balance: 500,
        coupon_balance: 0,
        paytable_index: 1,
        credits: 4,
        denomination: 25,
        game_id: 12,
        transaction_id: 77,
    }
}

#[tokio::test]
async fn test_invalid_barcode_locks_and_notifies() {
    let harness = Harness::new();
    harness.store.insert_session(Session::new(7, 0, 0)).await;
    harness
        .currency
        .credit_voucher
        .respond(mgam::test_utils::credit_response(ResponseCode::InvalidBarcode, 0, 0))
        .await;

    let err = harness
        .dispatcher()
        .execute(CreditVoucher {
            barcode: "000111222333".to_string(),
            amount: 2_000,
        })
        .await
        .unwrap_err();

    assert_eq!(err.response_code(), Some(ResponseCode::InvalidBarcode));
    assert!(!err.is_force_disconnect());
    assert_eq!(harness.lockups.messages().await.len(), 1);
    assert_eq!(
        harness.notifications.notifications().await,
        vec![(
            NotificationCode::VoucherCreditFailed,
            "000111222333".to_string()
        )]
    );
    assert!(harness.registry.is_empty());
    assert!(harness.instance.get().is_some());
}

#[tokio::test]
async fn test_winning_play_forwards_one_standard_outcome() {
    let harness = Harness::new();
    harness.store.insert_session(Session::new(7, 500, 0)).await;
    harness
        .sessions
        .request_play
        .respond(play_response(ResponseCode::Ok, 3, 250))
        .await;

    let output = harness.dispatcher().execute(play()).await.unwrap();

    let CommandOutput::Played(result) = output else {
        panic!("unexpected output {output:?}");
    };
    assert!(!result.force_cash_out);

    let reports = harness.outcomes.reports().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcomes.len(), 1);
    assert_eq!(reports[0].outcomes[0].outcome_type, OutcomeType::Standard);
    assert_eq!(reports[0].outcomes[0].value, 250_000);
    assert_eq!(reports[0].outcomes[0].reference, 3);
    assert!(harness.store.vouchers().await.is_empty());
}

#[tokio::test]
async fn test_play_retries_at_most_once_whatever_the_config() {
    let mut config = fast_config();
    config.retry.retries = 5;
    let harness = Harness::with_config(config);
    harness.store.insert_session(Session::new(7, 500, 0)).await;
    harness
        .sessions
        .request_play
        .set_fallback(play_response(ResponseCode::ServerError, 0, 0))
        .await;

    let err = harness.dispatcher().execute(play()).await.unwrap_err();

    assert!(matches!(err, CommandError::Disconnected { .. }));
    assert_eq!(harness.sessions.request_play.call_count().await, 2);
}

#[tokio::test]
async fn test_rejected_play_writes_offline_voucher() {
    let harness = Harness::new();
    harness.store.insert_session(Session::new(7, 500, 0)).await;
    harness
        .sessions
        .request_play
        .respond(play_response(ResponseCode::InvalidPayTableIndex, 0, 0))
        .await;

    harness.dispatcher().execute(play()).await.unwrap_err();

    let vouchers = harness.store.vouchers().await;
    assert_eq!(vouchers.len(), 1);
    assert_eq!(vouchers[0].amount, 500);
    assert_eq!(harness.outcomes.reports().await.len(), 1);
}
