//! Registration handshake through the public `Registrar` API.

use std::sync::Arc;

use uuid::Uuid;

use mgam::instance::ActiveInstance;
use mgam::protocol::messages::{AttributeScope, CommandResponse, RegisterInstanceResponse};
use mgam::protocol::ResponseCode;
use mgam::registration::{
    AttributeInfo, CommandInfo, DenominationInfo, FailureBehavior, GameInfo, NotificationInfo,
    Phase, ProgressiveInfo,
};
use mgam::storage::MemoryStore;
use mgam::test_utils::{fast_config, MockRegistrationService, RecordingTimeService};
use mgam::utils::cancel::CancelSignal;
use mgam::{Registrar, RegistrationError, RegistrationInfo};

fn terminal() -> RegistrationInfo {
    RegistrationInfo {
        device_guid: Uuid::new_v4(),
        device_name: "EGM-3".to_string(),
        manufacturer: "Acme Gaming".to_string(),
        application_guid: Uuid::new_v4(),
        application_name: "Lucky Reels".to_string(),
        attributes: vec![AttributeInfo {
            scope: AttributeScope::Site,
            name: "Locale".to_string(),
            value: "en-US".to_string(),
            allowed_values: Vec::new(),
            control_type: String::new(),
        }],
        commands: vec![CommandInfo {
            command_id: 1,
            description: "Lock".to_string(),
            parameter_name: String::new(),
            default_value: String::new(),
        }],
        actions: Vec::new(),
        notifications: vec![NotificationInfo {
            notification_id: 4,
            description: "Door open".to_string(),
            priority: 2,
        }],
        games: vec![GameInfo {
            game_upc_number: 500,
            game_description: "Lucky Reels".to_string(),
            paytable_id: "LR-92".to_string(),
            paytable_index: 1,
            max_wager_credits: 10,
        }],
        denominations: vec![DenominationInfo {
            game_upc_number: 500,
            denomination: 25,
        }],
        progressives: vec![ProgressiveInfo {
            progressive_name: "Grand".to_string(),
            pool_name: "Pool A".to_string(),
            signs: String::new(),
        }],
    }
}

struct Site {
    service: Arc<MockRegistrationService>,
    store: Arc<MemoryStore>,
    instance: Arc<ActiveInstance>,
    registrar: Registrar,
}

async fn site() -> Site {
    let service = Arc::new(MockRegistrationService::accepting(31).await);
    let store = Arc::new(MemoryStore::new());
    let instance = Arc::new(ActiveInstance::new());
    let registrar = Registrar::new(
        service.clone(),
        Arc::new(RecordingTimeService::default()),
        store.clone(),
        instance.clone(),
        &fast_config(),
    );
    Site {
        service,
        store,
        instance,
        registrar,
    }
}

#[tokio::test]
async fn test_phases_run_in_fixed_order() {
    let site = site().await;

    let registered = site
        .registrar
        .register(&terminal(), &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(registered.instance_id, 31);
    assert_eq!(
        site.service.calls().await,
        vec![
            "instance",
            "attribute",
            "command",
            "notification",
            "game",
            "denomination",
            "progressive",
        ]
    );
    assert_eq!(site.instance.instance_id(), Some(31));
    assert_eq!(site.store.host().await.map(|h| h.instance_id), Some(31));
}

#[tokio::test]
async fn test_failed_phase_stops_the_handshake() {
    let site = site().await;
    site.service
        .command
        .respond(CommandResponse::new(ResponseCode::ServerError))
        .await;
    site.service
        .command
        .respond(CommandResponse::new(ResponseCode::InvalidDeviceGuid))
        .await;

    let err = site
        .registrar
        .register(&terminal(), &CancelSignal::never())
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Commands));
    assert_eq!(err.behavior(), Some(FailureBehavior::Lock));
    let calls = site.service.calls().await;
    assert_eq!(calls.last(), Some(&"command"));
    assert!(!calls.contains(&"notification"));
    assert_eq!(site.instance.get(), None);
}

#[tokio::test]
async fn test_stale_registration_relocates() {
    let site = site().await;
    site.service
        .instance
        .respond(RegisterInstanceResponse {
            response_code: ResponseCode::DeviceStillRegisteredWithLauncherSvc,
            instance_id: 0,
            site_id: 0,
            device_id: 0,
            date_time: String::new(),
        })
        .await;

    let err = site
        .registrar
        .register(&terminal(), &CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RegistrationError::Failed {
            phase: Phase::Instance,
            behavior: FailureBehavior::Relocate,
            ..
        }
    ));
    assert_eq!(site.service.calls().await, vec!["instance"]);
    assert!(site.store.host().await.is_none());
}

#[tokio::test]
async fn test_lost_response_relocates() {
    let site = site().await;
    site.service.game.fail("timeout").await;

    let err = site
        .registrar
        .register(&terminal(), &CancelSignal::never())
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Games));
    assert_eq!(err.behavior(), Some(FailureBehavior::Relocate));
    assert!(!site.service.calls().await.contains(&"denomination"));
}

#[tokio::test]
async fn test_already_registered_items_advance() {
    let site = site().await;
    site.service
        .game
        .respond(CommandResponse::new(ResponseCode::GameAlreadyRegistered))
        .await;
    site.service
        .progressive
        .respond(CommandResponse::new(ResponseCode::ProgressiveAlreadyRegistered))
        .await;

    let registered = site
        .registrar
        .register(&terminal(), &CancelSignal::never())
        .await;

    assert!(registered.is_ok());
    assert_eq!(site.service.calls().await.len(), 7);
}
