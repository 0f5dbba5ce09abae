//! Test utilities and mock implementations.
//!
//! Scripted transports answer each request with the next queued reply and
//! record the request; an empty queue answers with the fallback response if
//! one is set, otherwise with a transport failure. Recording services keep
//! every lockup, notification, outcome report and clock update.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::bus::MockEventBus;
use crate::commands::{CommandContext, CommandDispatcher, RetryRegistry};
use crate::config::{ProtocolConfig, RetryConfig};
use crate::instance::{ActiveInstance, InstanceInfo};
use crate::interfaces::{
    CurrencyService, LockupPriority, LockupService, NotificationCode, NotificationService,
    Outcome, OutcomeException, OutcomeProvider, RegistrationService, SessionService, TimeService,
};
use crate::protocol::messages::*;
use crate::protocol::{Exchange, ResponseCode, TransportError};
use crate::storage::MemoryStore;

/// Queued replies for one request type.
pub struct Scripted<M, R> {
    replies: Mutex<VecDeque<Exchange<R>>>,
    fallback: Mutex<Option<R>>,
    requests: Mutex<Vec<M>>,
}

impl<M, R> Default for Scripted<M, R> {
    fn default() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl<M: Clone, R: Clone> Scripted<M, R> {
    pub async fn push(&self, reply: Exchange<R>) {
        self.replies.lock().await.push_back(reply);
    }

    pub async fn respond(&self, response: R) {
        self.push(Ok(response)).await;
    }

    pub async fn fail(&self, detail: &str) {
        self.push(Err(TransportError(detail.to_string()))).await;
    }

    /// Answer with `response` once the queue is empty.
    pub async fn set_fallback(&self, response: R) {
        *self.fallback.lock().await = Some(response);
    }

    pub async fn requests(&self) -> Vec<M> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    async fn answer(&self, request: M) -> Exchange<R> {
        self.requests.lock().await.push(request);
        if let Some(reply) = self.replies.lock().await.pop_front() {
            return reply;
        }
        match self.fallback.lock().await.clone() {
            Some(response) => Ok(response),
            None => Err(TransportError("no scripted response".to_string())),
        }
    }
}

pub fn begin_session_response(
    code: ResponseCode,
    session_id: i32,
    cash_balance: i64,
    coupon_balance: i64,
) -> BeginSessionResponse {
    BeginSessionResponse {
        response_code: code,
        session_id,
        cash_balance,
        coupon_balance,
    }
}

pub fn end_session_response(code: ResponseCode, barcode: &str, cash: i64) -> EndSessionResponse {
    EndSessionResponse {
        response_code: code,
        voucher_barcode: barcode.to_string(),
        cash_balance: cash,
        coupon_balance: 0,
    }
}

pub fn credit_response(code: ResponseCode, cash: i64, coupon: i64) -> CreditResponse {
    CreditResponse {
        response_code: code,
        cash_balance: cash,
        coupon_balance: coupon,
    }
}

pub fn play_response(code: ResponseCode, prize_index: i32, prize_value: i64) -> RequestPlayResponse {
    RequestPlayResponse {
        response_code: code,
        prize_index,
        prize_value,
        progressive_win: false,
        progressive_win_value: 0,
        cash_balance: 0,
        coupon_balance: 0,
    }
}

/// Scripted session transport.
#[derive(Default)]
pub struct MockSessionService {
    pub begin_session: Scripted<BeginSessionMessage, BeginSessionResponse>,
    pub begin_session_with_session_id:
        Scripted<BeginSessionWithSessionIdMessage, BeginSessionResponse>,
    pub end_session: Scripted<EndSessionMessage, EndSessionResponse>,
    pub request_play: Scripted<RequestPlayMessage, RequestPlayResponse>,
}

#[async_trait]
impl SessionService for MockSessionService {
    async fn begin_session(&self, message: BeginSessionMessage) -> Exchange<BeginSessionResponse> {
        self.begin_session.answer(message).await
    }

    async fn begin_session_with_session_id(
        &self,
        message: BeginSessionWithSessionIdMessage,
    ) -> Exchange<BeginSessionResponse> {
        self.begin_session_with_session_id.answer(message).await
    }

    async fn end_session(&self, message: EndSessionMessage) -> Exchange<EndSessionResponse> {
        self.end_session.answer(message).await
    }

    async fn request_play(&self, message: RequestPlayMessage) -> Exchange<RequestPlayResponse> {
        self.request_play.answer(message).await
    }
}

/// Scripted currency transport.
#[derive(Default)]
pub struct MockCurrencyService {
    pub credit_cash: Scripted<CreditCashMessage, CreditResponse>,
    pub credit_voucher: Scripted<CreditVoucherMessage, CreditResponse>,
    pub escrow_cash: Scripted<EscrowCashMessage, CommandResponse>,
    pub validate_voucher: Scripted<ValidateVoucherMessage, ValidateVoucherResponse>,
    pub voucher_printed: Scripted<VoucherPrintedMessage, CommandResponse>,
}

#[async_trait]
impl CurrencyService for MockCurrencyService {
    async fn credit_cash(&self, message: CreditCashMessage) -> Exchange<CreditResponse> {
        self.credit_cash.answer(message).await
    }

    async fn credit_voucher(&self, message: CreditVoucherMessage) -> Exchange<CreditResponse> {
        self.credit_voucher.answer(message).await
    }

    async fn escrow_cash(&self, message: EscrowCashMessage) -> Exchange<CommandResponse> {
        self.escrow_cash.answer(message).await
    }

    async fn validate_voucher(
        &self,
        message: ValidateVoucherMessage,
    ) -> Exchange<ValidateVoucherResponse> {
        self.validate_voucher.answer(message).await
    }

    async fn voucher_printed(&self, message: VoucherPrintedMessage) -> Exchange<CommandResponse> {
        self.voucher_printed.answer(message).await
    }
}

/// Scripted registration transport that also records the order of calls.
#[derive(Default)]
pub struct MockRegistrationService {
    pub instance: Scripted<RegisterInstanceMessage, RegisterInstanceResponse>,
    pub attribute: Scripted<RegisterAttributeMessage, CommandResponse>,
    pub command: Scripted<RegisterCommandMessage, CommandResponse>,
    pub action: Scripted<RegisterActionMessage, CommandResponse>,
    pub notification: Scripted<RegisterNotificationMessage, CommandResponse>,
    pub game: Scripted<RegisterGameMessage, CommandResponse>,
    pub denomination: Scripted<RegisterDenominationMessage, CommandResponse>,
    pub progressive: Scripted<RegisterProgressiveMessage, CommandResponse>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockRegistrationService {
    /// A service that accepts every registration message.
    pub async fn accepting(instance_id: i32) -> Self {
        let service = Self::default();
        service
            .instance
            .set_fallback(RegisterInstanceResponse {
                response_code: ResponseCode::Ok,
                instance_id,
                site_id: 10,
                device_id: 20,
                date_time: "2024-03-01T12:30:00Z".to_string(),
            })
            .await;
        let ok = CommandResponse::new(ResponseCode::Ok);
        service.attribute.set_fallback(ok.clone()).await;
        service.command.set_fallback(ok.clone()).await;
        service.action.set_fallback(ok.clone()).await;
        service.notification.set_fallback(ok.clone()).await;
        service.game.set_fallback(ok.clone()).await;
        service.denomination.set_fallback(ok.clone()).await;
        service.progressive.set_fallback(ok).await;
        service
    }

    /// Message kinds in the order they were sent.
    pub async fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: &'static str) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl RegistrationService for MockRegistrationService {
    async fn register_instance(
        &self,
        message: RegisterInstanceMessage,
    ) -> Exchange<RegisterInstanceResponse> {
        self.record("instance").await;
        self.instance.answer(message).await
    }

    async fn register_attribute(
        &self,
        message: RegisterAttributeMessage,
    ) -> Exchange<CommandResponse> {
        self.record("attribute").await;
        self.attribute.answer(message).await
    }

    async fn register_command(&self, message: RegisterCommandMessage) -> Exchange<CommandResponse> {
        self.record("command").await;
        self.command.answer(message).await
    }

    async fn register_action(&self, message: RegisterActionMessage) -> Exchange<CommandResponse> {
        self.record("action").await;
        self.action.answer(message).await
    }

    async fn register_notification(
        &self,
        message: RegisterNotificationMessage,
    ) -> Exchange<CommandResponse> {
        self.record("notification").await;
        self.notification.answer(message).await
    }

    async fn register_game(&self, message: RegisterGameMessage) -> Exchange<CommandResponse> {
        self.record("game").await;
        self.game.answer(message).await
    }

    async fn register_denomination(
        &self,
        message: RegisterDenominationMessage,
    ) -> Exchange<CommandResponse> {
        self.record("denomination").await;
        self.denomination.answer(message).await
    }

    async fn register_progressive(
        &self,
        message: RegisterProgressiveMessage,
    ) -> Exchange<CommandResponse> {
        self.record("progressive").await;
        self.progressive.answer(message).await
    }
}

/// Records employee-card lockups.
#[derive(Default)]
pub struct RecordingLockupService {
    lockups: Mutex<Vec<(String, LockupPriority)>>,
}

impl RecordingLockupService {
    pub async fn messages(&self) -> Vec<String> {
        self.lockups
            .lock()
            .await
            .iter()
            .map(|(message, _)| message.clone())
            .collect()
    }

    pub async fn lockups(&self) -> Vec<(String, LockupPriority)> {
        self.lockups.lock().await.clone()
    }
}

#[async_trait]
impl LockupService for RecordingLockupService {
    async fn lockup_for_employee_card(&self, message: String, priority: LockupPriority) {
        self.lockups.lock().await.push((message, priority));
    }
}

/// Records notifications.
#[derive(Default)]
pub struct RecordingNotificationService {
    notifications: Mutex<Vec<(NotificationCode, String)>>,
}

impl RecordingNotificationService {
    pub async fn notifications(&self) -> Vec<(NotificationCode, String)> {
        self.notifications.lock().await.clone()
    }
}

#[async_trait]
impl NotificationService for RecordingNotificationService {
    async fn notify(&self, code: NotificationCode, payload: String) {
        self.notifications.lock().await.push((code, payload));
    }
}

/// One report to the outcome provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeReport {
    pub transaction_id: i64,
    pub outcomes: Vec<Outcome>,
    pub exception: Option<OutcomeException>,
}

/// Records outcome reports.
#[derive(Default)]
pub struct RecordingOutcomeProvider {
    reports: Mutex<Vec<OutcomeReport>>,
}

impl RecordingOutcomeProvider {
    pub async fn reports(&self) -> Vec<OutcomeReport> {
        self.reports.lock().await.clone()
    }
}

#[async_trait]
impl OutcomeProvider for RecordingOutcomeProvider {
    async fn outcome_response(
        &self,
        transaction_id: i64,
        outcomes: Vec<Outcome>,
        exception: Option<OutcomeException>,
    ) {
        self.reports.lock().await.push(OutcomeReport {
            transaction_id,
            outcomes,
            exception,
        });
    }
}

/// Records clock updates.
#[derive(Default)]
pub struct RecordingTimeService {
    updates: StdMutex<Vec<DateTime<Utc>>>,
}

impl RecordingTimeService {
    pub fn updates(&self) -> Vec<DateTime<Utc>> {
        self.updates
            .lock()
            .map(|updates| updates.clone())
            .unwrap_or_default()
    }
}

impl TimeService for RecordingTimeService {
    fn update(&self, time: DateTime<Utc>) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(time);
        }
    }
}

/// Instance id the harness registers.
pub const TEST_INSTANCE_ID: i32 = 42;

/// Configuration with zero retry delays.
pub fn fast_config() -> ProtocolConfig {
    ProtocolConfig {
        retry: RetryConfig {
            retries: 2,
            delay_ms: 0,
        },
        duplicate_voucher_retries: 2,
        request_play_delay_ms: 0,
        ..ProtocolConfig::default()
    }
}

/// Every command-layer collaborator, backed by mocks.
pub struct Harness {
    pub sessions: Arc<MockSessionService>,
    pub currency: Arc<MockCurrencyService>,
    pub store: Arc<MemoryStore>,
    pub events: Arc<MockEventBus>,
    pub lockups: Arc<RecordingLockupService>,
    pub notifications: Arc<RecordingNotificationService>,
    pub outcomes: Arc<RecordingOutcomeProvider>,
    pub instance: Arc<ActiveInstance>,
    pub registry: Arc<RetryRegistry>,
    pub context: CommandContext,
}

impl Harness {
    /// Harness with a registered instance and [`fast_config`].
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: ProtocolConfig) -> Self {
        let sessions = Arc::new(MockSessionService::default());
        let currency = Arc::new(MockCurrencyService::default());
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(MockEventBus::new());
        let lockups = Arc::new(RecordingLockupService::default());
        let notifications = Arc::new(RecordingNotificationService::default());
        let outcomes = Arc::new(RecordingOutcomeProvider::default());
        let instance = Arc::new(ActiveInstance::new());
        let registry = Arc::new(RetryRegistry::new());

        let context = CommandContext {
            config,
            registry: registry.clone(),
            store: store.clone(),
            instance: instance.clone(),
            sessions: sessions.clone(),
            currency: currency.clone(),
            events: events.clone(),
            lockups: lockups.clone(),
            notifications: notifications.clone(),
            outcomes: outcomes.clone(),
        };

        let harness = Self {
            sessions,
            currency,
            store,
            events,
            lockups,
            notifications,
            outcomes,
            instance,
            registry,
            context,
        };
        harness.reconnect();
        harness
    }

    /// Register the test instance again, as after a reconnect.
    pub fn reconnect(&self) {
        self.instance.set(InstanceInfo {
            instance_id: TEST_INSTANCE_ID,
            site_id: 1,
            device_id: 2,
        });
    }

    pub fn dispatcher(&self) -> CommandDispatcher {
        CommandDispatcher::new(self.context.clone())
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
