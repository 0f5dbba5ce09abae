//! Registration handshake.
//!
//! Phases run in a fixed order, each item a full round trip under the
//! standard retry policy before the next is sent:
//!
//! Instance → Attributes → Commands → Actions → Notifications → Games →
//! Denominations → Progressives
//!
//! Every phase resolves to a [`RegistrationOutcome`]. The first outcome that
//! is not `Advance` ends the handshake with a [`RegistrationError`] tagged
//! with its escalation behavior; later phases are never sent.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ProtocolConfig;
use crate::instance::{ActiveInstance, InstanceInfo};
use crate::interfaces::{RegistrationService, StorageError, TimeService, UnitOfWorkFactory};
use crate::protocol::messages::{
    AttributeScope, RegisterActionMessage, RegisterAttributeMessage, RegisterCommandMessage,
    RegisterDenominationMessage, RegisterGameMessage, RegisterInstanceMessage,
    RegisterInstanceResponse, RegisterNotificationMessage, RegisterProgressiveMessage,
};
use crate::protocol::{Cents, Exchange, HasResponseCode, InstanceId, ResponseCode};
use crate::storage::HostIdentity;
use crate::utils::cancel::CancelSignal;
use crate::utils::retry::RetryPolicy;

/// Attribute confirming the terminal's identity; sent after every other
/// attribute is registered.
pub const KNOWN_REGISTRATION_ATTRIBUTE: &str = "KnownRegistration";

/// Server timestamp format without an offset, read as UTC.
const NAIVE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Instance,
    Attributes,
    Commands,
    Actions,
    Notifications,
    Games,
    Denominations,
    Progressives,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::Instance,
        Phase::Attributes,
        Phase::Commands,
        Phase::Actions,
        Phase::Notifications,
        Phase::Games,
        Phase::Denominations,
        Phase::Progressives,
    ];

    /// Code meaning the item is already known to the server.
    pub fn already_registered_code(self) -> ResponseCode {
        match self {
            Phase::Instance => ResponseCode::InstanceAlreadyRegistered,
            Phase::Attributes => ResponseCode::AttributeAlreadyRegistered,
            Phase::Commands => ResponseCode::CommandAlreadyRegistered,
            Phase::Actions => ResponseCode::ActionAlreadyRegistered,
            Phase::Notifications => ResponseCode::NotificationAlreadyRegistered,
            Phase::Games => ResponseCode::GameAlreadyRegistered,
            Phase::Denominations => ResponseCode::DenominationAlreadyRegistered,
            Phase::Progressives => ResponseCode::ProgressiveAlreadyRegistered,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How the caller recovers from a failed handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureBehavior {
    /// Abandon this site controller and register elsewhere.
    Relocate,
    /// Disable the terminal until an attendant intervenes.
    Lock,
}

impl fmt::Display for FailureBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Advance,
    Relocate(String),
    Lock(String),
}

impl RegistrationOutcome {
    /// Outcome of one registration round trip.
    pub fn of<R: HasResponseCode>(phase: Phase, exchange: &Exchange<R>) -> Self {
        let response = match exchange {
            Ok(response) => response,
            Err(e) => return RegistrationOutcome::Relocate(e.to_string()),
        };

        match response.response_code() {
            ResponseCode::Ok => RegistrationOutcome::Advance,
            code if code == phase.already_registered_code() => RegistrationOutcome::Advance,
            code @ (ResponseCode::InvalidInstanceId
            | ResponseCode::DeviceStillRegisteredWithVltSvc
            | ResponseCode::DeviceStillRegisteredWithLauncherSvc
            | ResponseCode::VltServiceNotRegistered) => {
                RegistrationOutcome::Relocate(code.to_string())
            }
            code => RegistrationOutcome::Lock(code.to_string()),
        }
    }

    fn into_result(self, phase: Phase) -> Result<(), RegistrationError> {
        match self {
            RegistrationOutcome::Advance => Ok(()),
            RegistrationOutcome::Relocate(reason) => {
                Err(failure(phase, FailureBehavior::Relocate, reason))
            }
            RegistrationOutcome::Lock(reason) => Err(failure(phase, FailureBehavior::Lock, reason)),
        }
    }
}

fn failure(phase: Phase, behavior: FailureBehavior, reason: impl Into<String>) -> RegistrationError {
    RegistrationError::Failed {
        phase,
        behavior,
        reason: reason.into(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("{phase} registration failed ({behavior}): {reason}")]
    Failed {
        phase: Phase,
        behavior: FailureBehavior,
        reason: String,
    },

    #[error("Registration already in progress")]
    InProgress,

    #[error("Registration cancelled during {phase}")]
    Cancelled { phase: Phase },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl RegistrationError {
    pub fn behavior(&self) -> Option<FailureBehavior> {
        match self {
            RegistrationError::Failed { behavior, .. } => Some(*behavior),
            _ => None,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            RegistrationError::Failed { phase, .. } | RegistrationError::Cancelled { phase } => {
                Some(*phase)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub scope: AttributeScope,
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub allowed_values: Vec<String>,
    #[serde(default)]
    pub control_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub command_id: i32,
    pub description: String,
    #[serde(default)]
    pub parameter_name: String,
    #[serde(default)]
    pub default_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionInfo {
    pub action_guid: Uuid,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationInfo {
    pub notification_id: i32,
    pub description: String,
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    pub game_upc_number: i32,
    pub game_description: String,
    pub paytable_id: String,
    pub paytable_index: i32,
    pub max_wager_credits: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenominationInfo {
    pub game_upc_number: i32,
    pub denomination: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressiveInfo {
    pub progressive_name: String,
    pub pool_name: String,
    #[serde(default)]
    pub signs: String,
}

/// Identity and capabilities sent during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationInfo {
    pub device_guid: Uuid,
    pub device_name: String,
    pub manufacturer: String,
    pub application_guid: Uuid,
    pub application_name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeInfo>,
    #[serde(default)]
    pub commands: Vec<CommandInfo>,
    #[serde(default)]
    pub actions: Vec<ActionInfo>,
    #[serde(default)]
    pub notifications: Vec<NotificationInfo>,
    #[serde(default)]
    pub games: Vec<GameInfo>,
    #[serde(default)]
    pub denominations: Vec<DenominationInfo>,
    #[serde(default)]
    pub progressives: Vec<ProgressiveInfo>,
}

/// Parse a server timestamp: RFC 3339, or an offset-less time read as UTC.
pub fn parse_server_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, NAIVE_TIME_FORMAT)
                .ok()
                .map(|time| time.and_utc())
        })
}

/// Runs the registration handshake.
///
/// Not reentrant: a second call while one is running fails with
/// [`RegistrationError::InProgress`].
pub struct Registrar {
    service: Arc<dyn RegistrationService>,
    time: Arc<dyn TimeService>,
    store: Arc<dyn UnitOfWorkFactory>,
    instance: Arc<ActiveInstance>,
    policy: RetryPolicy,
    running: Mutex<()>,
}

impl Registrar {
    pub fn new(
        service: Arc<dyn RegistrationService>,
        time: Arc<dyn TimeService>,
        store: Arc<dyn UnitOfWorkFactory>,
        instance: Arc<ActiveInstance>,
        config: &ProtocolConfig,
    ) -> Self {
        Self {
            service,
            time,
            store,
            instance,
            policy: RetryPolicy::standard(&config.retry),
            running: Mutex::new(()),
        }
    }

    /// Register `info` with the site controller.
    ///
    /// On success the active instance is set; on failure it is cleared.
    pub async fn register(
        &self,
        info: &RegistrationInfo,
        cancel: &CancelSignal,
    ) -> Result<InstanceInfo, RegistrationError> {
        let Ok(_running) = self.running.try_lock() else {
            warn!("Registration requested while one is in progress");
            return Err(RegistrationError::InProgress);
        };

        match self.run_phases(info, cancel).await {
            Ok(instance) => {
                info!(instance_id = instance.instance_id, "Registration complete");
                Ok(instance)
            }
            Err(e) => {
                self.instance.clear();
                warn!(error = %e, behavior = ?e.behavior(), "Registration failed");
                Err(e)
            }
        }
    }

    async fn run_phases(
        &self,
        info: &RegistrationInfo,
        cancel: &CancelSignal,
    ) -> Result<InstanceInfo, RegistrationError> {
        let instance = self.register_instance(info, cancel).await?;
        let instance_id = instance.instance_id;
        let service = &self.service;

        self.register_items(Phase::Attributes, attribute_messages(instance_id, info), cancel, |m| {
            service.register_attribute(m)
        })
        .await?;

        let commands = info.commands.iter().map(|c| RegisterCommandMessage {
            instance_id,
            command_id: c.command_id,
            description: c.description.clone(),
            parameter_name: c.parameter_name.clone(),
            default_value: c.default_value.clone(),
        });
        self.register_items(Phase::Commands, commands, cancel, |m| {
            service.register_command(m)
        })
        .await?;

        let actions = info.actions.iter().map(|a| RegisterActionMessage {
            instance_id,
            action_guid: a.action_guid,
            name: a.name.clone(),
            description: a.description.clone(),
        });
        self.register_items(Phase::Actions, actions, cancel, |m| service.register_action(m))
            .await?;

        let notifications = info.notifications.iter().map(|n| RegisterNotificationMessage {
            instance_id,
            notification_id: n.notification_id,
            description: n.description.clone(),
            priority: n.priority,
        });
        self.register_items(Phase::Notifications, notifications, cancel, |m| {
            service.register_notification(m)
        })
        .await?;

        if info.games.is_empty() {
            return Err(failure(Phase::Games, FailureBehavior::Lock, "no games configured"));
        }
        let games = info.games.iter().map(|g| RegisterGameMessage {
            instance_id,
            game_upc_number: g.game_upc_number,
            game_description: g.game_description.clone(),
            paytable_id: g.paytable_id.clone(),
            paytable_index: g.paytable_index,
            max_wager_credits: g.max_wager_credits,
        });
        self.register_items(Phase::Games, games, cancel, |m| service.register_game(m))
            .await?;

        if info.denominations.is_empty() {
            return Err(failure(
                Phase::Denominations,
                FailureBehavior::Lock,
                "no denominations configured",
            ));
        }
        let denominations = info.denominations.iter().map(|d| RegisterDenominationMessage {
            instance_id,
            game_upc_number: d.game_upc_number,
            denomination: d.denomination,
        });
        self.register_items(Phase::Denominations, denominations, cancel, |m| {
            service.register_denomination(m)
        })
        .await?;

        let progressives = info.progressives.iter().map(|p| RegisterProgressiveMessage {
            instance_id,
            progressive_name: p.progressive_name.clone(),
            pool_name: p.pool_name.clone(),
            signs: p.signs.clone(),
        });
        self.register_items(Phase::Progressives, progressives, cancel, |m| {
            service.register_progressive(m)
        })
        .await?;

        Ok(instance)
    }

    async fn register_instance(
        &self,
        info: &RegistrationInfo,
        cancel: &CancelSignal,
    ) -> Result<InstanceInfo, RegistrationError> {
        let phase = Phase::Instance;
        let message = RegisterInstanceMessage {
            device_guid: info.device_guid,
            device_name: info.device_name.clone(),
            manufacturer_name: info.manufacturer.clone(),
            application_guid: info.application_guid,
            application_name: info.application_name.clone(),
        };
        let service = &self.service;
        let exchange = self
            .policy
            .run(cancel, |_| service.register_instance(message.clone()))
            .await
            .map_err(|_| RegistrationError::Cancelled { phase })?;

        RegistrationOutcome::of(phase, &exchange).into_result(phase)?;
        let response: RegisterInstanceResponse =
            exchange.map_err(|e| failure(phase, FailureBehavior::Relocate, e.to_string()))?;

        let server_time = parse_server_time(&response.date_time).ok_or_else(|| {
            failure(
                phase,
                FailureBehavior::Relocate,
                format!("invalid server time {:?}", response.date_time),
            )
        })?;
        self.time.update(server_time);

        let instance = InstanceInfo {
            instance_id: response.instance_id,
            site_id: response.site_id,
            device_id: response.device_id,
        };
        self.instance.set(instance);

        let mut uow = self.store.begin().await?;
        uow.hosts()
            .add_or_update(HostIdentity {
                instance_id: instance.instance_id,
                site_id: instance.site_id,
                device_id: instance.device_id,
                registered_at: server_time,
            })
            .await?;
        uow.commit().await?;

        debug!(%phase, instance_id = instance.instance_id, %server_time, "Phase registered");
        Ok(instance)
    }

    async fn register_items<M, R, F, Fut>(
        &self,
        phase: Phase,
        messages: impl IntoIterator<Item = M>,
        cancel: &CancelSignal,
        send: F,
    ) -> Result<(), RegistrationError>
    where
        M: Clone,
        R: HasResponseCode,
        F: Fn(M) -> Fut,
        Fut: Future<Output = Exchange<R>>,
    {
        let mut count = 0usize;
        for message in messages {
            let exchange = self
                .policy
                .run(cancel, |_| send(message.clone()))
                .await
                .map_err(|_| RegistrationError::Cancelled { phase })?;
            RegistrationOutcome::of(phase, &exchange).into_result(phase)?;
            count += 1;
        }
        debug!(%phase, count, "Phase registered");
        Ok(())
    }
}

/// Attribute messages with the known-registration attribute last.
fn attribute_messages(
    instance_id: InstanceId,
    info: &RegistrationInfo,
) -> Vec<RegisterAttributeMessage> {
    let (known, rest): (Vec<_>, Vec<_>) = info
        .attributes
        .iter()
        .partition(|attribute| attribute.name == KNOWN_REGISTRATION_ATTRIBUTE);

    rest.into_iter()
        .chain(known)
        .map(|attribute| RegisterAttributeMessage {
            instance_id,
            scope: attribute.scope,
            name: attribute.name.clone(),
            value: attribute.value.clone(),
            allowed_values: attribute.allowed_values.clone(),
            control_type: attribute.control_type.clone(),
        })
        .collect()
}
