//! Idempotent retry registry.
//!
//! Holds every transactional command that was sent but not yet resolved by
//! the server, stamped with its local transaction id. After a reconnect the
//! dispatcher replays the surviving entries in registration order.
//!
//! An entry is only removed through [`PendingTransaction::remove`] with a
//! code its command kind declares terminal. Dropping a pending transaction
//! (handler finished without resolution, cancelled, or failed) keeps the
//! entry for the next replay.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::{Command, CommandKind};
use crate::protocol::{LocalTransactionId, ResponseCode, SessionId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{code} does not resolve {kind}")]
    NotTerminal {
        kind: CommandKind,
        code: ResponseCode,
    },
}

#[derive(Debug)]
struct Entry {
    command: Command,
    local_transaction_id: LocalTransactionId,
    session_id: Option<SessionId>,
    in_flight: bool,
}

#[derive(Debug)]
struct Inner {
    next_sequence: u64,
    next_id: u64,
    entries: BTreeMap<u64, Entry>,
}

impl Inner {
    fn allocate_id(&mut self) -> LocalTransactionId {
        let id = LocalTransactionId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Read-only view of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub sequence: u64,
    pub kind: CommandKind,
    pub local_transaction_id: LocalTransactionId,
    /// Session the command was issued against, when it targets one.
    pub session_id: Option<SessionId>,
    pub in_flight: bool,
}

/// Registry of unresolved transactional commands, shared through `Arc`.
#[derive(Debug)]
pub struct RetryRegistry {
    inner: Mutex<Inner>,
}

impl Default for RetryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryRegistry {
    pub fn new() -> Self {
        Self::with_first_id(1)
    }

    /// Start the local transaction id sequence at `first_id`.
    pub fn with_first_id(first_id: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_sequence: 0,
                next_id: first_id,
                entries: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Assign the next local transaction id and track `command` until it is
    /// resolved. The returned transaction is in flight.
    pub fn register(self: &Arc<Self>, command: &Command) -> PendingTransaction {
        self.track(command, None)
    }

    /// Like [`register`](Self::register), binding the entry to `session_id`
    /// so a replay acts on that session and no other.
    pub fn register_for_session(
        self: &Arc<Self>,
        command: &Command,
        session_id: SessionId,
    ) -> PendingTransaction {
        self.track(command, Some(session_id))
    }

    fn track(
        self: &Arc<Self>,
        command: &Command,
        session_id: Option<SessionId>,
    ) -> PendingTransaction {
        let mut inner = self.lock();
        let local_transaction_id = inner.allocate_id();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.entries.insert(
            sequence,
            Entry {
                command: command.clone(),
                local_transaction_id,
                session_id,
                in_flight: true,
            },
        );
        debug!(
            command = %command.kind(),
            sequence,
            %local_transaction_id,
            ?session_id,
            "Registered transaction"
        );

        PendingTransaction {
            registry: Arc::clone(self),
            sequence,
            command: command.clone(),
            local_transaction_id,
            session_id,
        }
    }

    /// A fresh local transaction id that is not tracked.
    pub fn next_local_transaction_id(&self) -> LocalTransactionId {
        self.lock().allocate_id()
    }

    /// Take every entry that is not in flight, in registration order, for
    /// replay. Each returned transaction is marked in flight until dropped.
    pub fn checkout_pending(self: &Arc<Self>) -> Vec<PendingTransaction> {
        let mut inner = self.lock();
        inner
            .entries
            .iter_mut()
            .filter(|(_, entry)| !entry.in_flight)
            .map(|(sequence, entry)| {
                entry.in_flight = true;
                PendingTransaction {
                    registry: Arc::clone(self),
                    sequence: *sequence,
                    command: entry.command.clone(),
                    local_transaction_id: entry.local_transaction_id,
                    session_id: entry.session_id,
                }
            })
            .collect()
    }

    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.lock()
            .entries
            .iter()
            .map(|(sequence, entry)| RegistryEntry {
                sequence: *sequence,
                kind: entry.command.kind(),
                local_transaction_id: entry.local_transaction_id,
                session_id: entry.session_id,
                in_flight: entry.in_flight,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A registered command owned by the handler currently executing it.
#[derive(Debug)]
pub struct PendingTransaction {
    registry: Arc<RetryRegistry>,
    sequence: u64,
    command: Command,
    local_transaction_id: LocalTransactionId,
    session_id: Option<SessionId>,
}

impl PendingTransaction {
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn kind(&self) -> CommandKind {
        self.command.kind()
    }

    pub fn local_transaction_id(&self) -> LocalTransactionId {
        self.local_transaction_id
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    /// Assign a new, strictly greater local transaction id. The entry keeps
    /// its place in the replay order.
    pub fn rotate_local_transaction_id(&mut self) -> LocalTransactionId {
        let mut inner = self.registry.lock();
        let id = inner.allocate_id();
        if let Some(entry) = inner.entries.get_mut(&self.sequence) {
            entry.local_transaction_id = id;
        }
        info!(
            command = %self.command.kind(),
            previous = %self.local_transaction_id,
            local_transaction_id = %id,
            "Rotated local transaction id"
        );
        self.local_transaction_id = id;
        id
    }

    /// Remove the entry because the server resolved it with `code`.
    ///
    /// Fails, keeping the entry, when `code` is not terminal for the kind.
    pub fn remove(self, code: ResponseCode) -> Result<(), RegistryError> {
        let kind = self.kind();
        if !kind.is_terminal(code) {
            warn!(command = %kind, %code, "Refusing to remove unresolved transaction");
            return Err(RegistryError::NotTerminal { kind, code });
        }
        self.registry.lock().entries.remove(&self.sequence);
        debug!(
            command = %kind,
            %code,
            local_transaction_id = %self.local_transaction_id,
            "Removed resolved transaction"
        );
        Ok(())
    }

    /// Remove the entry when `code` resolves it, otherwise keep it for
    /// resend. Returns whether it was removed.
    pub fn settle(self, code: ResponseCode) -> bool {
        if self.kind().is_terminal(code) {
            self.remove(code).is_ok()
        } else {
            debug!(
                command = %self.kind(),
                %code,
                "Transaction kept for resend"
            );
            false
        }
    }
}

impl Drop for PendingTransaction {
    fn drop(&mut self) {
        if let Some(entry) = self.registry.lock().entries.get_mut(&self.sequence) {
            entry.in_flight = false;
        }
    }
}
