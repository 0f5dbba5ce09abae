//! In-memory store.
//!
//! A unit of work owns the store lock from `begin` until it is committed or
//! dropped, so units of work never interleave. Writes go to a staged copy of
//! the tables that replaces the shared tables on commit.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use super::{
    HostIdentity, HostRepository, Result, Session, SessionRepository, StorageError, UnitOfWork,
    UnitOfWorkFactory, Voucher, VoucherRepository,
};
use crate::protocol::SessionId;

#[derive(Debug, Clone, Default)]
struct SessionTable(Vec<Session>);

#[derive(Debug, Clone, Default)]
struct VoucherTable(Vec<Voucher>);

#[derive(Debug, Clone, Default)]
struct HostTable(Option<HostIdentity>);

#[derive(Debug, Clone, Default)]
struct Tables {
    sessions: SessionTable,
    vouchers: VoucherTable,
    hosts: HostTable,
}

/// Store backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_on_begin: Arc<RwLock<bool>>,
    fail_on_commit: Arc<RwLock<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_begin(&self, fail: bool) {
        *self.fail_on_begin.write().await = fail;
    }

    pub async fn set_fail_on_commit(&self, fail: bool) {
        *self.fail_on_commit.write().await = fail;
    }

    /// Committed session rows.
    pub async fn sessions(&self) -> Vec<Session> {
        self.tables.lock().await.sessions.0.clone()
    }

    /// Committed voucher rows, oldest first.
    pub async fn vouchers(&self) -> Vec<Voucher> {
        self.tables.lock().await.vouchers.0.clone()
    }

    pub async fn host(&self) -> Option<HostIdentity> {
        self.tables.lock().await.hosts.0.clone()
    }

    /// Seed a committed session row.
    pub async fn insert_session(&self, session: Session) {
        let mut tables = self.tables.lock().await;
        tables.sessions.upsert(session);
    }
}

#[async_trait]
impl UnitOfWorkFactory for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        if *self.fail_on_begin.read().await {
            return Err(StorageError::Unavailable("Mock begin failure".to_string()));
        }
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            staged,
            fail_on_commit: self.fail_on_commit.clone(),
        }))
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    fail_on_commit: Arc<RwLock<bool>>,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    fn sessions(&mut self) -> &mut dyn SessionRepository {
        &mut self.staged.sessions
    }

    fn vouchers(&mut self) -> &mut dyn VoucherRepository {
        &mut self.staged.vouchers
    }

    fn hosts(&mut self) -> &mut dyn HostRepository {
        &mut self.staged.hosts
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if *self.fail_on_commit.read().await {
            return Err(StorageError::CommitFailed("Mock commit failure".to_string()));
        }
        let MemoryUnitOfWork {
            mut guard, staged, ..
        } = *self;
        debug!(
            sessions = staged.sessions.0.len(),
            vouchers = staged.vouchers.0.len(),
            "Committed unit of work"
        );
        *guard = staged;
        Ok(())
    }
}

impl SessionTable {
    fn upsert(&mut self, session: Session) {
        match self
            .0
            .iter_mut()
            .find(|row| row.server_session_id == session.server_session_id)
        {
            Some(row) => *row = session,
            None => self.0.push(session),
        }
    }
}

#[async_trait]
impl SessionRepository for SessionTable {
    async fn single(&self) -> Result<Option<Session>> {
        Ok(self.0.first().cloned())
    }

    async fn all(&self) -> Result<Vec<Session>> {
        Ok(self.0.clone())
    }

    async fn add_or_update(&mut self, session: Session) -> Result<()> {
        self.upsert(session);
        Ok(())
    }

    async fn delete(&mut self, session_id: SessionId) -> Result<bool> {
        let before = self.0.len();
        self.0.retain(|row| row.server_session_id != session_id);
        Ok(self.0.len() != before)
    }
}

#[async_trait]
impl VoucherRepository for VoucherTable {
    async fn add(&mut self, voucher: Voucher) -> Result<()> {
        if let Some(barcode) = &voucher.barcode {
            if self.0.iter().any(|row| row.barcode.as_ref() == Some(barcode)) {
                return Err(StorageError::DuplicateVoucher(barcode.clone()));
            }
        }
        self.0.push(voucher);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Voucher>> {
        Ok(self.0.clone())
    }
}

#[async_trait]
impl HostRepository for HostTable {
    async fn single(&self) -> Result<Option<HostIdentity>> {
        Ok(self.0.clone())
    }

    async fn add_or_update(&mut self, host: HostIdentity) -> Result<()> {
        self.0 = Some(host);
        Ok(())
    }
}
