//! Durable storage interface.
//!
//! All reads and writes happen inside a unit of work. Writes are staged and
//! become visible only on `commit`; dropping a unit of work discards them.
//! Implementations serialize units of work against each other.

use async_trait::async_trait;

use crate::protocol::SessionId;
use crate::storage::{HostIdentity, Session, Voucher};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Duplicate voucher barcode: {0}")]
    DuplicateVoucher(String),
}

/// Opens units of work.
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

/// A local transaction over the typed repositories.
#[async_trait]
pub trait UnitOfWork: Send {
    fn sessions(&mut self) -> &mut dyn SessionRepository;

    fn vouchers(&mut self) -> &mut dyn VoucherRepository;

    fn hosts(&mut self) -> &mut dyn HostRepository;

    /// Make every staged write durable at once.
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Persisted session rows.
///
/// Storage does not limit the number of rows; the session handlers keep it
/// at one.
#[async_trait]
pub trait SessionRepository: Send {
    /// The session row, if any.
    async fn single(&self) -> Result<Option<Session>>;

    async fn all(&self) -> Result<Vec<Session>>;

    /// Insert or replace the row with the same server session id.
    async fn add_or_update(&mut self, session: Session) -> Result<()>;

    /// Returns whether a row was deleted.
    async fn delete(&mut self, session_id: SessionId) -> Result<bool>;
}

/// Append-only voucher ledger.
#[async_trait]
pub trait VoucherRepository: Send {
    async fn add(&mut self, voucher: Voucher) -> Result<()>;

    async fn all(&self) -> Result<Vec<Voucher>>;
}

/// Identity assigned by the last successful registration.
#[async_trait]
pub trait HostRepository: Send {
    async fn single(&self) -> Result<Option<HostIdentity>>;

    async fn add_or_update(&mut self, host: HostIdentity) -> Result<()>;
}
