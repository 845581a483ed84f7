//! Unit of Work pattern
//!
//! Scoped transaction coordination for repository operations.

use async_trait::async_trait;
use oidstore_errors::StoreResult;

use crate::domain::repositories::TokenRepository;

/// Unit of Work trait
///
/// A transaction scope over the store's repositories. Dropping a unit of
/// work without calling [`commit`](UnitOfWork::commit) rolls the
/// transaction back, so no half-committed state survives a failure path.
///
/// # Usage
///
/// ```ignore
/// let uow = factory.begin().await?;
///
/// uow.tokens().insert(&token).await?;
///
/// uow.commit().await?;
/// ```
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Token repository bound to this transaction.
    fn tokens(&self) -> &dyn TokenRepository;

    /// Commit the transaction, persisting all changes.
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Roll back the transaction, discarding all changes.
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Unit of Work factory trait
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    /// Begin a new transaction.
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;
}
