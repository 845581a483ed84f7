//! PostgreSQL Unit of Work
//!
//! Wraps a sqlx transaction. An uncommitted transaction rolls back when the
//! unit of work is dropped, which is sqlx's own drop behavior.

use async_trait::async_trait;
use oidstore_errors::{StoreError, StoreResult};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::repositories::TokenRepository;
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};

use super::tx_token_repository::TxTokenRepository;

/// PostgreSQL Unit of Work factory
pub struct PostgresUnitOfWorkFactory {
    pool: PgPool,
}

impl PostgresUnitOfWorkFactory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitOfWorkFactory for PostgresUnitOfWorkFactory {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::database(format!("Failed to begin transaction: {}", e)))?;

        let tx = Arc::new(Mutex::new(Some(tx)));

        Ok(Box::new(PostgresUnitOfWork {
            tx: tx.clone(),
            token_repo: TxTokenRepository::new(tx),
        }))
    }
}

/// PostgreSQL Unit of Work
pub struct PostgresUnitOfWork {
    tx: super::tx_token_repository::SharedTx,
    token_repo: TxTokenRepository,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    fn tokens(&self) -> &dyn TokenRepository {
        &self.token_repo
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .take()
            .ok_or_else(|| StoreError::internal("Transaction already consumed"))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::database(format!("Failed to commit transaction: {}", e)))?;

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .take()
            .ok_or_else(|| StoreError::internal("Transaction already consumed"))?;

        tx.rollback()
            .await
            .map_err(|e| StoreError::database(format!("Failed to rollback transaction: {}", e)))?;

        Ok(())
    }
}
