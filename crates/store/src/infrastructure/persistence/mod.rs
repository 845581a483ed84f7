//! Persistence implementations

mod memory_token_repository;
mod memory_unit_of_work;
mod postgres_token_repository;
mod postgres_unit_of_work;
mod tx_token_repository;

pub use memory_token_repository::{InMemoryBackend, InMemoryTokenRepository};
pub use memory_unit_of_work::InMemoryUnitOfWorkFactory;
pub use postgres_token_repository::PostgresTokenRepository;
pub use postgres_unit_of_work::{PostgresUnitOfWork, PostgresUnitOfWorkFactory};
pub use tx_token_repository::TxTokenRepository;

use oidstore_config::DatabaseConfig;
use oidstore_errors::{StoreError, StoreResult};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Open a connection pool from the database configuration.
pub async fn connect(config: &DatabaseConfig) -> StoreResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.url.expose_secret())
        .await
        .map_err(|e| StoreError::database(format!("Failed to connect to database: {}", e)))
}
