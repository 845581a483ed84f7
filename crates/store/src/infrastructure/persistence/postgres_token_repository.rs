use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oidstore_common::{ApplicationId, AuthorizationId, TokenId};
use oidstore_errors::{StoreError, StoreResult};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::domain::repositories::TokenRepository;
use crate::domain::token::Token;

pub(crate) const TOKEN_COLUMNS: &str = "id, application_id, authorization_id, subject, type, \
     status, creation_date, expiration_date, redemption_date, reference_id, payload, properties";

/// Tokens eligible for pruning: older than the threshold and either in a
/// terminal status or already past their expiration date.
pub(crate) const PRUNE_PREDICATE: &str =
    "creation_date < $1 AND (status NOT IN ('inactive', 'valid') OR expiration_date < NOW())";

pub struct PostgresTokenRepository {
    pool: PgPool,
}

impl PostgresTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for PostgresTokenRepository {
    async fn count(&self) -> StoreResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM oidc_tokens")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::database(format!("Failed to count tokens: {}", e)))?;

        Ok(count as u64)
    }

    async fn insert(&self, token: &Token) -> StoreResult<()> {
        debug!(id = %token.id, "Inserting token");

        sqlx::query(&format!(
            "INSERT INTO oidc_tokens ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            TOKEN_COLUMNS
        ))
        .bind(token.id.0)
        .bind(token.application_id.as_ref().map(|id| id.0))
        .bind(token.authorization_id.as_ref().map(|id| id.0))
        .bind(&token.subject)
        .bind(&token.r#type)
        .bind(&token.status)
        .bind(token.creation_date)
        .bind(token.expiration_date)
        .bind(token.redemption_date)
        .bind(&token.reference_id)
        .bind(&token.payload)
        .bind(&token.properties)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to insert token: {}", e)))?;

        Ok(())
    }

    async fn update(&self, token: &Token) -> StoreResult<()> {
        debug!(id = %token.id, "Updating token");

        let result = sqlx::query(
            r#"
            UPDATE oidc_tokens
            SET application_id = $2, authorization_id = $3, subject = $4, type = $5,
                status = $6, creation_date = $7, expiration_date = $8, redemption_date = $9,
                reference_id = $10, payload = $11, properties = $12
            WHERE id = $1
            "#,
        )
        .bind(token.id.0)
        .bind(token.application_id.as_ref().map(|id| id.0))
        .bind(token.authorization_id.as_ref().map(|id| id.0))
        .bind(&token.subject)
        .bind(&token.r#type)
        .bind(&token.status)
        .bind(token.creation_date)
        .bind(token.expiration_date)
        .bind(token.redemption_date)
        .bind(&token.reference_id)
        .bind(&token.payload)
        .bind(&token.properties)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to update token: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::database(format!(
                "Token {} does not exist",
                token.id
            )));
        }

        Ok(())
    }

    async fn delete(&self, token: &Token) -> StoreResult<()> {
        sqlx::query("DELETE FROM oidc_tokens WHERE id = $1")
            .bind(token.id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::database(format!("Failed to delete token: {}", e)))?;

        Ok(())
    }

    async fn delete_many(&self, tokens: &[Token]) -> StoreResult<()> {
        let ids: Vec<Uuid> = tokens.iter().map(|t| t.id.0).collect();

        sqlx::query("DELETE FROM oidc_tokens WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::database(format!("Failed to delete tokens: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &TokenId) -> StoreResult<Option<Token>> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {} FROM oidc_tokens WHERE id = $1",
            TOKEN_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to find token: {}", e)))?;

        Ok(row.map(|r| r.into()))
    }

    async fn find_by_reference_id(&self, reference_id: &str) -> StoreResult<Option<Token>> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {} FROM oidc_tokens WHERE reference_id = $1",
            TOKEN_COLUMNS
        ))
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to find token by reference: {}", e)))?;

        Ok(row.map(|r| r.into()))
    }

    async fn find_by_subject(&self, subject: &str) -> StoreResult<Vec<Token>> {
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {} FROM oidc_tokens WHERE subject = $1 ORDER BY id",
            TOKEN_COLUMNS
        ))
        .bind(subject)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to find tokens by subject: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn find_by_application_id(&self, id: &ApplicationId) -> StoreResult<Vec<Token>> {
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {} FROM oidc_tokens WHERE application_id = $1 ORDER BY id",
            TOKEN_COLUMNS
        ))
        .bind(id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            StoreError::database(format!("Failed to find tokens by application: {}", e))
        })?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn find_by_authorization_id(&self, id: &AuthorizationId) -> StoreResult<Vec<Token>> {
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {} FROM oidc_tokens WHERE authorization_id = $1 ORDER BY id",
            TOKEN_COLUMNS
        ))
        .bind(id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            StoreError::database(format!("Failed to find tokens by authorization: {}", e))
        })?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn find_filtered(
        &self,
        subject: &str,
        client: &ApplicationId,
        status: Option<&str>,
        r#type: Option<&str>,
    ) -> StoreResult<Vec<Token>> {
        let rows = match (status, r#type) {
            (None, _) => {
                sqlx::query_as::<_, TokenRow>(&format!(
                    "SELECT {} FROM oidc_tokens WHERE subject = $1 AND application_id = $2 ORDER BY id",
                    TOKEN_COLUMNS
                ))
                .bind(subject)
                .bind(client.0)
                .fetch_all(&self.pool)
                .await
            }
            (Some(status), None) => {
                sqlx::query_as::<_, TokenRow>(&format!(
                    "SELECT {} FROM oidc_tokens WHERE subject = $1 AND application_id = $2 AND status = $3 ORDER BY id",
                    TOKEN_COLUMNS
                ))
                .bind(subject)
                .bind(client.0)
                .bind(status)
                .fetch_all(&self.pool)
                .await
            }
            (Some(status), Some(r#type)) => {
                sqlx::query_as::<_, TokenRow>(&format!(
                    "SELECT {} FROM oidc_tokens WHERE subject = $1 AND application_id = $2 AND status = $3 AND type = $4 ORDER BY id",
                    TOKEN_COLUMNS
                ))
                .bind(subject)
                .bind(client.0)
                .bind(status)
                .bind(r#type)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| StoreError::database(format!("Failed to find tokens: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn get_list(
        &self,
        count: Option<usize>,
        offset: Option<usize>,
    ) -> StoreResult<Vec<Token>> {
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {} FROM oidc_tokens ORDER BY id LIMIT $1 OFFSET $2",
            TOKEN_COLUMNS
        ))
        .bind(count.map(|c| c as i64))
        .bind(offset.unwrap_or(0) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to list tokens: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn get_prune_candidates(
        &self,
        threshold: DateTime<Utc>,
        batch_size: usize,
    ) -> StoreResult<Vec<Token>> {
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {} FROM oidc_tokens WHERE {} ORDER BY id LIMIT $2",
            TOKEN_COLUMNS, PRUNE_PREDICATE
        ))
        .bind(threshold)
        .bind(batch_size as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to fetch prune candidates: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn get_all(&self) -> StoreResult<Vec<Token>> {
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {} FROM oidc_tokens ORDER BY id",
            TOKEN_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database(format!("Failed to load tokens: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

#[derive(sqlx::FromRow)]
pub struct TokenRow {
    pub id: Uuid,
    pub application_id: Option<Uuid>,
    pub authorization_id: Option<Uuid>,
    pub subject: Option<String>,
    #[sqlx(rename = "type")]
    pub r#type: Option<String>,
    pub status: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub redemption_date: Option<DateTime<Utc>>,
    pub reference_id: Option<String>,
    pub payload: Option<String>,
    pub properties: Option<String>,
}

impl From<TokenRow> for Token {
    fn from(row: TokenRow) -> Self {
        Self {
            id: TokenId::from_uuid(row.id),
            application_id: row.application_id.map(ApplicationId::from_uuid),
            authorization_id: row.authorization_id.map(AuthorizationId::from_uuid),
            subject: row.subject,
            r#type: row.r#type,
            status: row.status,
            creation_date: row.creation_date,
            expiration_date: row.expiration_date,
            redemption_date: row.redemption_date,
            reference_id: row.reference_id,
            payload: row.payload,
            properties: row.properties,
        }
    }
}
