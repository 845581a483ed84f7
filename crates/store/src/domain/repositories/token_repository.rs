//! Token repository interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oidstore_common::{ApplicationId, AuthorizationId, TokenId};
use oidstore_errors::StoreResult;

use crate::domain::token::Token;

/// Persistence capability set the token store adapts.
///
/// Implementations decide storage order and prune eligibility; the store
/// layered on top never recomputes either.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Total token count.
    async fn count(&self) -> StoreResult<u64>;

    /// Persist a new token.
    async fn insert(&self, token: &Token) -> StoreResult<()>;

    /// Persist changes to an existing token.
    async fn update(&self, token: &Token) -> StoreResult<()>;

    /// Delete a token.
    async fn delete(&self, token: &Token) -> StoreResult<()>;

    /// Delete a batch of tokens.
    async fn delete_many(&self, tokens: &[Token]) -> StoreResult<()>;

    /// Find by primary key.
    async fn find_by_id(&self, id: &TokenId) -> StoreResult<Option<Token>>;

    /// Find by the external opaque reference key.
    async fn find_by_reference_id(&self, reference_id: &str) -> StoreResult<Option<Token>>;

    /// All tokens issued to a subject.
    async fn find_by_subject(&self, subject: &str) -> StoreResult<Vec<Token>>;

    /// All tokens issued to a client application.
    async fn find_by_application_id(&self, id: &ApplicationId) -> StoreResult<Vec<Token>>;

    /// All tokens issued under an authorization grant.
    async fn find_by_authorization_id(&self, id: &AuthorizationId) -> StoreResult<Vec<Token>>;

    /// Tokens matching subject and client, optionally narrowed by status
    /// and type.
    async fn find_filtered(
        &self,
        subject: &str,
        client: &ApplicationId,
        status: Option<&str>,
        r#type: Option<&str>,
    ) -> StoreResult<Vec<Token>>;

    /// A page of tokens in storage order.
    async fn get_list(&self, count: Option<usize>, offset: Option<usize>)
    -> StoreResult<Vec<Token>>;

    /// Up to `batch_size` tokens eligible for pruning at `threshold`.
    async fn get_prune_candidates(
        &self,
        threshold: DateTime<Utc>,
        batch_size: usize,
    ) -> StoreResult<Vec<Token>>;

    /// Materialize the full token relation, for caller-supplied queries.
    async fn get_all(&self) -> StoreResult<Vec<Token>>;
}
