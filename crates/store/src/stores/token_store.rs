//! Token store adapter
//!
//! Adapts the [`TokenRepository`] capability set to the method contract an
//! external OIDC engine expects for token persistence, and performs the
//! batched cleanup of expired and stale tokens.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use oidstore_common::{ApplicationId, AuthorizationId, TokenId};
use oidstore_config::CleanupConfig;
use oidstore_errors::{StoreError, StoreResult};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::repositories::TokenRepository;
use crate::domain::token::Token;
use crate::domain::unit_of_work::UnitOfWorkFactory;
use crate::stores::stream::{ResultStream, deferred};

/// Repository-backed token store.
///
/// Write operations each open their own unit of work; reads go straight to
/// the repository. Concurrency control is delegated entirely to the
/// underlying storage engine.
pub struct TokenStore {
    repository: Arc<dyn TokenRepository>,
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    options: CleanupConfig,
}

impl TokenStore {
    pub fn new(
        repository: Arc<dyn TokenRepository>,
        uow_factory: Arc<dyn UnitOfWorkFactory>,
        options: CleanupConfig,
    ) -> Self {
        Self {
            repository,
            uow_factory,
            options,
        }
    }

    /// Total number of stored tokens.
    pub async fn count(&self, cancel: &CancellationToken) -> StoreResult<u64> {
        ensure_not_cancelled(cancel)?;

        self.repository.count().await
    }

    /// Count the results of a caller-supplied query over the full token
    /// relation. The store executes the query verbatim, applying no
    /// filtering of its own.
    pub async fn count_by_query<R, I, F>(
        &self,
        query: F,
        cancel: &CancellationToken,
    ) -> StoreResult<u64>
    where
        F: Send + FnOnce(Vec<Token>) -> I,
        I: IntoIterator<Item = R>,
    {
        ensure_not_cancelled(cancel)?;

        let tokens = self.repository.get_all().await?;
        Ok(query(tokens).into_iter().count() as u64)
    }

    /// Persist a new token within its own transaction scope.
    pub async fn create(&self, token: &Token, cancel: &CancellationToken) -> StoreResult<()> {
        require_token(token)?;
        ensure_not_cancelled(cancel)?;

        let uow = self.uow_factory.begin().await?;
        uow.tokens().insert(token).await?;
        uow.commit().await
    }

    /// Persist changes to an existing token within its own transaction
    /// scope. Status changes are written through as-is, never dropped.
    pub async fn update(&self, token: &Token, cancel: &CancellationToken) -> StoreResult<()> {
        require_token(token)?;
        ensure_not_cancelled(cancel)?;

        let uow = self.uow_factory.begin().await?;
        uow.tokens().update(token).await?;
        uow.commit().await
    }

    /// Delete a token within its own transaction scope.
    pub async fn delete(&self, token: &Token, cancel: &CancellationToken) -> StoreResult<()> {
        require_token(token)?;
        ensure_not_cancelled(cancel)?;

        let uow = self.uow_factory.begin().await?;
        uow.tokens().delete(token).await?;
        uow.commit().await
    }

    /// Batched sweep of tokens past `threshold`.
    ///
    /// Runs up to `loop_count` fetch/delete rounds of `batch_size` tokens
    /// inside a single unit of work, stopping early once a fetch comes back
    /// empty. A failed batch deletion is recorded and the sweep moves on;
    /// the collected failures surface together as [`StoreError::Cleanup`]
    /// once the sweep is over. The transaction commits regardless, so
    /// successful batches stay deleted (best-effort cleanup). Cancellation
    /// is checked at the top of every round and abandons the transaction
    /// uncommitted.
    ///
    /// Eligibility is decided by the repository's candidate query alone;
    /// nothing is recomputed here.
    pub async fn prune_expired(
        &self,
        threshold: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        let mut failures: Vec<StoreError> = Vec::new();

        let uow = self.uow_factory.begin().await?;

        for round in 0..self.options.loop_count {
            if cancel.is_cancelled() {
                // Dropping the unit of work rolls the whole sweep back.
                return Err(StoreError::Cancelled);
            }

            let batch = uow
                .tokens()
                .get_prune_candidates(threshold, self.options.batch_size)
                .await?;

            if batch.is_empty() {
                break;
            }

            debug!(round, batch = batch.len(), "Deleting prune batch");

            if let Err(e) = uow.tokens().delete_many(&batch).await {
                failures.push(e);
            }
        }

        uow.commit().await?;

        if !failures.is_empty() {
            return Err(StoreError::cleanup(failures));
        }

        Ok(())
    }

    /// Tokens issued to `subject` by the application `client` refers to.
    pub fn find(
        &self,
        subject: &str,
        client: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<ResultStream<'static, Token>> {
        require_non_empty("subject", subject)?;
        let key = convert_application_id(client)?;

        let repository = self.repository.clone();
        let subject = subject.to_string();
        Ok(deferred(
            async move { repository.find_filtered(&subject, &key, None, None).await },
            cancel.clone(),
        ))
    }

    /// As [`find`](Self::find), narrowed to tokens in `status`.
    pub fn find_with_status(
        &self,
        subject: &str,
        client: &str,
        status: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<ResultStream<'static, Token>> {
        require_non_empty("subject", subject)?;
        require_non_empty("status", status)?;
        let key = convert_application_id(client)?;

        let repository = self.repository.clone();
        let subject = subject.to_string();
        let status = status.to_string();
        Ok(deferred(
            async move {
                repository
                    .find_filtered(&subject, &key, Some(&status), None)
                    .await
            },
            cancel.clone(),
        ))
    }

    /// As [`find_with_status`](Self::find_with_status), further narrowed to
    /// tokens of `r#type`.
    pub fn find_with_status_and_type(
        &self,
        subject: &str,
        client: &str,
        status: &str,
        r#type: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<ResultStream<'static, Token>> {
        require_non_empty("subject", subject)?;
        require_non_empty("status", status)?;
        require_non_empty("type", r#type)?;
        let key = convert_application_id(client)?;

        let repository = self.repository.clone();
        let subject = subject.to_string();
        let status = status.to_string();
        let r#type = r#type.to_string();
        Ok(deferred(
            async move {
                repository
                    .find_filtered(&subject, &key, Some(&status), Some(&r#type))
                    .await
            },
            cancel.clone(),
        ))
    }

    /// Tokens issued to a client application.
    pub fn find_by_application_id(
        &self,
        identifier: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<ResultStream<'static, Token>> {
        require_non_empty("identifier", identifier)?;
        let key = ApplicationId::from_string(identifier.trim())
            .map_err(|_| StoreError::invalid_argument("identifier"))?;

        let repository = self.repository.clone();
        Ok(deferred(
            async move { repository.find_by_application_id(&key).await },
            cancel.clone(),
        ))
    }

    /// Tokens issued under an authorization grant.
    pub fn find_by_authorization_id(
        &self,
        identifier: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<ResultStream<'static, Token>> {
        require_non_empty("identifier", identifier)?;
        let key = AuthorizationId::from_string(identifier.trim())
            .map_err(|_| StoreError::invalid_argument("identifier"))?;

        let repository = self.repository.clone();
        Ok(deferred(
            async move { repository.find_by_authorization_id(&key).await },
            cancel.clone(),
        ))
    }

    /// Tokens issued to a subject.
    pub fn find_by_subject(
        &self,
        subject: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<ResultStream<'static, Token>> {
        require_non_empty("subject", subject)?;

        let repository = self.repository.clone();
        let subject = subject.to_string();
        Ok(deferred(
            async move { repository.find_by_subject(&subject).await },
            cancel.clone(),
        ))
    }

    /// Direct lookup by internal key. A miss is `None`, not an error.
    pub async fn find_by_id(
        &self,
        identifier: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<Token>> {
        require_non_empty("identifier", identifier)?;
        let key = TokenId::from_string(identifier.trim())
            .map_err(|_| StoreError::invalid_argument("identifier"))?;
        ensure_not_cancelled(cancel)?;

        self.repository.find_by_id(&key).await
    }

    /// Lookup by the external opaque reference key, bypassing internal-key
    /// conversion.
    pub async fn find_by_reference_id(
        &self,
        identifier: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<Token>> {
        require_non_empty("identifier", identifier)?;
        ensure_not_cancelled(cancel)?;

        self.repository.find_by_reference_id(identifier).await
    }

    /// Page through all tokens in storage order.
    pub fn list(
        &self,
        count: Option<usize>,
        offset: Option<usize>,
        cancel: &CancellationToken,
    ) -> ResultStream<'static, Token> {
        let repository = self.repository.clone();
        deferred(
            async move { repository.get_list(count, offset).await },
            cancel.clone(),
        )
    }

    /// Execute a caller-supplied query over the full token relation and
    /// return its first result.
    pub async fn get_by_query<S, R, I, F>(
        &self,
        query: F,
        state: S,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<R>>
    where
        S: Send,
        F: Send + FnOnce(Vec<Token>, S) -> I,
        I: IntoIterator<Item = R>,
    {
        ensure_not_cancelled(cancel)?;

        let tokens = self.repository.get_all().await?;
        Ok(query(tokens, state).into_iter().next())
    }

    /// Execute a caller-supplied query over the full token relation and
    /// stream its results.
    pub fn list_by_query<S, R, I, F>(
        &self,
        query: F,
        state: S,
        cancel: &CancellationToken,
    ) -> ResultStream<'static, R>
    where
        S: Send + 'static,
        R: Send + 'static,
        I: IntoIterator<Item = R>,
        F: Send + 'static + FnOnce(Vec<Token>, S) -> I,
    {
        let repository = self.repository.clone();
        deferred(
            async move {
                let tokens = repository.get_all().await?;
                Ok(query(tokens, state).into_iter().collect())
            },
            cancel.clone(),
        )
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> StoreResult<()> {
    if cancel.is_cancelled() {
        return Err(StoreError::Cancelled);
    }
    Ok(())
}

fn require_non_empty(param: &'static str, value: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::invalid_argument(param));
    }
    Ok(())
}

/// A token whose id was never assigned is not a persistable record.
fn require_token(token: &Token) -> StoreResult<()> {
    if token.id.0.is_nil() {
        return Err(StoreError::invalid_argument("token"));
    }
    Ok(())
}

fn convert_application_id(client: &str) -> StoreResult<ApplicationId> {
    require_non_empty("client", client)?;
    ApplicationId::from_string(client.trim()).map_err(|_| StoreError::invalid_argument("client"))
}
