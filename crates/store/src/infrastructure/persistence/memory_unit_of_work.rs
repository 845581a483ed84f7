//! In-memory Unit of Work
//!
//! Begins by snapshotting the backing state into a working copy; all
//! operations run against the copy and see their own earlier writes. Commit
//! swaps the copy in atomically. A unit of work dropped without committing
//! leaves the backing state untouched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oidstore_common::{ApplicationId, AuthorizationId, TokenId};
use oidstore_errors::{StoreError, StoreResult};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::repositories::TokenRepository;
use crate::domain::token::Token;
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};

use super::memory_token_repository::{
    InMemoryBackend, find_filtered_in, insert_into, page, prune_candidates_in, update_in,
};

type WorkingCopy = Arc<Mutex<Option<Vec<Token>>>>;

pub struct InMemoryUnitOfWorkFactory {
    backend: Arc<InMemoryBackend>,
}

impl InMemoryUnitOfWorkFactory {
    pub fn new(backend: Arc<InMemoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl UnitOfWorkFactory for InMemoryUnitOfWorkFactory {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let snapshot = self.backend.tokens.read().await.clone();
        let working: WorkingCopy = Arc::new(Mutex::new(Some(snapshot)));

        Ok(Box::new(InMemoryUnitOfWork {
            backend: self.backend.clone(),
            working: working.clone(),
            token_repo: WorkingCopyTokenRepository { working },
        }))
    }
}

pub struct InMemoryUnitOfWork {
    backend: Arc<InMemoryBackend>,
    working: WorkingCopy,
    token_repo: WorkingCopyTokenRepository,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    fn tokens(&self) -> &dyn TokenRepository {
        &self.token_repo
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let working = self
            .working
            .lock()
            .await
            .take()
            .ok_or_else(|| StoreError::internal("Transaction already consumed"))?;

        *self.backend.tokens.write().await = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.working
            .lock()
            .await
            .take()
            .ok_or_else(|| StoreError::internal("Transaction already consumed"))?;

        Ok(())
    }
}

/// Repository bound to a unit of work's working copy.
struct WorkingCopyTokenRepository {
    working: WorkingCopy,
}

macro_rules! with_working {
    ($self:ident, $tokens:ident, $body:expr) => {{
        let mut guard = $self.working.lock().await;
        let $tokens = guard
            .as_mut()
            .ok_or_else(|| StoreError::internal("Transaction already consumed"))?;
        $body
    }};
}

#[async_trait]
impl TokenRepository for WorkingCopyTokenRepository {
    async fn count(&self) -> StoreResult<u64> {
        with_working!(self, tokens, Ok(tokens.len() as u64))
    }

    async fn insert(&self, token: &Token) -> StoreResult<()> {
        with_working!(self, tokens, insert_into(tokens, token))
    }

    async fn update(&self, token: &Token) -> StoreResult<()> {
        with_working!(self, tokens, update_in(tokens, token))
    }

    async fn delete(&self, token: &Token) -> StoreResult<()> {
        with_working!(self, tokens, {
            tokens.retain(|t| t.id != token.id);
            Ok(())
        })
    }

    async fn delete_many(&self, batch: &[Token]) -> StoreResult<()> {
        let ids: Vec<TokenId> = batch.iter().map(|t| t.id.clone()).collect();
        with_working!(self, tokens, {
            tokens.retain(|t| !ids.contains(&t.id));
            Ok(())
        })
    }

    async fn find_by_id(&self, id: &TokenId) -> StoreResult<Option<Token>> {
        with_working!(
            self,
            tokens,
            Ok(tokens.iter().find(|t| &t.id == id).cloned())
        )
    }

    async fn find_by_reference_id(&self, reference_id: &str) -> StoreResult<Option<Token>> {
        with_working!(
            self,
            tokens,
            Ok(tokens
                .iter()
                .find(|t| t.reference_id.as_deref() == Some(reference_id))
                .cloned())
        )
    }

    async fn find_by_subject(&self, subject: &str) -> StoreResult<Vec<Token>> {
        with_working!(
            self,
            tokens,
            Ok(tokens
                .iter()
                .filter(|t| t.subject.as_deref() == Some(subject))
                .cloned()
                .collect())
        )
    }

    async fn find_by_application_id(&self, id: &ApplicationId) -> StoreResult<Vec<Token>> {
        with_working!(
            self,
            tokens,
            Ok(tokens
                .iter()
                .filter(|t| t.application_id.as_ref() == Some(id))
                .cloned()
                .collect())
        )
    }

    async fn find_by_authorization_id(&self, id: &AuthorizationId) -> StoreResult<Vec<Token>> {
        with_working!(
            self,
            tokens,
            Ok(tokens
                .iter()
                .filter(|t| t.authorization_id.as_ref() == Some(id))
                .cloned()
                .collect())
        )
    }

    async fn find_filtered(
        &self,
        subject: &str,
        client: &ApplicationId,
        status: Option<&str>,
        r#type: Option<&str>,
    ) -> StoreResult<Vec<Token>> {
        with_working!(
            self,
            tokens,
            Ok(find_filtered_in(tokens, subject, client, status, r#type))
        )
    }

    async fn get_list(
        &self,
        count: Option<usize>,
        offset: Option<usize>,
    ) -> StoreResult<Vec<Token>> {
        with_working!(self, tokens, Ok(page(tokens, count, offset)))
    }

    async fn get_prune_candidates(
        &self,
        threshold: DateTime<Utc>,
        batch_size: usize,
    ) -> StoreResult<Vec<Token>> {
        with_working!(
            self,
            tokens,
            Ok(prune_candidates_in(tokens, threshold, batch_size))
        )
    }

    async fn get_all(&self) -> StoreResult<Vec<Token>> {
        with_working!(self, tokens, Ok(tokens.clone()))
    }
}
