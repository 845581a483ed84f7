//! In-memory token repository
//!
//! Backing store for tests and embedded hosts. Storage order is id order,
//! matching the PostgreSQL adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oidstore_common::{ApplicationId, AuthorizationId, TokenId};
use oidstore_errors::{StoreError, StoreResult};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::repositories::TokenRepository;
use crate::domain::token::{Token, statuses};

/// Shared in-memory backing state.
#[derive(Default)]
pub struct InMemoryBackend {
    pub(crate) tokens: RwLock<Vec<Token>>,
}

impl InMemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

pub struct InMemoryTokenRepository {
    backend: Arc<InMemoryBackend>,
}

impl InMemoryTokenRepository {
    pub fn new(backend: Arc<InMemoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl TokenRepository for InMemoryTokenRepository {
    async fn count(&self) -> StoreResult<u64> {
        Ok(self.backend.tokens.read().await.len() as u64)
    }

    async fn insert(&self, token: &Token) -> StoreResult<()> {
        insert_into(&mut *self.backend.tokens.write().await, token)
    }

    async fn update(&self, token: &Token) -> StoreResult<()> {
        update_in(&mut *self.backend.tokens.write().await, token)
    }

    async fn delete(&self, token: &Token) -> StoreResult<()> {
        self.backend
            .tokens
            .write()
            .await
            .retain(|t| t.id != token.id);
        Ok(())
    }

    async fn delete_many(&self, tokens: &[Token]) -> StoreResult<()> {
        let ids: Vec<TokenId> = tokens.iter().map(|t| t.id.clone()).collect();
        self.backend
            .tokens
            .write()
            .await
            .retain(|t| !ids.contains(&t.id));
        Ok(())
    }

    async fn find_by_id(&self, id: &TokenId) -> StoreResult<Option<Token>> {
        Ok(self
            .backend
            .tokens
            .read()
            .await
            .iter()
            .find(|t| &t.id == id)
            .cloned())
    }

    async fn find_by_reference_id(&self, reference_id: &str) -> StoreResult<Option<Token>> {
        Ok(self
            .backend
            .tokens
            .read()
            .await
            .iter()
            .find(|t| t.reference_id.as_deref() == Some(reference_id))
            .cloned())
    }

    async fn find_by_subject(&self, subject: &str) -> StoreResult<Vec<Token>> {
        let tokens = self.backend.tokens.read().await;
        Ok(sorted(filter(&tokens, |t| {
            t.subject.as_deref() == Some(subject)
        })))
    }

    async fn find_by_application_id(&self, id: &ApplicationId) -> StoreResult<Vec<Token>> {
        let tokens = self.backend.tokens.read().await;
        Ok(sorted(filter(&tokens, |t| {
            t.application_id.as_ref() == Some(id)
        })))
    }

    async fn find_by_authorization_id(&self, id: &AuthorizationId) -> StoreResult<Vec<Token>> {
        let tokens = self.backend.tokens.read().await;
        Ok(sorted(filter(&tokens, |t| {
            t.authorization_id.as_ref() == Some(id)
        })))
    }

    async fn find_filtered(
        &self,
        subject: &str,
        client: &ApplicationId,
        status: Option<&str>,
        r#type: Option<&str>,
    ) -> StoreResult<Vec<Token>> {
        let tokens = self.backend.tokens.read().await;
        Ok(find_filtered_in(&tokens, subject, client, status, r#type))
    }

    async fn get_list(
        &self,
        count: Option<usize>,
        offset: Option<usize>,
    ) -> StoreResult<Vec<Token>> {
        let tokens = self.backend.tokens.read().await;
        Ok(page(&tokens, count, offset))
    }

    async fn get_prune_candidates(
        &self,
        threshold: DateTime<Utc>,
        batch_size: usize,
    ) -> StoreResult<Vec<Token>> {
        let tokens = self.backend.tokens.read().await;
        Ok(prune_candidates_in(&tokens, threshold, batch_size))
    }

    async fn get_all(&self) -> StoreResult<Vec<Token>> {
        Ok(sorted(self.backend.tokens.read().await.clone()))
    }
}

pub(crate) fn insert_into(tokens: &mut Vec<Token>, token: &Token) -> StoreResult<()> {
    if tokens.iter().any(|t| t.id == token.id) {
        return Err(StoreError::database(format!(
            "Duplicate token id {}",
            token.id
        )));
    }
    tokens.push(token.clone());
    Ok(())
}

pub(crate) fn update_in(tokens: &mut [Token], token: &Token) -> StoreResult<()> {
    match tokens.iter_mut().find(|t| t.id == token.id) {
        Some(slot) => {
            *slot = token.clone();
            Ok(())
        }
        None => Err(StoreError::database(format!(
            "Token {} does not exist",
            token.id
        ))),
    }
}

pub(crate) fn find_filtered_in(
    tokens: &[Token],
    subject: &str,
    client: &ApplicationId,
    status: Option<&str>,
    r#type: Option<&str>,
) -> Vec<Token> {
    sorted(filter(tokens, |t| {
        t.subject.as_deref() == Some(subject)
            && t.application_id.as_ref() == Some(client)
            && status.is_none_or(|s| t.status.as_deref() == Some(s))
            && r#type.is_none_or(|ty| t.r#type.as_deref() == Some(ty))
    }))
}

pub(crate) fn page(tokens: &[Token], count: Option<usize>, offset: Option<usize>) -> Vec<Token> {
    sorted(tokens.to_vec())
        .into_iter()
        .skip(offset.unwrap_or(0))
        .take(count.unwrap_or(usize::MAX))
        .collect()
}

/// Same eligibility rule as the PostgreSQL adapter: created before the
/// threshold and either in a non-valid, non-inactive status or already
/// expired. Tokens without a creation date are never candidates.
pub(crate) fn prune_candidates_in(
    tokens: &[Token],
    threshold: DateTime<Utc>,
    batch_size: usize,
) -> Vec<Token> {
    let now = Utc::now();
    sorted(filter(tokens, |t| {
        let old_enough = t.creation_date.is_some_and(|c| c < threshold);
        let terminal = matches!(
            t.status.as_deref(),
            Some(s) if s != statuses::INACTIVE && s != statuses::VALID
        );
        let expired = t.expiration_date.is_some_and(|e| e < now);
        old_enough && (terminal || expired)
    }))
    .into_iter()
    .take(batch_size)
    .collect()
}

fn filter(tokens: &[Token], predicate: impl Fn(&Token) -> bool) -> Vec<Token> {
    tokens.iter().filter(|t| predicate(t)).cloned().collect()
}

fn sorted(mut tokens: Vec<Token>) -> Vec<Token> {
    tokens.sort_by(|a, b| a.id.0.cmp(&b.id.0));
    tokens
}
