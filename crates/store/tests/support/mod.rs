//! Shared test fixtures: token builders, a scripted repository for
//! exercising the prune loop, and a unit-of-work factory that records
//! commit/rollback outcomes.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oidstore::domain::repositories::TokenRepository;
use oidstore::domain::token::{Token, statuses, types};
use oidstore::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};
use oidstore_common::{ApplicationId, AuthorizationId, TokenId};
use oidstore_config::CleanupConfig;
use oidstore_errors::{StoreError, StoreResult};
use tokio::sync::Mutex;

pub fn valid_token(subject: &str, application_id: &ApplicationId) -> Token {
    let mut token = Token::new();
    token.subject = Some(subject.to_string());
    token.application_id = Some(application_id.clone());
    token.r#type = Some(types::ACCESS_TOKEN.to_string());
    token.status = Some(statuses::VALID.to_string());
    token.expiration_date = Some(Utc::now() + Duration::hours(1));
    token
}

/// An old revoked token, eligible for pruning at any recent threshold.
pub fn stale_token(age_days: i64) -> Token {
    let mut token = Token::new();
    token.status = Some(statuses::REVOKED.to_string());
    token.creation_date = Some(Utc::now() - Duration::days(age_days));
    token.expiration_date = Some(Utc::now() - Duration::days(age_days - 1));
    token
}

pub fn cleanup_config(batch_size: usize, loop_count: usize) -> CleanupConfig {
    CleanupConfig {
        batch_size,
        loop_count,
        ..CleanupConfig::default()
    }
}

/// Repository double that serves prune batches from a script and can fail
/// chosen `delete_many` calls.
pub struct ScriptedRepository {
    batches: Mutex<VecDeque<Vec<Token>>>,
    /// Indices of `delete_many` calls (0-based) that fail.
    failing_deletes: Vec<usize>,
    /// When set, every fetch returns a fresh batch of this size.
    endless_batch: Option<usize>,
    pub fetch_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub deleted: Mutex<Vec<Vec<TokenId>>>,
    /// Cancelled by `delete_many` at the given call index, emulating a
    /// caller that gives up mid-sweep.
    cancel_on_delete: Option<(usize, tokio_util::sync::CancellationToken)>,
}

impl ScriptedRepository {
    pub fn with_batches(batches: Vec<Vec<Token>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            failing_deletes: Vec::new(),
            endless_batch: None,
            fetch_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
            cancel_on_delete: None,
        }
    }

    pub fn endless(batch_size: usize) -> Self {
        let mut repo = Self::with_batches(Vec::new());
        repo.endless_batch = Some(batch_size);
        repo
    }

    pub fn failing_deletes(mut self, indices: Vec<usize>) -> Self {
        self.failing_deletes = indices;
        self
    }

    pub fn cancelling_on_delete(
        mut self,
        index: usize,
        token: tokio_util::sync::CancellationToken,
    ) -> Self {
        self.cancel_on_delete = Some((index, token));
        self
    }

    fn unscripted<T>(&self, op: &str) -> StoreResult<T> {
        Err(StoreError::internal(format!("{} is not scripted", op)))
    }
}

#[async_trait]
impl TokenRepository for ScriptedRepository {
    async fn count(&self) -> StoreResult<u64> {
        self.unscripted("count")
    }

    async fn insert(&self, _token: &Token) -> StoreResult<()> {
        self.unscripted("insert")
    }

    async fn update(&self, _token: &Token) -> StoreResult<()> {
        self.unscripted("update")
    }

    async fn delete(&self, _token: &Token) -> StoreResult<()> {
        self.unscripted("delete")
    }

    async fn delete_many(&self, tokens: &[Token]) -> StoreResult<()> {
        let call = self.delete_calls.fetch_add(1, Ordering::SeqCst);

        if let Some((index, cancel)) = &self.cancel_on_delete {
            if *index == call {
                cancel.cancel();
            }
        }

        if self.failing_deletes.contains(&call) {
            return Err(StoreError::database("injected batch fault"));
        }

        self.deleted
            .lock()
            .await
            .push(tokens.iter().map(|t| t.id.clone()).collect());
        Ok(())
    }

    async fn find_by_id(&self, _id: &TokenId) -> StoreResult<Option<Token>> {
        self.unscripted("find_by_id")
    }

    async fn find_by_reference_id(&self, _reference_id: &str) -> StoreResult<Option<Token>> {
        self.unscripted("find_by_reference_id")
    }

    async fn find_by_subject(&self, _subject: &str) -> StoreResult<Vec<Token>> {
        self.unscripted("find_by_subject")
    }

    async fn find_by_application_id(&self, _id: &ApplicationId) -> StoreResult<Vec<Token>> {
        self.unscripted("find_by_application_id")
    }

    async fn find_by_authorization_id(&self, _id: &AuthorizationId) -> StoreResult<Vec<Token>> {
        self.unscripted("find_by_authorization_id")
    }

    async fn find_filtered(
        &self,
        _subject: &str,
        _client: &ApplicationId,
        _status: Option<&str>,
        _type: Option<&str>,
    ) -> StoreResult<Vec<Token>> {
        self.unscripted("find_filtered")
    }

    async fn get_list(
        &self,
        _count: Option<usize>,
        _offset: Option<usize>,
    ) -> StoreResult<Vec<Token>> {
        self.unscripted("get_list")
    }

    async fn get_prune_candidates(
        &self,
        _threshold: DateTime<Utc>,
        batch_size: usize,
    ) -> StoreResult<Vec<Token>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(size) = self.endless_batch {
            return Ok((0..size.min(batch_size)).map(|_| stale_token(30)).collect());
        }

        Ok(self.batches.lock().await.pop_front().unwrap_or_default())
    }

    async fn get_all(&self) -> StoreResult<Vec<Token>> {
        self.unscripted("get_all")
    }
}

/// Unit-of-work factory handing out scopes over a shared scripted
/// repository, recording whether each scope was committed.
pub struct ScriptedUowFactory {
    repo: Arc<ScriptedRepository>,
    pub committed: Arc<AtomicBool>,
    pub begun: AtomicUsize,
}

impl ScriptedUowFactory {
    pub fn new(repo: Arc<ScriptedRepository>) -> Self {
        Self {
            repo,
            committed: Arc::new(AtomicBool::new(false)),
            begun: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl UnitOfWorkFactory for ScriptedUowFactory {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedUow {
            repo: self.repo.clone(),
            committed: self.committed.clone(),
        }))
    }
}

struct ScriptedUow {
    repo: Arc<ScriptedRepository>,
    committed: Arc<AtomicBool>,
}

#[async_trait]
impl UnitOfWork for ScriptedUow {
    fn tokens(&self) -> &dyn TokenRepository {
        self.repo.as_ref()
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.committed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
