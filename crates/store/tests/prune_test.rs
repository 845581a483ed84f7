//! Prune sweep behavior: batching, loop bounds, failure aggregation, and
//! cancellation.

mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::{Duration, Utc};
use oidstore::TokenStore;
use oidstore::infrastructure::persistence::{
    InMemoryBackend, InMemoryTokenRepository, InMemoryUnitOfWorkFactory,
};
use oidstore_common::ApplicationId;
use oidstore_errors::StoreError;
use tokio_util::sync::CancellationToken;

use support::{ScriptedRepository, ScriptedUowFactory, cleanup_config, stale_token, valid_token};

fn scripted_store(repo: Arc<ScriptedRepository>, batch_size: usize, loop_count: usize)
-> (TokenStore, Arc<ScriptedUowFactory>) {
    let factory = Arc::new(ScriptedUowFactory::new(repo.clone()));
    let store = TokenStore::new(repo, factory.clone(), cleanup_config(batch_size, loop_count));
    (store, factory)
}

#[tokio::test]
async fn test_prune_deletes_eligible_tokens_in_batches() {
    let backend = InMemoryBackend::new();
    let store = TokenStore::new(
        Arc::new(InMemoryTokenRepository::new(backend.clone())),
        Arc::new(InMemoryUnitOfWorkFactory::new(backend.clone())),
        cleanup_config(2, 3),
    );
    let cancel = CancellationToken::new();

    // 5 eligible tokens plus one that must survive.
    for _ in 0..5 {
        store.create(&stale_token(30), &cancel).await.unwrap();
    }
    let keeper = valid_token("alice", &ApplicationId::new());
    store.create(&keeper, &cancel).await.unwrap();

    store
        .prune_expired(Utc::now() - Duration::days(7), &cancel)
        .await
        .unwrap();

    assert_eq!(store.count(&cancel).await.unwrap(), 1);
    assert!(
        store
            .find_by_id(&keeper.id.to_string(), &cancel)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_prune_never_deletes_tokens_newer_than_threshold() {
    let backend = InMemoryBackend::new();
    let store = TokenStore::new(
        Arc::new(InMemoryTokenRepository::new(backend.clone())),
        Arc::new(InMemoryUnitOfWorkFactory::new(backend.clone())),
        cleanup_config(10, 10),
    );
    let cancel = CancellationToken::new();

    // Revoked, but created after the threshold.
    let mut recent = stale_token(3);
    recent.creation_date = Some(Utc::now() - Duration::days(3));
    store.create(&recent, &cancel).await.unwrap();

    store
        .prune_expired(Utc::now() - Duration::days(7), &cancel)
        .await
        .unwrap();

    assert_eq!(store.count(&cancel).await.unwrap(), 1);
}

#[tokio::test]
async fn test_prune_runs_exact_rounds_for_scripted_batches() {
    let repo = Arc::new(ScriptedRepository::with_batches(vec![
        vec![stale_token(30), stale_token(30)],
        vec![stale_token(30), stale_token(30)],
        vec![stale_token(30)],
    ]));
    let (store, factory) = scripted_store(repo.clone(), 2, 3);

    store
        .prune_expired(Utc::now(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(repo.fetch_calls.load(Ordering::SeqCst), 3);
    let deleted = repo.deleted.lock().await;
    let sizes: Vec<_> = deleted.iter().map(|batch| batch.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert!(factory.committed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_prune_stops_early_on_empty_fetch() {
    let repo = Arc::new(ScriptedRepository::with_batches(vec![vec![
        stale_token(30),
        stale_token(30),
    ]]));
    let (store, factory) = scripted_store(repo.clone(), 2, 10);

    store
        .prune_expired(Utc::now(), &CancellationToken::new())
        .await
        .unwrap();

    // One batch plus the empty fetch that ended the sweep.
    assert_eq!(repo.fetch_calls.load(Ordering::SeqCst), 2);
    assert_eq!(repo.delete_calls.load(Ordering::SeqCst), 1);
    assert!(factory.committed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_prune_is_bounded_by_loop_count() {
    let repo = Arc::new(ScriptedRepository::endless(2));
    let (store, factory) = scripted_store(repo.clone(), 2, 4);

    store
        .prune_expired(Utc::now(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(repo.fetch_calls.load(Ordering::SeqCst), 4);
    assert_eq!(repo.delete_calls.load(Ordering::SeqCst), 4);
    assert!(factory.committed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_prune_collects_batch_failures_and_still_commits() {
    let repo = Arc::new(
        ScriptedRepository::with_batches(vec![
            vec![stale_token(30), stale_token(30)],
            vec![stale_token(30), stale_token(30)],
            vec![stale_token(30)],
        ])
        .failing_deletes(vec![1]),
    );
    let (store, factory) = scripted_store(repo.clone(), 2, 3);

    let err = store
        .prune_expired(Utc::now(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        StoreError::Cleanup(failures) => {
            assert_eq!(failures.len(), 1);
            assert!(matches!(failures[0], StoreError::Database(_)));
        }
        other => panic!("expected Cleanup, got {:?}", other),
    }

    // The sweep kept going past the failed batch and the successful batches
    // were committed.
    assert_eq!(repo.delete_calls.load(Ordering::SeqCst), 3);
    assert_eq!(repo.deleted.lock().await.len(), 2);
    assert!(factory.committed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_prune_cancellation_aborts_before_commit() {
    let cancel = CancellationToken::new();
    let repo = Arc::new(
        ScriptedRepository::endless(2).cancelling_on_delete(0, cancel.clone()),
    );
    let (store, factory) = scripted_store(repo.clone(), 2, 10);

    let err = store.prune_expired(Utc::now(), &cancel).await.unwrap_err();

    assert!(matches!(err, StoreError::Cancelled));
    // Round 1 ran; round 2 was never attempted and nothing was committed.
    assert_eq!(repo.fetch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(repo.delete_calls.load(Ordering::SeqCst), 1);
    assert!(!factory.committed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_prune_cancellation_wins_over_collected_failures() {
    let cancel = CancellationToken::new();
    let repo = Arc::new(
        ScriptedRepository::endless(2)
            .failing_deletes(vec![0])
            .cancelling_on_delete(0, cancel.clone()),
    );
    let (store, _) = scripted_store(repo.clone(), 2, 10);

    let err = store.prune_expired(Utc::now(), &cancel).await.unwrap_err();

    // A cancelled sweep reports Cancelled even when failures were already
    // collected.
    assert!(matches!(err, StoreError::Cancelled));
}

#[tokio::test]
async fn test_prune_with_no_candidates_is_noop() {
    let repo = Arc::new(ScriptedRepository::with_batches(vec![]));
    let (store, factory) = scripted_store(repo.clone(), 2, 3);

    // The first fetch returns no rows: the sweep commits without deleting.
    store
        .prune_expired(Utc::now(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(repo.delete_calls.load(Ordering::SeqCst), 0);
    assert!(factory.committed.load(Ordering::SeqCst));
}
