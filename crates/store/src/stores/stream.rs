//! Lazy, cancellable result streams.
//!
//! Repositories return fully materialized lists; the engine consumes lazy
//! async sequences. [`deferred`] bridges the two: nothing is fetched until
//! the stream is first polled, elements are yielded one at a time, and
//! cancellation is observed at every element boundary.

use std::future::Future;

use futures::StreamExt;
use futures::stream::BoxStream;
use oidstore_errors::{StoreError, StoreResult};
use tokio_util::sync::CancellationToken;

/// Lazy sequence of results produced by the store.
pub type ResultStream<'a, T> = BoxStream<'a, StoreResult<T>>;

enum State<F, T> {
    Pending(F),
    Draining(std::vec::IntoIter<T>),
    Done,
}

/// Wrap an eagerly-fetching future in a lazy stream.
///
/// A fetch error terminates the stream with that error; cancellation
/// terminates it with [`StoreError::Cancelled`]. Either way nothing more is
/// yielded afterwards.
pub(crate) fn deferred<T, F>(load: F, cancel: CancellationToken) -> ResultStream<'static, T>
where
    T: Send + 'static,
    F: Future<Output = StoreResult<Vec<T>>> + Send + 'static,
{
    futures::stream::unfold(
        (State::Pending(load), cancel),
        |(state, cancel)| async move {
            if cancel.is_cancelled() {
                return match state {
                    State::Done => None,
                    _ => Some((Err(StoreError::Cancelled), (State::Done, cancel))),
                };
            }

            match state {
                State::Done => None,
                State::Pending(load) => match load.await {
                    Ok(items) => {
                        let mut iter = items.into_iter();
                        iter.next()
                            .map(|item| (Ok(item), (State::Draining(iter), cancel)))
                    }
                    Err(e) => Some((Err(e), (State::Done, cancel))),
                },
                State::Draining(mut iter) => iter
                    .next()
                    .map(|item| (Ok(item), (State::Draining(iter), cancel))),
            }
        },
    )
    .boxed()
}
