//! # Recall Testing
//!
//! Testing utilities for the recall state container.
//!
//! This crate provides:
//! - [`EventRecorder`]: collects every discrete event channel of a
//!   repository into inspectable vectors
//! - [`StateRecorder`]: collects each published state snapshot, seeded with
//!   the initial value
//! - caller-stream builders ([`respond_once`], [`fail_with`], [`never`], …)
//!   for scripting request outcomes
//!
//! ## Example
//!
//! ```ignore
//! use recall_testing::{respond_once, settle, EventRecorder, StateRecorder};
//!
//! #[tokio::test]
//! async fn records_a_successful_call() {
//!     let repo = Repository::new(RepositoryConfig::new(|_: u32| respond_once(7)));
//!     let events = EventRecorder::attach(&repo);
//!     let states = StateRecorder::attach(&repo);
//!
//!     repo.start(1).unwrap();
//!     settle().await;
//!
//!     assert_eq!(events.success().await, vec![7]);
//!     assert_eq!(states.snapshots().await.len(), 3);
//! }
//! ```

use futures::StreamExt;
use recall_core::{CallStream, Repository, RepositoryData};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};

/// Collects every event fired on a repository's discrete channels.
///
/// Attach *before* triggering actions; the channels do not replay. Each
/// channel is drained by a background task, so recorded vectors are
/// eventually consistent — await [`settle`] (or sleep) before asserting.
pub struct EventRecorder<P, S, E> {
    start: Arc<Mutex<Vec<P>>>,
    progress: Arc<Mutex<Vec<f64>>>,
    success: Arc<Mutex<Vec<S>>>,
    success_cached: Arc<Mutex<Vec<S>>>,
    error: Arc<Mutex<Vec<E>>>,
    cancel: Arc<Mutex<Vec<()>>>,
    reset: Arc<Mutex<Vec<()>>>,
}

impl<P, S, E> EventRecorder<P, S, E>
where
    P: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Subscribe to all seven channels of `repository` and start recording.
    #[must_use]
    pub fn attach(repository: &Repository<P, S, E>) -> Self {
        let events = repository.events();
        Self {
            start: record(events.start()),
            progress: record(events.progress()),
            success: record(events.success()),
            success_cached: record(events.success_cached()),
            error: record(events.error()),
            cancel: record(events.cancel()),
            reset: record(events.reset()),
        }
    }

    /// Payloads seen on the `start` channel.
    pub async fn start(&self) -> Vec<P> {
        self.start.lock().await.clone()
    }

    /// Values seen on the `progress` channel.
    pub async fn progress(&self) -> Vec<f64> {
        self.progress.lock().await.clone()
    }

    /// Values seen on the `success` channel.
    pub async fn success(&self) -> Vec<S> {
        self.success.lock().await.clone()
    }

    /// Values seen on the `success_cached` channel.
    pub async fn success_cached(&self) -> Vec<S> {
        self.success_cached.lock().await.clone()
    }

    /// Values seen on the `error` channel.
    pub async fn error(&self) -> Vec<E> {
        self.error.lock().await.clone()
    }

    /// Number of `cancel` action events seen.
    pub async fn cancel_count(&self) -> usize {
        self.cancel.lock().await.len()
    }

    /// Number of `reset` action events seen.
    pub async fn reset_count(&self) -> usize {
        self.reset.lock().await.len()
    }
}

fn record<T>(mut rx: broadcast::Receiver<T>) -> Arc<Mutex<Vec<T>>>
where
    T: Clone + Send + 'static,
{
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(value) => sink.lock().await.push(value),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    log
}

/// Collects every state snapshot a repository publishes, starting with the
/// snapshot current at attach time.
pub struct StateRecorder<S, E> {
    snapshots: Arc<Mutex<Vec<RepositoryData<S, E>>>>,
}

impl<S, E> StateRecorder<S, E>
where
    S: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Subscribe to the state cell of `repository` and start recording.
    #[must_use]
    pub fn attach<P>(repository: &Repository<P, S, E>) -> Self
    where
        P: Clone + Send + Sync + 'static,
    {
        let mut rx = repository.watch();
        let initial = rx.borrow_and_update().clone();
        let snapshots = Arc::new(Mutex::new(vec![initial]));
        let sink = Arc::clone(&snapshots);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                sink.lock().await.push(snapshot);
            }
        });
        Self { snapshots }
    }

    /// Every snapshot observed so far, in publication order.
    pub async fn snapshots(&self) -> Vec<RepositoryData<S, E>> {
        self.snapshots.lock().await.clone()
    }

    /// The most recent snapshot observed.
    pub async fn latest(&self) -> Option<RepositoryData<S, E>> {
        self.snapshots.lock().await.last().cloned()
    }
}

/// A caller stream that immediately yields `item` as the terminal result.
#[must_use]
pub fn respond_once<R>(item: R) -> CallStream<R>
where
    R: Send + 'static,
{
    futures::stream::once(async move { Ok(item) }).boxed()
}

/// A caller stream yielding `items` in order (the last one terminal, the
/// earlier ones typically classified as progress).
#[must_use]
pub fn respond_with<R>(items: Vec<R>) -> CallStream<R>
where
    R: Send + 'static,
{
    futures::stream::iter(items.into_iter().map(Ok)).boxed()
}

/// A caller stream that sleeps for `delay` before yielding `item`.
#[must_use]
pub fn respond_after<R>(delay: Duration, item: R) -> CallStream<R>
where
    R: Send + 'static,
{
    Box::pin(async_stream::stream! {
        tokio::time::sleep(delay).await;
        yield Ok(item);
    })
}

/// A caller stream that immediately fails with `message`.
#[must_use]
pub fn fail_with<R>(message: impl Into<String>) -> CallStream<R>
where
    R: Send + 'static,
{
    let message = message.into();
    futures::stream::once(async move { Err(anyhow::anyhow!(message)) }).boxed()
}

/// A caller stream that never yields anything (a call that hangs).
#[must_use]
pub fn never<R>() -> CallStream<R>
where
    R: Send + 'static,
{
    futures::stream::pending().boxed()
}

/// A caller stream that completes without producing any item.
#[must_use]
pub fn exhausted<R>() -> CallStream<R>
where
    R: Send + 'static,
{
    futures::stream::empty().boxed()
}

/// Give the dispatcher and recorder tasks time to drain.
///
/// Under a paused clock this advances virtual time, so it stays cheap and
/// deterministic in `start_paused` tests.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
