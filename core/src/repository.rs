//! The repository: action surface, state cell and dispatch pipeline.
//!
//! A [`Repository`] manages one logical in-flight operation. Actions are
//! synchronous: they broadcast their trigger event and enqueue a command for
//! the dispatcher task. The dispatcher is the *only* writer of the state
//! cell — it owns the command receiver, the in-flight stream, and the cache
//! bookkeeping, so interleaved actions can never produce a partial snapshot.
//!
//! Supersession and cancellation both work by dropping the in-flight
//! stream: an unconditional unsubscription, never a flag check. Once a
//! stream is dropped, none of its late items can reach the state cell,
//! because the dispatcher is the only task that ever polls it.

use crate::cache::{CachePredicate, CacheState};
use crate::config::{
    CallStream, Caller, ErrorHandler, ProgressHandler, RepositoryConfig, SuccessHandler,
};
use crate::data::RepositoryData;
use crate::error::RepositoryError;
use crate::events::EventChannels;
use futures::StreamExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Commands flowing from the action surface to the dispatcher.
enum Command<P> {
    Start(P),
    Cancel,
    Reset,
    CleanError,
    Close,
}

/// A reactive async-call state container.
///
/// Wraps a caller function `payload -> stream<response>` and manages the
/// lifecycle of one logical request: start, progress, success, error,
/// cancellation, reset. Exposes a replaying state snapshot via [`watch`]
/// and discrete per-transition channels via [`events`].
///
/// At most one call is active at a time: a newly accepted `start` always
/// supersedes (aborts) an earlier in-flight call before dispatching.
///
/// # Type Parameters
///
/// - `P`: payload accepted by `start`
/// - `S`: success shape stored in `data`
/// - `E`: normalized error shape
///
/// # Example
///
/// ```ignore
/// let repo = Repository::new(
///     RepositoryConfig::new(|id: u64| api.fetch(id)).with_cache(),
/// );
///
/// let mut state = repo.watch();
/// repo.start(42)?;
/// state.changed().await?; // pending
/// state.changed().await?; // resolved
/// let snapshot = state.borrow().clone();
/// ```
///
/// [`watch`]: Repository::watch
/// [`events`]: Repository::events
pub struct Repository<P, S, E> {
    events: EventChannels<P, S, E>,
    state: Arc<watch::Sender<RepositoryData<S, E>>>,
    commands: mpsc::UnboundedSender<Command<P>>,
    closed: Arc<AtomicBool>,
}

impl<P, S, E> Repository<P, S, E>
where
    P: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a repository and spawn its dispatcher task.
    ///
    /// The configuration is consumed and immutable from here on.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime (the dispatcher is spawned
    /// onto the current runtime).
    #[must_use]
    pub fn new<R>(config: RepositoryConfig<P, R, S, E>) -> Self
    where
        R: Send + 'static,
    {
        let events = EventChannels::new(config.event_capacity);
        let state = Arc::new(watch::Sender::new(RepositoryData::seeded(
            config.init_data.clone(),
        )));
        let (commands, command_rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher {
            commands: command_rx,
            state: Arc::clone(&state),
            events: events.clone(),
            caller: config.caller,
            success_handler: config.success_handler,
            error_handler: config.error_handler,
            progress_handler: config.progress_handler,
            cache_predicate: config.cache_predicate,
            cache_timeout: config.cache_timeout,
            init_data: config.init_data,
            reset_to_init: config.reset_to_init,
            cache: CacheState::new(),
            in_flight: None,
        };
        tokio::spawn(dispatcher.run());

        Self {
            events,
            state,
            commands,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Admit a new logical request.
    ///
    /// Broadcasts the payload on the `start` channel and hands it to the
    /// dispatcher, which either serves it from cache (republishing the
    /// current `data` on `success_cached`, with no pending flash) or
    /// supersedes any in-flight call and invokes the caller. The pending
    /// snapshot for an accepted start is always published strictly before
    /// that call's terminal snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Closed`] after [`close`](Self::close).
    pub fn start(&self, payload: P) -> Result<(), RepositoryError> {
        self.ensure_open()?;
        metrics::counter!("repository.actions.start").increment(1);
        let _ = self.events.start.send(payload.clone());
        self.send(Command::Start(payload))
    }

    /// Abort any in-flight call without touching `data` or `error`.
    ///
    /// The abandoned attempt emits no terminal event; `is_pending` settles
    /// back to `false` and `progress` clears.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Closed`] after [`close`](Self::close).
    pub fn cancel(&self) -> Result<(), RepositoryError> {
        self.ensure_open()?;
        metrics::counter!("repository.actions.cancel").increment(1);
        let _ = self.events.cancel.send(());
        self.send(Command::Cancel)
    }

    /// Abort any in-flight call and replace the whole snapshot with the
    /// construction-time default.
    ///
    /// Cache bookkeeping is cleared too: a repeated payload after `reset`
    /// always dispatches fresh. With
    /// [`with_reset_to_init`](RepositoryConfig::with_reset_to_init) the
    /// snapshot is re-seeded with `init_data` instead of emptied.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Closed`] after [`close`](Self::close).
    pub fn reset(&self) -> Result<(), RepositoryError> {
        self.ensure_open()?;
        metrics::counter!("repository.actions.reset").increment(1);
        let _ = self.events.reset.send(());
        self.send(Command::Reset)
    }

    /// Clear `error` from the current snapshot, leaving `data`, `progress`
    /// and `is_pending` untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Closed`] after [`close`](Self::close).
    pub fn clean_error(&self) -> Result<(), RepositoryError> {
        self.ensure_open()?;
        self.send(Command::CleanError)
    }

    /// Permanently terminate the repository.
    ///
    /// Terminal and idempotent: the dispatcher stops, any in-flight call is
    /// abandoned, no channel emits again, and every subsequent action fails
    /// with [`RepositoryError::Closed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("closing repository");
        let _ = self.commands.send(Command::Close);
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Subscribe to the state cell.
    ///
    /// The receiver replays the current snapshot immediately and yields a
    /// change notification for every subsequent snapshot.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<RepositoryData<S, E>> {
        self.state.subscribe()
    }

    /// Read the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> RepositoryData<S, E> {
        self.state.borrow().clone()
    }

    /// The discrete event channels. Non-replaying: subscribing late yields
    /// nothing until the next future event.
    #[must_use]
    pub const fn events(&self) -> &EventChannels<P, S, E> {
        &self.events
    }

    fn ensure_open(&self) -> Result<(), RepositoryError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RepositoryError::Closed);
        }
        Ok(())
    }

    fn send(&self, command: Command<P>) -> Result<(), RepositoryError> {
        self.commands.send(command).map_err(|_| RepositoryError::Closed)
    }
}

/// One dispatched call: the accepted payload and its live stream.
struct InFlight<P, R> {
    payload: P,
    stream: CallStream<R>,
}

/// What one turn of the dispatcher loop produced.
enum Step<P, R> {
    Command(Option<Command<P>>),
    Item(Option<Result<R, anyhow::Error>>),
}

/// The single writer of the state cell.
struct Dispatcher<P, R, S, E> {
    commands: mpsc::UnboundedReceiver<Command<P>>,
    state: Arc<watch::Sender<RepositoryData<S, E>>>,
    events: EventChannels<P, S, E>,
    caller: Caller<P, R>,
    success_handler: SuccessHandler<P, R, S>,
    error_handler: ErrorHandler<E>,
    progress_handler: Option<ProgressHandler<R>>,
    cache_predicate: Option<CachePredicate<P>>,
    cache_timeout: Duration,
    init_data: Option<S>,
    reset_to_init: bool,
    cache: CacheState<P>,
    in_flight: Option<InFlight<P, R>>,
}

impl<P, R, S, E> Dispatcher<P, R, S, E>
where
    P: Clone + Send + Sync + 'static,
    R: Send + 'static,
    S: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    async fn run(mut self) {
        loop {
            // Biased: queued commands always beat a racing stream item, so a
            // cancel/reset/start issued before this turn wins over late
            // arrivals from the call it abandons.
            let step = tokio::select! {
                biased;
                command = self.commands.recv() => Step::Command(command),
                item = Self::next_item(&mut self.in_flight), if self.in_flight.is_some() => {
                    Step::Item(item)
                }
            };

            match step {
                Step::Command(None) | Step::Command(Some(Command::Close)) => break,
                Step::Command(Some(Command::Start(payload))) => self.handle_start(payload).await,
                Step::Command(Some(Command::Cancel)) => self.handle_cancel().await,
                Step::Command(Some(Command::Reset)) => self.handle_reset().await,
                Step::Command(Some(Command::CleanError)) => {
                    self.publish(|snapshot| snapshot.error = None).await;
                }
                Step::Item(item) => self.handle_item(item).await,
            }
        }
        tracing::debug!("dispatcher stopped");
    }

    async fn next_item(
        in_flight: &mut Option<InFlight<P, R>>,
    ) -> Option<Result<R, anyhow::Error>> {
        match in_flight {
            Some(call) => call.stream.next().await,
            // Unreachable behind the select guard; never resolves.
            None => std::future::pending().await,
        }
    }

    async fn handle_start(&mut self, payload: P) {
        let now = Instant::now();
        if self
            .cache
            .should_reuse(self.cache_predicate.as_ref(), &payload, self.cache_timeout, now)
        {
            let cached = self.state.borrow().data.clone();
            if let Some(data) = cached {
                tracing::debug!("start served from cache");
                metrics::counter!("repository.cache_hits").increment(1);
                let _ = self.events.success_cached.send(data);
            }
            return;
        }

        // Supersession: drop any in-flight stream before the new dispatch.
        self.in_flight = None;
        self.cache.record_attempt(payload.clone());
        metrics::counter!("repository.dispatches").increment(1);
        tracing::debug!("start accepted, dispatching");

        self.publish(|snapshot| {
            snapshot.is_pending = true;
            snapshot.progress = None;
            snapshot.error = None;
        })
        .await;

        match catch_panic(|| (self.caller)(payload.clone())) {
            Ok(stream) => {
                self.in_flight = Some(InFlight { payload, stream });
            }
            Err(raw) => {
                // A caller that panics before producing a stream resolves as
                // an immediate error; the pipeline never stays pending.
                tracing::error!(error = %raw, "caller panicked before producing a stream");
                self.resolve_error(raw).await;
            }
        }
    }

    async fn handle_item(&mut self, item: Option<Result<R, anyhow::Error>>) {
        match item {
            Some(Ok(response)) => self.handle_response(response).await,
            Some(Err(raw)) => {
                self.in_flight = None;
                self.resolve_error(raw).await;
            }
            None => {
                // Stream exhausted without a terminal item: resolve as an
                // error rather than keep a call pending forever.
                self.in_flight = None;
                self.resolve_error(anyhow::anyhow!(
                    "call stream ended without a terminal item"
                ))
                .await;
            }
        }
    }

    async fn handle_response(&mut self, response: R) {
        if let Some(handler) = &self.progress_handler {
            match catch_panic(|| handler(&response)) {
                Ok(Some(value)) => {
                    let _ = self.events.progress.send(value);
                    self.publish(|snapshot| snapshot.progress = Some(value)).await;
                    return;
                }
                Ok(None) => {}
                Err(raw) => {
                    tracing::warn!(error = %raw, "progress handler panicked");
                    self.in_flight = None;
                    self.resolve_error(raw).await;
                    return;
                }
            }
        }

        // Terminal item: stop listening even if the stream could emit more.
        let Some(call) = self.in_flight.take() else {
            return;
        };
        let previous = self.state.borrow().data.clone();
        let folded =
            catch_panic(|| (self.success_handler)(response, previous.as_ref(), &call.payload));
        match folded {
            Ok(data) => {
                metrics::counter!("repository.successes").increment(1);
                self.cache.record_success(Instant::now());
                let _ = self.events.success.send(data.clone());
                self.publish(move |snapshot| {
                    snapshot.data = Some(data);
                    snapshot.progress = None;
                    snapshot.is_pending = false;
                    snapshot.error = None;
                })
                .await;
            }
            Err(raw) => {
                tracing::warn!(error = %raw, "success handler panicked");
                self.resolve_error(raw).await;
            }
        }
    }

    async fn handle_cancel(&mut self) {
        if self.in_flight.take().is_some() {
            tracing::debug!("in-flight call canceled");
        }
        let pending = self.state.borrow().is_pending;
        if pending {
            // The abandoned attempt settles without a terminal event; the
            // prior completed call's data/error stay visible.
            self.publish(|snapshot| {
                snapshot.is_pending = false;
                snapshot.progress = None;
            })
            .await;
        }
    }

    async fn handle_reset(&mut self) {
        self.in_flight = None;
        self.cache.clear();
        let snapshot = if self.reset_to_init {
            RepositoryData::seeded(self.init_data.clone())
        } else {
            RepositoryData::empty()
        };
        self.state.send_replace(snapshot);
        tokio::task::yield_now().await;
    }

    /// Error terminal transition: normalize, emit, and write the snapshot
    /// atomically (`is_pending` flips false in the same write that sets
    /// `error`; `data` is preserved).
    async fn resolve_error(&mut self, raw: anyhow::Error) {
        metrics::counter!("repository.errors").increment(1);
        let error = (self.error_handler)(raw);
        let _ = self.events.error.send(error.clone());
        self.publish(move |snapshot| {
            snapshot.error = Some(error);
            snapshot.progress = None;
            snapshot.is_pending = false;
        })
        .await;
    }

    /// Write one snapshot, then yield once so watch subscribers can observe
    /// it before the next write (watch coalesces intermediate values).
    async fn publish(&mut self, update: impl FnOnce(&mut RepositoryData<S, E>)) {
        self.state.send_modify(update);
        tokio::task::yield_now().await;
    }
}

/// Run a user-supplied closure, converting a panic into an error value so
/// the state machine stays total.
fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T, anyhow::Error> {
    std::panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "opaque panic payload".to_string());
        anyhow::anyhow!(message)
    })
}
