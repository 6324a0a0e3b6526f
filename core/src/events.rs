//! Discrete, non-replaying event channels.
//!
//! Every repository instance owns seven broadcast channels, one per
//! transition. Subscribing late yields nothing until the next future event;
//! only the state cell replays. Slow subscribers lag past the buffer and
//! skip old events — they never block the dispatch pipeline.

use tokio::sync::broadcast;

/// The set of discrete notification channels of one repository instance.
///
/// `cancel` and `reset` carry the triggering action itself (unit payloads),
/// not a terminal resolution; the other channels carry the transition value.
pub struct EventChannels<P, S, E> {
    pub(crate) start: broadcast::Sender<P>,
    pub(crate) progress: broadcast::Sender<f64>,
    pub(crate) success: broadcast::Sender<S>,
    pub(crate) success_cached: broadcast::Sender<S>,
    pub(crate) error: broadcast::Sender<E>,
    pub(crate) cancel: broadcast::Sender<()>,
    pub(crate) reset: broadcast::Sender<()>,
}

impl<P, S, E> EventChannels<P, S, E>
where
    P: Clone,
    S: Clone,
    E: Clone,
{
    pub(crate) fn new(capacity: usize) -> Self {
        let (start, _) = broadcast::channel(capacity);
        let (progress, _) = broadcast::channel(capacity);
        let (success, _) = broadcast::channel(capacity);
        let (success_cached, _) = broadcast::channel(capacity);
        let (error, _) = broadcast::channel(capacity);
        let (cancel, _) = broadcast::channel(capacity);
        let (reset, _) = broadcast::channel(capacity);
        Self {
            start,
            progress,
            success,
            success_cached,
            error,
            cancel,
            reset,
        }
    }

    /// Subscribe to accepted-and-cached `start` calls (every call, with its
    /// payload).
    #[must_use]
    pub fn start(&self) -> broadcast::Receiver<P> {
        self.start.subscribe()
    }

    /// Subscribe to progress notifications of the in-flight call.
    #[must_use]
    pub fn progress(&self) -> broadcast::Receiver<f64> {
        self.progress.subscribe()
    }

    /// Subscribe to successful terminal resolutions (post success-handler).
    #[must_use]
    pub fn success(&self) -> broadcast::Receiver<S> {
        self.success.subscribe()
    }

    /// Subscribe to cache hits republishing the existing `data`.
    #[must_use]
    pub fn success_cached(&self) -> broadcast::Receiver<S> {
        self.success_cached.subscribe()
    }

    /// Subscribe to failed terminal resolutions (post error-handler).
    #[must_use]
    pub fn error(&self) -> broadcast::Receiver<E> {
        self.error.subscribe()
    }

    /// Subscribe to `cancel` action events.
    #[must_use]
    pub fn cancel(&self) -> broadcast::Receiver<()> {
        self.cancel.subscribe()
    }

    /// Subscribe to `reset` action events.
    #[must_use]
    pub fn reset(&self) -> broadcast::Receiver<()> {
        self.reset.subscribe()
    }
}

impl<P, S, E> Clone for EventChannels<P, S, E> {
    fn clone(&self) -> Self {
        Self {
            start: self.start.clone(),
            progress: self.progress.clone(),
            success: self.success.clone(),
            success_cached: self.success_cached.clone(),
            error: self.error.clone(),
            cancel: self.cancel.clone(),
            reset: self.reset.clone(),
        }
    }
}
