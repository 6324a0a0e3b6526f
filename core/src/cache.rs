//! Cache policy: payload comparison and validity bookkeeping.
//!
//! The policy is resolved once at construction into an optional
//! [`CachePredicate`] (see [`RepositoryConfig`](crate::RepositoryConfig));
//! this module owns the per-instance bookkeeping the dispatcher consults on
//! every accepted `start`.
//!
//! Two pieces of state deliberately move at different times:
//!
//! - the **previous accepted payload** tracks *attempts* — it is recorded on
//!   every dispatched `start`, success or failure, and never on a cache hit;
//! - the **last success instant** refreshes only on a successful resolution.
//!
//! A hit therefore requires a matching previous attempt *and* a success
//! within the validity window.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Compares the previous accepted payload against a new one; `true` means
/// the cached `data` may be reused.
pub type CachePredicate<P> = Arc<dyn Fn(&P, &P) -> bool + Send + Sync>;

/// Mutable cache bookkeeping, owned by the dispatcher (single writer).
pub(crate) struct CacheState<P> {
    previous_payload: Option<P>,
    last_success: Option<Instant>,
}

impl<P> CacheState<P> {
    pub(crate) const fn new() -> Self {
        Self {
            previous_payload: None,
            last_success: None,
        }
    }

    /// Decide whether `next` can be served from cache at `now`.
    pub(crate) fn should_reuse(
        &self,
        predicate: Option<&CachePredicate<P>>,
        next: &P,
        timeout: Duration,
        now: Instant,
    ) -> bool {
        let Some(predicate) = predicate else {
            return false;
        };
        let Some(previous) = &self.previous_payload else {
            return false;
        };
        let Some(last_success) = self.last_success else {
            return false;
        };
        predicate(previous, next) && now.duration_since(last_success) <= timeout
    }

    /// Record a dispatched attempt. Called for every accepted `start`,
    /// before its outcome is known.
    pub(crate) fn record_attempt(&mut self, payload: P) {
        self.previous_payload = Some(payload);
    }

    /// Refresh the validity window. Called only on successful resolution.
    pub(crate) fn record_success(&mut self, at: Instant) {
        self.last_success = Some(at);
    }

    /// Forget everything. Called on `reset`.
    pub(crate) fn clear(&mut self) {
        self.previous_payload = None;
        self.last_success = None;
    }
}
