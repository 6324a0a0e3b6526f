//! Construction-time configuration for a [`Repository`](crate::Repository).
//!
//! A [`RepositoryConfig`] is built once with chained `with_*` setters and
//! is immutable after
//! [`Repository::new`](crate::Repository::new); there is no runtime
//! reconfiguration. Which handlers are present is resolved here, at
//! construction, into explicit optional slots — the dispatch pipeline never
//! inspects anything at runtime.
//!
//! Two setters are type-state steps: [`with_success_handler`] changes the
//! success shape `S` away from the raw response `R`, and
//! [`with_error_handler`] changes the error shape `E` away from the default
//! [`CallError`]. Without them, the terminal item is used verbatim as `data`
//! and the raw error is passed through.
//!
//! [`with_success_handler`]: RepositoryConfig::with_success_handler
//! [`with_error_handler`]: RepositoryConfig::with_error_handler

use crate::cache::CachePredicate;
use crate::error::CallError;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;

/// The stream of response items produced by one caller invocation.
///
/// Items are `Ok(response)` values; a stream-level failure surfaces as a
/// single `Err` carrying the raw error, after which the call is resolved as
/// failed and the stream is dropped.
pub type CallStream<R> = BoxStream<'static, Result<R, anyhow::Error>>;

/// The caller: the externally supplied function that executes the request.
///
/// The repository makes no assumptions about the caller's transport or
/// internal retries; its stream's lifetime is scoped to one dispatch cycle
/// and it is dropped on supersession, cancellation, reset and close.
pub type Caller<P, R> = Arc<dyn Fn(P) -> CallStream<R> + Send + Sync>;

/// Folds a terminal response item (plus prior data and the payload that
/// started the call) into the new `data` value.
pub type SuccessHandler<P, R, S> = Arc<dyn Fn(R, Option<&S>, &P) -> S + Send + Sync>;

/// Normalizes a raw stream error into the configured error shape.
pub type ErrorHandler<E> = Arc<dyn Fn(anyhow::Error) -> E + Send + Sync>;

/// Classifies a response item: `Some(progress)` keeps the call pending,
/// `None` marks the terminal item.
pub type ProgressHandler<R> = Arc<dyn Fn(&R) -> Option<f64> + Send + Sync>;

/// Cache validity window applied when no explicit timeout is configured.
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default buffer capacity of each discrete event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 16;

/// Static configuration for a repository, created once per instance.
///
/// # Type Parameters
///
/// - `P`: payload accepted by `start` (use `()` for payloadless calls)
/// - `R`: raw response item emitted by the caller stream
/// - `S`: success shape stored in `data` (defaults to `R`)
/// - `E`: normalized error shape (defaults to [`CallError`])
///
/// # Example
///
/// ```ignore
/// let config = RepositoryConfig::new(|id: u64| http.fetch_user(id))
///     .with_cache()
///     .with_cache_timeout(Duration::from_secs(30))
///     .with_success_handler(|user, _prev, _id| UserView::from(user));
/// let repo = Repository::new(config);
/// ```
pub struct RepositoryConfig<P, R, S, E> {
    pub(crate) caller: Caller<P, R>,
    pub(crate) init_data: Option<S>,
    pub(crate) cache_predicate: Option<CachePredicate<P>>,
    pub(crate) cache_timeout: Duration,
    pub(crate) progress_handler: Option<ProgressHandler<R>>,
    pub(crate) success_handler: SuccessHandler<P, R, S>,
    pub(crate) error_handler: ErrorHandler<E>,
    pub(crate) reset_to_init: bool,
    pub(crate) event_capacity: usize,
}

impl<P, R> RepositoryConfig<P, R, R, CallError>
where
    R: Send + 'static,
{
    /// Create a configuration from the caller alone.
    ///
    /// Defaults: no caching, 5 s cache window, no progress handler, the
    /// terminal item used verbatim as `data`, raw errors passed through as
    /// [`CallError`], reset yields the empty snapshot, event capacity 16.
    #[must_use]
    pub fn new(caller: impl Fn(P) -> CallStream<R> + Send + Sync + 'static) -> Self {
        Self {
            caller: Arc::new(caller),
            init_data: None,
            cache_predicate: None,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            progress_handler: None,
            success_handler: Arc::new(|item, _prev, _payload| item),
            error_handler: Arc::new(CallError::new),
            reset_to_init: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl<P, R, S, E> RepositoryConfig<P, R, S, E> {
    /// Seed `data` with an initial value, visible before any call completes.
    #[must_use]
    pub fn with_init_data(mut self, data: S) -> Self {
        self.init_data = Some(data);
        self
    }

    /// Enable the default cache policy: structural equality between the
    /// previous accepted payload and the new one.
    ///
    /// Mutually alternative to [`with_should_cache`](Self::with_should_cache);
    /// whichever is called last wins.
    #[must_use]
    pub fn with_cache(mut self) -> Self
    where
        P: PartialEq + Send + Sync + 'static,
    {
        self.cache_predicate = Some(Arc::new(|prev: &P, next: &P| prev == next));
        self
    }

    /// Install a custom cache predicate comparing the previous accepted
    /// payload against the new one.
    #[must_use]
    pub fn with_should_cache(
        mut self,
        predicate: impl Fn(&P, &P) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.cache_predicate = Some(Arc::new(predicate));
        self
    }

    /// Set the cache validity window, measured from the last successful
    /// resolution. Default: [`DEFAULT_CACHE_TIMEOUT`].
    #[must_use]
    pub const fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    /// Install the progress classifier. Items mapping to `Some(value)` are
    /// progress notifications; the first item mapping to `None` is terminal.
    /// Without a handler every item is terminal.
    #[must_use]
    pub fn with_progress_handler(
        mut self,
        handler: impl Fn(&R) -> Option<f64> + Send + Sync + 'static,
    ) -> Self {
        self.progress_handler = Some(Arc::new(handler));
        self
    }

    /// Make `reset()` re-seed `data` with `init_data` instead of yielding
    /// the empty snapshot. Default: `false`.
    #[must_use]
    pub const fn with_reset_to_init(mut self, reset_to_init: bool) -> Self {
        self.reset_to_init = reset_to_init;
        self
    }

    /// Set the buffer capacity of the discrete event channels. Slow
    /// subscribers past this buffer skip old events (they lag, they do not
    /// block the pipeline). Default: [`DEFAULT_EVENT_CAPACITY`].
    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Install the success fold, changing the success shape to `S2`.
    ///
    /// The handler receives the terminal item, the previous `data` (if any)
    /// and the payload that started the call. Any `init_data` configured for
    /// the old shape is discarded; set it after this call.
    #[must_use]
    pub fn with_success_handler<S2>(
        self,
        handler: impl Fn(R, Option<&S2>, &P) -> S2 + Send + Sync + 'static,
    ) -> RepositoryConfig<P, R, S2, E> {
        RepositoryConfig {
            caller: self.caller,
            init_data: None,
            cache_predicate: self.cache_predicate,
            cache_timeout: self.cache_timeout,
            progress_handler: self.progress_handler,
            success_handler: Arc::new(handler),
            error_handler: self.error_handler,
            reset_to_init: self.reset_to_init,
            event_capacity: self.event_capacity,
        }
    }

    /// Install the error normalizer, changing the error shape to `E2`.
    ///
    /// Without it, raw errors pass through as [`CallError`].
    #[must_use]
    pub fn with_error_handler<E2>(
        self,
        handler: impl Fn(anyhow::Error) -> E2 + Send + Sync + 'static,
    ) -> RepositoryConfig<P, R, S, E2> {
        RepositoryConfig {
            caller: self.caller,
            init_data: self.init_data,
            cache_predicate: self.cache_predicate,
            cache_timeout: self.cache_timeout,
            progress_handler: self.progress_handler,
            success_handler: self.success_handler,
            error_handler: Arc::new(handler),
            reset_to_init: self.reset_to_init,
            event_capacity: self.event_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use futures::StreamExt;

    fn noop_config() -> RepositoryConfig<u32, u32, u32, CallError> {
        RepositoryConfig::new(|_payload: u32| futures::stream::empty().boxed())
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = noop_config();
        assert_eq!(config.cache_timeout, DEFAULT_CACHE_TIMEOUT);
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert!(config.cache_predicate.is_none());
        assert!(config.progress_handler.is_none());
        assert!(config.init_data.is_none());
        assert!(!config.reset_to_init);
    }

    #[test]
    fn default_success_handler_is_identity() {
        let config = noop_config();
        let folded = (config.success_handler)(41, None, &0);
        assert_eq!(folded, 41);
    }

    #[test]
    fn default_error_handler_passes_the_raw_error_through() {
        let config = noop_config();
        let err = (config.error_handler)(anyhow::anyhow!("raw"));
        assert_eq!(err.to_string(), "raw");
    }

    #[test]
    fn structural_cache_predicate_compares_payloads() {
        let config = noop_config().with_cache();
        let predicate = config.cache_predicate.unwrap();
        assert!(predicate(&3, &3));
        assert!(!predicate(&3, &4));
    }

    #[test]
    fn last_installed_cache_predicate_wins() {
        let config = noop_config().with_cache().with_should_cache(|_, _| false);
        let predicate = config.cache_predicate.unwrap();
        assert!(!predicate(&3, &3));
    }

    #[test]
    fn success_handler_changes_the_stored_shape() {
        let config = noop_config()
            .with_success_handler(|item, prev: Option<&String>, payload| {
                format!("{item}/{payload}/{}", prev.map_or(0, String::len))
            })
            .with_init_data("seed".to_string());
        let folded = (config.success_handler)(9, Some(&"abc".to_string()), &7);
        assert_eq!(folded, "9/7/3");
        assert_eq!(config.init_data.as_deref(), Some("seed"));
    }
}
