//! The merged state snapshot published by a repository.
//!
//! [`RepositoryData`] is a value: every state transition produces a fresh
//! snapshot and the previous one is discarded. Published snapshots are never
//! mutated, which is what lets late subscribers read a consistent view the
//! moment they subscribe.

/// One immutable snapshot of the combined repository state.
///
/// The four derived lifecycle states (idle / pending / succeeded / failed)
/// are not stored directly; they are all readable off this snapshot. That is
/// a deliberate choice: it lets `data` from an earlier success persist across
/// a later failure.
///
/// # Examples
///
/// ```
/// use recall_core::RepositoryData;
///
/// let snap: RepositoryData<u32, String> = RepositoryData::default();
/// assert_eq!(snap.data, None);
/// assert!(!snap.is_pending);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryData<S, E> {
    /// Last successful result (post success-handler), or `None` before the
    /// first success.
    pub data: Option<S>,

    /// Latest progress value reported by the in-flight call, or `None` when
    /// no call is running or the call has not reported progress.
    pub progress: Option<f64>,

    /// True strictly while a call is in flight: from acceptance of `start`
    /// until terminal resolution, cancellation or supersession.
    pub is_pending: bool,

    /// Last normalized error. Cleared by `clean_error` and by the next
    /// accepted `start`.
    pub error: Option<E>,
}

impl<S, E> RepositoryData<S, E> {
    /// Create an empty snapshot (no data, no error, not pending).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            data: None,
            progress: None,
            is_pending: false,
            error: None,
        }
    }

    /// Create a snapshot seeded with initial data.
    ///
    /// Used at construction when `init_data` is configured, and by `reset`
    /// when re-seeding is enabled.
    #[must_use]
    pub const fn seeded(data: Option<S>) -> Self {
        Self {
            data,
            progress: None,
            is_pending: false,
            error: None,
        }
    }

    /// Whether the snapshot carries an error.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

impl<S, E> Default for RepositoryData<S, E> {
    fn default() -> Self {
        Self::empty()
    }
}
