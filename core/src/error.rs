//! Error types for the repository surface.
//!
//! Operational failures never escape as panics: stream errors and caller
//! panics are normalized through the configured error handler and surface
//! exclusively via the `error` event channel and the `error` field of the
//! snapshot. The types here cover the two remaining concerns: the action
//! surface after [`close`](crate::Repository::close), and the default
//! normalized error shape.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by the repository action surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The repository has been closed and no longer accepts actions.
    ///
    /// `close()` is terminal: once it returns, every channel is silent and
    /// every action fails with this error.
    #[error("Repository is closed")]
    Closed,
}

/// Default normalized error shape: the raw caller error, shared.
///
/// When no error handler is configured, the raw [`anyhow::Error`] produced
/// by the caller stream is passed through wrapped in an `Arc` so snapshots
/// and event channels can clone it freely.
#[derive(Clone)]
pub struct CallError(Arc<anyhow::Error>);

impl CallError {
    /// Wrap a raw caller error.
    #[must_use]
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    /// Borrow the underlying raw error.
    #[must_use]
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl std::error::Error for CallError {}

impl From<anyhow::Error> for CallError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error)
    }
}

/// Errors compare by message. Raw errors carry no structural identity once
/// normalized, and snapshot equality in tests needs something stable.
impl PartialEq for CallError {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_string() == other.0.to_string()
    }
}
