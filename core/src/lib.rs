//! # Recall Core
//!
//! A **reactive async-call state container**: given a caller function that
//! performs a request and returns a stream of results, a [`Repository`]
//! manages the lifecycle of one logical in-flight operation — start,
//! progress, success, error, cancellation, reset — and exposes both a
//! single merged state snapshot and discrete event streams for each
//! transition. It is meant for client code that must render the current
//! status of a remote call (idle / pending / success / error) without
//! hand-rolling flags.
//!
//! ## Architecture
//!
//! ```text
//!   actions: start / reset / cancel / clean_error / close
//!        │                                  (synchronous: trigger event
//!        ▼                                   + command enqueue)
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Dispatcher task (single writer)                             │
//! │  - cache policy: payload predicate + validity window        │
//! │  - at most one in-flight caller stream (drop = abort)       │
//! │  - state machine: pending → progress* → success | error     │
//! └──────┬───────────────────────────────┬──────────────────────┘
//!        ▼                               ▼
//!  watch channel                   broadcast channels
//!  (replaying snapshot,            (start, progress, success,
//!   RepositoryData)                 success_cached, error,
//!                                   cancel, reset — non-replaying)
//! ```
//!
//! At most one call is active at a time: a newly accepted `start`
//! supersedes any earlier in-flight call by dropping its stream before the
//! new dispatch begins, so a stale call's late items can never reach the
//! state cell.
//!
//! Transport, retries, pagination and persistence are the caller's
//! business; the repository only orchestrates the lifecycle.
//!
//! ## Example
//!
//! ```ignore
//! use recall_core::{Repository, RepositoryConfig};
//!
//! let repo = Repository::new(
//!     RepositoryConfig::new(|query: String| search_api.run(query))
//!         .with_cache()
//!         .with_cache_timeout(std::time::Duration::from_secs(30)),
//! );
//!
//! let mut state = repo.watch();
//! repo.start("rust".to_string())?;
//! while state.changed().await.is_ok() {
//!     render(&*state.borrow());
//! }
//! ```

/// Cache policy: payload comparison and validity bookkeeping.
pub mod cache;

/// Construction-time configuration and handler seams.
pub mod config;

/// The merged state snapshot.
pub mod data;

/// Error types for the repository surface.
pub mod error;

/// Discrete, non-replaying event channels.
pub mod events;

/// The repository: action surface, state cell and dispatch pipeline.
pub mod repository;

pub use cache::CachePredicate;
pub use config::{
    CallStream, Caller, DEFAULT_CACHE_TIMEOUT, DEFAULT_EVENT_CAPACITY, ErrorHandler,
    ProgressHandler, RepositoryConfig, SuccessHandler,
};
pub use data::RepositoryData;
pub use error::{CallError, RepositoryError};
pub use events::EventChannels;
pub use repository::Repository;
