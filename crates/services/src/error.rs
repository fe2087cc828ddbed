//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use watch_core::model::{ProgressError, StreakError, VideoError};

/// Errors emitted by `ProgressTracker`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProgressServiceError {
    /// The caller supplied bad input.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Progress(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::NotFound))
    }
}

/// Errors emitted by `StreakEngine`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StreakServiceError {
    #[error(transparent)]
    Streak(#[from] StreakError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StreakServiceError {
    /// The caller supplied bad input.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Streak(StreakError::InvalidWatchTime(_)))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::NotFound))
    }
}

/// Errors emitted by `VideoLibrary`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VideoServiceError {
    #[error(transparent)]
    Video(#[from] VideoError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl VideoServiceError {
    /// The caller supplied bad input, including a duplicate library entry.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Video(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::NotFound))
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}

/// Logs a storage failure before it is propagated to the caller.
pub(crate) fn log_storage_error(op: &'static str) -> impl Fn(&StorageError) {
    move |err| tracing::warn!(op, error = %err, "storage operation failed")
}
