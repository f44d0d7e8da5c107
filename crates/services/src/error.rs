//! Shared error types for the services crate.

use std::time::Duration;

use thiserror::Error;

use quiz_core::model::SettingsError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `SettingsService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SettingsServiceError {
    #[error("schedule settings are not configured")]
    NotConfigured,
    #[error(transparent)]
    Invalid(#[from] SettingsError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `SelectionEngine`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SelectionError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `RepetitionPlanner`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlannerError {
    #[error("no questions available for the learner's groups")]
    NoEligibleQuestions,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors raised by a delivery channel.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeliveryError {
    #[error("delivery rejected: {0}")]
    Rejected(String),
    #[error("delivery channel unavailable: {0}")]
    Unavailable(String),
    #[error("delivery timed out after {0:?}")]
    TimedOut(Duration),
}

/// Errors emitted by the dispatch scheduler for a single learner or the loop.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DispatchError {
    #[error(transparent)]
    Planner(#[from] PlannerError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("dispatch task failed: {0}")]
    Join(String),
}

/// Errors emitted by session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session max_count must be at least 1")]
    InvalidMaxCount,
    #[error("session time limit must be positive")]
    InvalidMaxTime,
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Settings(#[from] SettingsServiceError),
}
