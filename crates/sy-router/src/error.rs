use thiserror::Error;

use sy_common::ConfigError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core is already initialized")]
    AlreadyInitialized,

    #[error("Core is not initialized")]
    NotInitialized,

    #[error("Core is shutting down")]
    ShuttingDown,

    #[error("Work item already in flight: {id}")]
    DuplicateWorkItem { id: String },

    #[error("Unknown work item: {id}")]
    UnknownWorkItem { id: String },

    #[error("Core task is no longer running")]
    CoreUnavailable,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CoreError {
    pub fn duplicate(id: impl Into<String>) -> Self {
        Self::DuplicateWorkItem { id: id.into() }
    }

    pub fn unknown(id: impl Into<String>) -> Self {
        Self::UnknownWorkItem { id: id.into() }
    }
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Worker directory unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification rejected with status {status}")]
    Rejected { status: u16 },

    #[error("Notification channel error: {0}")]
    Channel(String),
}
