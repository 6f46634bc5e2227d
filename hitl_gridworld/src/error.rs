//! Error taxonomy shared by the environment, agent and feedback store.

use std::path::PathBuf;

/// Errors raised by the learning core.
///
/// Configuration, state and action errors are caller bugs and are never
/// recovered inside the crate. Persistence errors are handled locally by the
/// feedback store and only surface through [`crate::feedback::FeedbackStore::try_save`].
#[derive(thiserror::Error, Debug)]
pub enum GridError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid action: {0} (expected 0=up, 1=down, 2=left, 3=right)")]
    InvalidAction(usize),

    #[error("invalid feedback label: {0} (expected +1 or -1)")]
    InvalidFeedbackLabel(i64),

    #[error("feedback persistence failed for {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GridError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}

/// Convenience alias for results using [`GridError`].
pub type Result<T> = std::result::Result<T, GridError>;
