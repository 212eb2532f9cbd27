use thiserror::Error;

use crate::models::ContentKey;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote catalog unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Malformed catalog response: {0}")]
    MalformedResponse(String),

    #[error("Content not found: {0}")]
    NotFound(ContentKey),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("List not found: {0}")]
    ListNotFound(String),

    #[error("Rating must be between 0 and 10, got {0}")]
    InvalidRating(f32),

    #[error("Invalid list: {0}")]
    InvalidList(String),

    #[error("Unknown content kind: {0}")]
    InvalidKind(String),

    #[error("Invalid episode: {0}")]
    InvalidEpisode(String),
}

impl SyncError {
    /// True for failures that originate from the remote catalog service.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SyncError::RemoteUnavailable(_) | SyncError::MalformedResponse(_)
        )
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
