use crate::backend::{
    conversation::ConversationError,
    db::Database,
    repo::{chat::ChatRepoError, message::MessageRepoError},
    uploads::UploadError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod conversation;
pub mod db;
pub mod repo;
pub mod title;
pub mod uploads;

#[cfg(test)]
pub(crate) mod test_helpers;

/// Error shape handed to callers outside the backend, e.g. an HTTP layer.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum BackendError {
    #[error("internal error: {0}")]
    Internal(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<ChatRepoError> for BackendError {
    fn from(err: ChatRepoError) -> Self {
        match err {
            ChatRepoError::NotFound(id) => Self::NotFound(format!("chat {id}")),
            ChatRepoError::EmptyTitle => Self::InvalidRequest(err.to_string()),
            ChatRepoError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<MessageRepoError> for BackendError {
    fn from(err: MessageRepoError) -> Self {
        match err {
            MessageRepoError::ChatNotFound(id) => Self::NotFound(format!("chat {id}")),
            MessageRepoError::InvalidPart(_)
            | MessageRepoError::RoleChanged { .. }
            | MessageRepoError::ChatMismatch { .. } => Self::InvalidRequest(err.to_string()),
            MessageRepoError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<ConversationError> for BackendError {
    fn from(err: ConversationError) -> Self {
        match err {
            ConversationError::Chat(e) => e.into(),
            ConversationError::Message(e) => e.into(),
            ConversationError::NotFound(what) => Self::NotFound(what),
            ConversationError::InvalidMessage(_) => Self::InvalidRequest(err.to_string()),
        }
    }
}

impl From<UploadError> for BackendError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Empty | UploadError::TooLarge { .. } => {
                Self::InvalidRequest(err.to_string())
            }
            UploadError::Io(e) => Self::Internal(e.to_string()),
        }
    }
}

pub struct BackendContext<D>
where
    D: Database,
{
    pub(crate) db: Arc<D>,
}

impl<D> Clone for BackendContext<D>
where
    D: Database,
{
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl<D> BackendContext<D>
where
    D: Database,
{
    pub fn new(db: D) -> Self {
        Self { db: Arc::new(db) }
    }
}
