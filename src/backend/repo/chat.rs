use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::backend::{
    BackendContext,
    db::{Database, DatabaseError},
};

pub const DEFAULT_CHAT_TITLE: &str = "New conversation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Error)]
pub enum ChatRepoError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    /// Also returned when the chat exists but belongs to another user.
    #[error("chat not found: {0}")]
    NotFound(String),
    #[error("chat title must not be empty")]
    EmptyTitle,
}

pub struct ChatRepo<D>
where
    D: Database,
{
    ctx: BackendContext<D>,
}

impl<D> Clone for ChatRepo<D>
where
    D: Database,
{
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<D> ChatRepo<D>
where
    D: Database,
{
    pub fn new(ctx: BackendContext<D>) -> Self {
        Self { ctx }
    }

    pub async fn create(&self, user_id: &str, title: Option<&str>) -> Result<Chat, ChatRepoError> {
        self.create_with_id(&Uuid::new_v4().to_string(), user_id, title)
            .await
    }

    /// Creates a chat under an id the client already allocated.
    pub async fn create_with_id(
        &self,
        chat_id: &str,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<Chat, ChatRepoError> {
        let now = Utc::now().naive_utc();
        let title = title
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_CHAT_TITLE);

        let chat = self
            .ctx
            .db
            .create_chat(Chat {
                id: chat_id.to_string(),
                user_id: user_id.to_string(),
                title: title.to_string(),
                created_at: now,
                updated_at: now,
            })
            .await?;
        log::debug!("created chat {} for user {}", chat.id, chat.user_id);
        Ok(chat)
    }

    /// The chat if it exists and belongs to `user_id`.
    pub async fn get_for_user(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> Result<Option<Chat>, ChatRepoError> {
        let chat = self.ctx.db.get_chat(chat_id).await?;
        Ok(chat.filter(|chat| chat.user_id == user_id))
    }

    pub async fn get(&self, chat_id: &str) -> Result<Option<Chat>, ChatRepoError> {
        Ok(self.ctx.db.get_chat(chat_id).await?)
    }

    /// The user's chats, newest first.
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<Chat>, ChatRepoError> {
        Ok(self.ctx.db.list_chats_by_user(user_id).await?)
    }

    /// Renames without an ownership check. Used by server side flows such as title generation.
    pub async fn rename(&self, chat_id: &str, title: &str) -> Result<Chat, ChatRepoError> {
        let title = non_empty_title(title)?;
        self.ctx
            .db
            .update_chat_title(chat_id, title)
            .await?
            .ok_or_else(|| ChatRepoError::NotFound(chat_id.to_string()))
    }

    pub async fn rename_for_user(
        &self,
        chat_id: &str,
        user_id: &str,
        title: &str,
    ) -> Result<Chat, ChatRepoError> {
        let title = non_empty_title(title)?;
        self.ctx
            .db
            .update_chat_title_for_user(chat_id, user_id, title)
            .await?
            .ok_or_else(|| ChatRepoError::NotFound(chat_id.to_string()))
    }

    /// Deletes the chat and, through the cascade, its messages. Only the owner may do this;
    /// anyone else gets `NotFound` and nothing changes.
    pub async fn delete(&self, chat_id: &str, user_id: &str) -> Result<(), ChatRepoError> {
        match self.ctx.db.delete_chat_for_user(chat_id, user_id).await? {
            0 => {
                log::warn!("user {user_id} tried to delete missing or foreign chat {chat_id}");
                Err(ChatRepoError::NotFound(chat_id.to_string()))
            }
            _ => Ok(()),
        }
    }
}

fn non_empty_title(title: &str) -> Result<&str, ChatRepoError> {
    let title = title.trim();
    if title.is_empty() {
        Err(ChatRepoError::EmptyTitle)
    } else {
        Ok(title)
    }
}
