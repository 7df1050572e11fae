use std::{fmt, str::FromStr};

use chrono::NaiveDateTime;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{
    part::MessagePart,
    part_codec::{self, PartCodecError, PartRow},
};
use crate::backend::{
    BackendContext,
    db::{Database, DatabaseError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown message role {0:?}")]
pub struct UnknownRole(String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse::<Role>()
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

/// A message as the model and the UI see it: a role and its ordered parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<MessagePart>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            parts,
        }
    }

    /// Concatenated text parts, blank-line separated.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(MessagePart::as_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// The `messages` row without its parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub chat_id: String,
    pub role: Role,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Error)]
pub enum MessageRepoError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("invalid message part: {0}")]
    InvalidPart(#[from] PartCodecError),
    #[error("chat not found: {0}")]
    ChatNotFound(String),
    #[error("message {id} already exists with role {existing}, cannot save it as {requested}")]
    RoleChanged {
        id: String,
        existing: Role,
        requested: Role,
    },
    #[error("message {id} belongs to chat {existing_chat_id}")]
    ChatMismatch { id: String, existing_chat_id: String },
}

/// Encodes `parts`, refusing any that would not decode again, e.g. a tool call without a name.
fn validated_rows(parts: &[MessagePart], message_id: &str) -> Result<Vec<PartRow>, PartCodecError> {
    let rows = part_codec::encode_parts(parts, message_id);
    for row in &rows {
        part_codec::decode(row)?;
    }
    Ok(rows)
}

/// Checks that every part of `message` can be stored, without touching storage.
pub fn validate_message(message: &Message) -> Result<(), MessageRepoError> {
    validated_rows(&message.parts, &message.id)?;
    Ok(())
}

pub struct MessageRepo<D>
where
    D: Database,
{
    ctx: BackendContext<D>,
}

impl<D> Clone for MessageRepo<D>
where
    D: Database,
{
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<D> MessageRepo<D>
where
    D: Database,
{
    pub fn new(ctx: BackendContext<D>) -> Self {
        Self { ctx }
    }

    /// Persists the message and replaces its parts. Saving an existing id again
    /// rewrites its parts; an empty id gets a fresh one.
    pub async fn save_message(
        &self,
        chat_id: &str,
        message: &Message,
    ) -> Result<Message, MessageRepoError> {
        if self.ctx.db.get_chat(chat_id).await?.is_none() {
            return Err(MessageRepoError::ChatNotFound(chat_id.to_string()));
        }

        let id = if message.id.trim().is_empty() {
            Uuid::new_v4().to_string()
        } else {
            message.id.clone()
        };

        if let Some(existing) = self.ctx.db.get_message(&id).await? {
            if existing.chat_id != chat_id {
                return Err(MessageRepoError::ChatMismatch {
                    id,
                    existing_chat_id: existing.chat_id,
                });
            }
            if existing.role != message.role {
                return Err(MessageRepoError::RoleChanged {
                    id,
                    existing: existing.role,
                    requested: message.role,
                });
            }
        }

        let rows = validated_rows(&message.parts, &id)?;
        let record = self
            .ctx
            .db
            .save_message(chat_id, &id, message.role, &rows)
            .await?;
        log::debug!(
            "saved {} message {} with {} parts in chat {chat_id}",
            record.role,
            record.id,
            rows.len()
        );

        Ok(Message {
            id: record.id,
            role: record.role,
            parts: message.parts.clone(),
        })
    }

    /// The chat's full history, oldest first, with every part decoded.
    pub async fn load_messages(&self, chat_id: &str) -> Result<Vec<Message>, MessageRepoError> {
        let rows = self.ctx.db.list_messages_with_parts(chat_id).await?;
        rows.into_iter()
            .map(|(record, parts)| -> Result<Message, MessageRepoError> {
                Ok(Message {
                    id: record.id,
                    role: record.role,
                    parts: part_codec::decode_parts(parts)?,
                })
            })
            .collect()
    }

    pub async fn has_messages(&self, chat_id: &str) -> Result<bool, MessageRepoError> {
        Ok(self.ctx.db.chat_has_messages(chat_id).await?)
    }

    pub async fn get_message(
        &self,
        message_id: &str,
    ) -> Result<Option<MessageRecord>, MessageRepoError> {
        Ok(self.ctx.db.get_message(message_id).await?)
    }

    /// Deletes the message and everything after it in its chat. Returns the number of
    /// messages removed, 0 when the id is unknown.
    pub async fn delete_message_and_following(
        &self,
        message_id: &str,
    ) -> Result<usize, MessageRepoError> {
        Ok(self.ctx.db.delete_message_and_following(message_id).await?)
    }
}
