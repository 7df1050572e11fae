use std::future::Future;

use thiserror::Error;

use crate::backend::repo::{
    chat::Chat,
    message::{MessageRecord, Role},
    part_codec::PartRow,
};

mod migrations;
pub mod sqlite;

#[derive(Error, Debug)]
pub enum DatabaseStartupError {
    #[error("Error establishing connection {0}")]
    Connection(#[from] rusqlite::Error),
    #[error("Error migrating db {0}")]
    Migration(#[from] rusqlite_migration::Error),
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Sqlite query error {0}")]
    SqliteQueryError(#[from] rusqlite::Error),
    #[error("Db conn lock poisoned")]
    PoisonedLock,
    #[error("{op} unexpected rows affected, expected {expected} got {actual}")]
    UnexpectedRowsAffected {
        op: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Storage seam for chats, messages and their parts.
///
/// Parts cross this boundary only as flat [`PartRow`]s; encoding and decoding
/// them is the repo layer's job.
pub trait Database: Send + Sync + 'static {
    fn create_chat(&self, chat: Chat) -> impl Future<Output = Result<Chat, DatabaseError>> + Send;

    fn get_chat(
        &self,
        chat_id: &str,
    ) -> impl Future<Output = Result<Option<Chat>, DatabaseError>> + Send;

    fn list_chats_by_user(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<Chat>, DatabaseError>> + Send;

    fn update_chat_title(
        &self,
        chat_id: &str,
        title: &str,
    ) -> impl Future<Output = Result<Option<Chat>, DatabaseError>> + Send;

    fn update_chat_title_for_user(
        &self,
        chat_id: &str,
        user_id: &str,
        title: &str,
    ) -> impl Future<Output = Result<Option<Chat>, DatabaseError>> + Send;

    /// Returns the number of chats removed, 0 when the chat is missing or owned by someone else.
    fn delete_chat_for_user(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<usize, DatabaseError>> + Send;

    fn get_message(
        &self,
        message_id: &str,
    ) -> impl Future<Output = Result<Option<MessageRecord>, DatabaseError>> + Send;

    fn chat_has_messages(
        &self,
        chat_id: &str,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send;

    /// Upserts the message row and replaces all of its parts in one transaction.
    fn save_message(
        &self,
        chat_id: &str,
        message_id: &str,
        role: Role,
        parts: &[PartRow],
    ) -> impl Future<Output = Result<MessageRecord, DatabaseError>> + Send;

    /// Messages in creation order, each with its part rows ordered by position.
    fn list_messages_with_parts(
        &self,
        chat_id: &str,
    ) -> impl Future<Output = Result<Vec<(MessageRecord, Vec<PartRow>)>, DatabaseError>> + Send;

    /// Deletes the message and every later message in its chat, returning how many went.
    fn delete_message_and_following(
        &self,
        message_id: &str,
    ) -> impl Future<Output = Result<usize, DatabaseError>> + Send;
}
