use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::backend::{db::DatabaseError, repo::chat::Chat};

pub fn row_to_chat(row: &Row) -> Result<Chat, rusqlite::Error> {
    Ok(Chat {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

pub fn create_chat(conn: &Connection, chat: &Chat) -> Result<Chat, DatabaseError> {
    let created = conn.query_row(
        "INSERT INTO chats (id, user_id, title, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING id, user_id, title, created_at, updated_at",
        (
            &chat.id,
            &chat.user_id,
            &chat.title,
            &chat.created_at,
            &chat.updated_at,
        ),
        row_to_chat,
    )?;
    Ok(created)
}

pub fn get_chat(conn: &Connection, chat_id: &str) -> Result<Option<Chat>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, title, created_at, updated_at
         FROM chats
         WHERE id = ?1",
    )?;
    let chat = stmt.query_row([chat_id], row_to_chat).optional()?;
    Ok(chat)
}

pub fn list_chats_by_user(conn: &Connection, user_id: &str) -> Result<Vec<Chat>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, title, created_at, updated_at
         FROM chats
         WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let chats = stmt
        .query_map([user_id], row_to_chat)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(chats)
}

/// Sets the title, restricted to `user_id`'s chats when one is given.
/// `None` means no matching chat was found.
pub fn update_chat_title(
    conn: &Connection,
    chat_id: &str,
    user_id: Option<&str>,
    title: &str,
) -> Result<Option<Chat>, DatabaseError> {
    let updated = conn
        .query_row(
            "UPDATE chats
             SET title = ?3, updated_at = ?4
             WHERE id = ?1 AND (?2 IS NULL OR user_id = ?2)
             RETURNING id, user_id, title, created_at, updated_at",
            params![chat_id, user_id, title, Utc::now().naive_utc()],
            row_to_chat,
        )
        .optional()?;
    Ok(updated)
}

pub fn delete_chat_for_user(
    conn: &Connection,
    chat_id: &str,
    user_id: &str,
) -> Result<usize, DatabaseError> {
    let rows = conn.execute(
        "DELETE FROM chats WHERE id = ?1 AND user_id = ?2",
        [chat_id, user_id],
    )?;
    Ok(rows)
}
