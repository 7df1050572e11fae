use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{assert_one_row_affected, check_returning_row_error};
use crate::backend::{
    db::DatabaseError,
    repo::message::{MessageRecord, Role},
};

const SELECT_MESSAGE_COLUMNS: &str = "id, chat_id, role, created_at, updated_at";

pub fn row_to_message(row: &Row) -> Result<MessageRecord, rusqlite::Error> {
    Ok(MessageRecord {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        role: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// Creation time for a new message: now, nudged past the chat's latest message
/// so creation order within a chat is strictly increasing.
pub(super) fn next_created_at(
    latest: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> NaiveDateTime {
    match latest {
        Some(latest) if latest >= now => latest + Duration::microseconds(1),
        _ => now,
    }
}

pub fn get_message(
    conn: &Connection,
    message_id: &str,
) -> Result<Option<MessageRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_MESSAGE_COLUMNS}
         FROM messages
         WHERE id = ?1"
    ))?;
    let message = stmt.query_row([message_id], row_to_message).optional()?;
    Ok(message)
}

pub fn list_messages_by_chat(
    conn: &Connection,
    chat_id: &str,
) -> Result<Vec<MessageRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_MESSAGE_COLUMNS}
         FROM messages
         WHERE chat_id = ?1
         ORDER BY created_at ASC, rowid ASC"
    ))?;
    let messages = stmt
        .query_map([chat_id], row_to_message)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(messages)
}

pub fn chat_has_messages(conn: &Connection, chat_id: &str) -> Result<bool, DatabaseError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM messages WHERE chat_id = ?1)",
        [chat_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Inserts the message, or bumps `updated_at` when the id already exists.
/// An existing message keeps its chat, role and creation time.
pub fn upsert_message(
    conn: &Connection,
    chat_id: &str,
    message_id: &str,
    role: Role,
) -> Result<MessageRecord, DatabaseError> {
    let now = Utc::now().naive_utc();

    let record = if get_message(conn, message_id)?.is_some() {
        conn.query_row(
            &format!(
                "UPDATE messages
                 SET updated_at = ?2
                 WHERE id = ?1
                 RETURNING {SELECT_MESSAGE_COLUMNS}"
            ),
            params![message_id, now],
            row_to_message,
        )
        .map_err(|e| check_returning_row_error("upsert_message", e))?
    } else {
        let latest: Option<NaiveDateTime> = conn.query_row(
            "SELECT MAX(created_at) FROM messages WHERE chat_id = ?1",
            [chat_id],
            |row| row.get(0),
        )?;
        let created_at = next_created_at(latest, now);

        conn.query_row(
            &format!(
                "INSERT INTO messages (id, chat_id, role, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 RETURNING {SELECT_MESSAGE_COLUMNS}"
            ),
            params![message_id, chat_id, role, created_at, now],
            row_to_message,
        )?
    };

    let rows = conn.execute(
        "UPDATE chats SET updated_at = ?2 WHERE id = ?1",
        params![chat_id, now],
    )?;
    assert_one_row_affected("touch_chat", rows)?;

    Ok(record)
}

/// Removes the target message and every message created after it in the same chat.
/// Parts go with them through the cascade. Returns 0 when the id is unknown.
pub fn delete_message_and_following(
    conn: &Connection,
    message_id: &str,
) -> Result<usize, DatabaseError> {
    let Some(target) = get_message(conn, message_id)? else {
        return Ok(0);
    };

    let following = conn.execute(
        "DELETE FROM messages WHERE chat_id = ?1 AND created_at > ?2",
        params![target.chat_id, target.created_at],
    )?;
    let rows = conn.execute("DELETE FROM messages WHERE id = ?1", [message_id])?;
    assert_one_row_affected("delete_message", rows)?;

    log::debug!(
        "deleted message {message_id} and {following} following messages in chat {}",
        target.chat_id
    );
    Ok(following + rows)
}
