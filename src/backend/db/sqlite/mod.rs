use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use rusqlite::{Connection, Transaction, TransactionBehavior};

use super::{Database, DatabaseError, DatabaseStartupError, migrations::SQLITE_MIGRATIONS};
use crate::backend::repo::{
    chat::Chat,
    message::{MessageRecord, Role},
    part_codec::PartRow,
};

mod chats;
mod message_parts;
mod messages;
#[cfg(test)]
mod test;

/// Helper function to make sure updates are updating
pub fn check_returning_row_error(op: &'static str, err: rusqlite::Error) -> DatabaseError {
    match err {
        rusqlite::Error::QueryReturnedNoRows => DatabaseError::UnexpectedRowsAffected {
            op,
            expected: 1,
            actual: 0,
        },
        other => DatabaseError::SqliteQueryError(other),
    }
}

/// Helper function to make sure rows are actually being written
pub fn assert_one_row_affected(
    op: &'static str,
    rows_affected: usize,
) -> Result<(), DatabaseError> {
    if rows_affected == 1 {
        Ok(())
    } else {
        Err(DatabaseError::UnexpectedRowsAffected {
            op,
            expected: 1,
            actual: rows_affected,
        })
    }
}

/// Grabs the database connection or returns an error if its mutex lock is poisoned
macro_rules! with_conn {
    ($self:expr, $conn:ident, $body:block) => {{
        let $conn = $self
            .conn
            .lock()
            .map_err(|_| DatabaseError::PoisonedLock)?;
        $body
    }};
}

/// Runs `f` inside an immediate transaction, rolling back on any error.
fn in_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
) -> Result<T, DatabaseError> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    match f(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                log::error!("failed to roll back transaction after {err}: {rollback_err}");
            }
            Err(err)
        }
    }
}

pub struct Sqlite {
    conn: Arc<Mutex<Connection>>,
}

impl Sqlite {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseStartupError> {
        let conn = Connection::open(path)?;
        Sqlite::new_with_conn(conn)
    }

    pub fn new_in_memory() -> Result<Self, DatabaseStartupError> {
        let conn = Connection::open_in_memory()?;
        Sqlite::new_with_conn(conn)
    }

    fn new_with_conn(mut conn: Connection) -> Result<Self, DatabaseStartupError> {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        SQLITE_MIGRATIONS.to_latest(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    fn with_raw_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        with_conn!(self, conn, { f(&conn) })
    }
}

impl Database for Sqlite {
    async fn create_chat(&self, chat: Chat) -> Result<Chat, DatabaseError> {
        with_conn!(self, conn, { chats::create_chat(&conn, &chat) })
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, DatabaseError> {
        with_conn!(self, conn, { chats::get_chat(&conn, chat_id) })
    }

    async fn list_chats_by_user(&self, user_id: &str) -> Result<Vec<Chat>, DatabaseError> {
        with_conn!(self, conn, { chats::list_chats_by_user(&conn, user_id) })
    }

    async fn update_chat_title(
        &self,
        chat_id: &str,
        title: &str,
    ) -> Result<Option<Chat>, DatabaseError> {
        with_conn!(self, conn, { chats::update_chat_title(&conn, chat_id, None, title) })
    }

    async fn update_chat_title_for_user(
        &self,
        chat_id: &str,
        user_id: &str,
        title: &str,
    ) -> Result<Option<Chat>, DatabaseError> {
        with_conn!(self, conn, {
            chats::update_chat_title(&conn, chat_id, Some(user_id), title)
        })
    }

    async fn delete_chat_for_user(&self, chat_id: &str, user_id: &str) -> Result<usize, DatabaseError> {
        with_conn!(self, conn, { chats::delete_chat_for_user(&conn, chat_id, user_id) })
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<MessageRecord>, DatabaseError> {
        with_conn!(self, conn, { messages::get_message(&conn, message_id) })
    }

    async fn chat_has_messages(&self, chat_id: &str) -> Result<bool, DatabaseError> {
        with_conn!(self, conn, { messages::chat_has_messages(&conn, chat_id) })
    }

    async fn save_message(
        &self,
        chat_id: &str,
        message_id: &str,
        role: Role,
        parts: &[PartRow],
    ) -> Result<MessageRecord, DatabaseError> {
        with_conn!(self, conn, {
            in_transaction(&conn, |tx| {
                let record = messages::upsert_message(tx, chat_id, message_id, role)?;
                message_parts::replace_parts(tx, message_id, parts)?;
                Ok(record)
            })
        })
    }

    async fn list_messages_with_parts(
        &self,
        chat_id: &str,
    ) -> Result<Vec<(MessageRecord, Vec<PartRow>)>, DatabaseError> {
        with_conn!(self, conn, {
            let records = messages::list_messages_by_chat(&conn, chat_id)?;
            let mut parts_by_message = message_parts::list_parts_by_chat(&conn, chat_id)?;
            Ok(records
                .into_iter()
                .map(|record| {
                    let parts = parts_by_message.remove(&record.id).unwrap_or_default();
                    (record, parts)
                })
                .collect())
        })
    }

    async fn delete_message_and_following(&self, message_id: &str) -> Result<usize, DatabaseError> {
        with_conn!(self, conn, {
            in_transaction(&conn, |tx| messages::delete_message_and_following(tx, message_id))
        })
    }
}
