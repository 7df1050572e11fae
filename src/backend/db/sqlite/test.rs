use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::params;
use serde_json::json;

use super::{Sqlite, message_parts, messages};
use crate::backend::{
    db::{Database, DatabaseError},
    repo::{
        chat::Chat,
        message::Role,
        part_codec::{PartRow, STEP_START, TEXT},
    },
};

fn create_test_chat(id: &str, user_id: &str) -> Chat {
    let now = Utc::now().naive_utc();
    Chat {
        id: id.to_string(),
        user_id: user_id.to_string(),
        title: "New conversation".to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn text_row(message_id: &str, order: i64, text: &str) -> PartRow {
    PartRow {
        message_id: message_id.to_string(),
        order,
        part_type: TEXT.to_string(),
        text: Some(text.to_string()),
        ..Default::default()
    }
}

fn fixed_datetime() -> NaiveDateTime {
    NaiveDateTime::parse_from_str("2025-01-02 03:04:05.123456", "%Y-%m-%d %H:%M:%S%.f")
        .expect("fixed datetime should parse")
}

fn count(db: &Sqlite, sql: &str) -> i64 {
    db.with_raw_conn(|conn| Ok(conn.query_row(sql, [], |row| row.get(0))?))
        .expect("count query should succeed")
}

async fn seeded_db() -> Sqlite {
    let db = Sqlite::new_in_memory().expect("in-memory db should initialize");
    db.create_chat(create_test_chat("chat-1", "user-1"))
        .await
        .expect("chat insert should succeed");
    db
}

#[tokio::test]
async fn test_new_in_memory_creates_valid_database() {
    let result = Sqlite::new_in_memory();
    assert!(
        result.is_ok(),
        "Failed to create in-memory database: {:?}",
        result.err()
    );
}

#[tokio::test]
async fn test_create_and_get_chat() {
    let db = Sqlite::new_in_memory().expect("in-memory db should initialize");
    let chat = create_test_chat("chat-1", "user-1");

    let created = db.create_chat(chat.clone()).await.expect("insert should succeed");
    let fetched = db.get_chat("chat-1").await.expect("get should succeed");

    assert_eq!(created, chat);
    assert_eq!(fetched, Some(chat));
    assert_eq!(db.get_chat("missing").await.expect("get should succeed"), None);
}

#[tokio::test]
async fn test_list_chats_by_user_newest_first() {
    let db = Sqlite::new_in_memory().expect("in-memory db should initialize");
    let base = fixed_datetime();
    for (offset, id) in [(0, "old"), (2, "newest"), (1, "middle")] {
        let mut chat = create_test_chat(id, "user-1");
        chat.created_at = base + Duration::seconds(offset);
        db.create_chat(chat).await.expect("insert should succeed");
    }
    db.create_chat(create_test_chat("other", "user-2"))
        .await
        .expect("insert should succeed");

    let ids: Vec<String> = db
        .list_chats_by_user("user-1")
        .await
        .expect("list should succeed")
        .into_iter()
        .map(|chat| chat.id)
        .collect();

    assert_eq!(ids, vec!["newest", "middle", "old"]);
}

#[tokio::test]
async fn test_update_chat_title_for_user_checks_owner() {
    let db = seeded_db().await;

    let foreign = db
        .update_chat_title_for_user("chat-1", "user-2", "Hijacked")
        .await
        .expect("update should succeed");
    let owned = db
        .update_chat_title_for_user("chat-1", "user-1", "Renamed")
        .await
        .expect("update should succeed");
    let missing = db
        .update_chat_title("missing", "Whatever")
        .await
        .expect("update should succeed");

    assert_eq!(foreign, None);
    assert_eq!(owned.map(|chat| chat.title), Some("Renamed".to_string()));
    assert_eq!(missing, None);
}

#[tokio::test]
async fn test_save_message_replaces_parts_and_keeps_position_order() {
    let db = seeded_db().await;
    let rows = vec![
        text_row("m1", 2, "third"),
        text_row("m1", 0, "first"),
        text_row("m1", 1, "second"),
    ];

    let record = db
        .save_message("chat-1", "m1", Role::User, &rows)
        .await
        .expect("save should succeed");
    assert_eq!(record.chat_id, "chat-1");
    assert_eq!(record.role, Role::User);

    let loaded = db
        .list_messages_with_parts("chat-1")
        .await
        .expect("list should succeed");
    assert_eq!(loaded.len(), 1);
    let texts: Vec<_> = loaded[0].1.iter().map(|row| row.text.clone()).collect();
    assert_eq!(
        texts,
        vec![
            Some("first".to_string()),
            Some("second".to_string()),
            Some("third".to_string())
        ]
    );

    let replaced = db
        .save_message("chat-1", "m1", Role::User, &[text_row("m1", 0, "only")])
        .await
        .expect("resave should succeed");
    assert_eq!(replaced.created_at, record.created_at);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM message_parts"), 1);
}

#[tokio::test]
async fn test_json_columns_keep_null_values() {
    let db = seeded_db().await;
    let row = PartRow {
        message_id: "m1".to_string(),
        order: 0,
        part_type: "tool-lookup".to_string(),
        tool_call_id: Some("call-1".to_string()),
        tool_state: Some("output-available".to_string()),
        tool_input: Some(json!(null)),
        tool_output: Some(json!({"rows": [1, 2]})),
        ..Default::default()
    };

    db.save_message("chat-1", "m1", Role::Assistant, std::slice::from_ref(&row))
        .await
        .expect("save should succeed");
    let stored = db
        .with_raw_conn(|conn| message_parts::list_parts_by_message(conn, "m1"))
        .expect("parts should load");

    assert_eq!(stored, vec![row]);
}

#[tokio::test]
async fn test_save_message_rolls_back_when_a_part_is_rejected() {
    let db = seeded_db().await;
    db.save_message("chat-1", "m1", Role::User, &[text_row("m1", 0, "kept")])
        .await
        .expect("save should succeed");

    let invalid = PartRow {
        message_id: "m1".to_string(),
        order: 1,
        part_type: TEXT.to_string(),
        ..Default::default()
    };
    let result = db
        .save_message(
            "chat-1",
            "m1",
            Role::User,
            &[text_row("m1", 0, "replacement"), invalid],
        )
        .await;

    assert!(matches!(result, Err(DatabaseError::SqliteQueryError(_))));
    let loaded = db
        .with_raw_conn(|conn| message_parts::list_parts_by_message(conn, "m1"))
        .expect("parts should load");
    assert_eq!(loaded, vec![text_row("m1", 0, "kept")]);
}

#[tokio::test]
async fn test_save_message_for_missing_chat_fails() {
    let db = Sqlite::new_in_memory().expect("in-memory db should initialize");

    let result = db
        .save_message("missing", "m1", Role::User, &[text_row("m1", 0, "hi")])
        .await;

    assert!(result.is_err());
    assert_eq!(count(&db, "SELECT COUNT(*) FROM messages"), 0);
}

#[tokio::test]
async fn test_created_at_strictly_increases_within_chat() {
    let db = seeded_db().await;
    let mut previous = None;
    for i in 0..5 {
        let id = format!("m{i}");
        let record = db
            .save_message("chat-1", &id, Role::User, &[text_row(&id, 0, "hi")])
            .await
            .expect("save should succeed");
        if let Some(previous) = previous {
            assert!(record.created_at > previous);
        }
        previous = Some(record.created_at);
    }
}

#[test]
fn test_next_created_at_moves_past_latest() {
    let now = fixed_datetime();

    assert_eq!(messages::next_created_at(None, now), now);
    assert_eq!(
        messages::next_created_at(Some(now - Duration::seconds(1)), now),
        now
    );
    assert_eq!(
        messages::next_created_at(Some(now), now),
        now + Duration::microseconds(1)
    );
    assert_eq!(
        messages::next_created_at(Some(now + Duration::seconds(3)), now),
        now + Duration::seconds(3) + Duration::microseconds(1)
    );
}

#[tokio::test]
async fn test_delete_message_and_following() {
    let db = seeded_db().await;
    db.create_chat(create_test_chat("chat-2", "user-1"))
        .await
        .expect("chat insert should succeed");
    for id in ["m1", "m2", "m3", "m4"] {
        db.save_message("chat-1", id, Role::User, &[text_row(id, 0, id)])
            .await
            .expect("save should succeed");
    }
    db.save_message("chat-2", "other", Role::User, &[text_row("other", 0, "x")])
        .await
        .expect("save should succeed");

    let deleted = db
        .delete_message_and_following("m2")
        .await
        .expect("delete should succeed");

    assert_eq!(deleted, 3);
    let remaining: Vec<String> = db
        .list_messages_with_parts("chat-1")
        .await
        .expect("list should succeed")
        .into_iter()
        .map(|(record, _)| record.id)
        .collect();
    assert_eq!(remaining, vec!["m1"]);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM message_parts"), 2);
    assert_eq!(
        db.delete_message_and_following("missing")
            .await
            .expect("delete should succeed"),
        0
    );
}

#[tokio::test]
async fn test_delete_chat_cascades_to_messages_and_parts() {
    let db = seeded_db().await;
    db.save_message("chat-1", "m1", Role::User, &[text_row("m1", 0, "hi")])
        .await
        .expect("save should succeed");

    let foreign = db
        .delete_chat_for_user("chat-1", "user-2")
        .await
        .expect("delete should succeed");
    assert_eq!(foreign, 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM messages"), 1);

    let owned = db
        .delete_chat_for_user("chat-1", "user-1")
        .await
        .expect("delete should succeed");
    assert_eq!(owned, 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM messages"), 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM message_parts"), 0);
}

#[tokio::test]
async fn test_check_constraints_reject_invalid_raw_rows() {
    let db = seeded_db().await;
    db.save_message("chat-1", "m1", Role::Assistant, &[])
        .await
        .expect("save should succeed");
    let now = Utc::now().naive_utc();

    let insert = |id: &str, position: i64, part_type: &str, text: Option<&str>, tool_state: Option<&str>| {
        db.with_raw_conn(|conn| {
            Ok(conn.execute(
                "INSERT INTO message_parts (id, message_id, position, part_type, text, tool_call_id, tool_state, created_at)
                 VALUES (?1, 'm1', ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    position,
                    part_type,
                    text,
                    tool_state.map(|_| "call-1"),
                    tool_state,
                    now
                ],
            )?)
        })
    };

    assert!(insert("p1", 0, TEXT, None, None).is_err(), "text without text");
    assert!(insert("p2", 0, "mystery", Some("x"), None).is_err(), "unknown type");
    assert!(insert("p3", 0, "tool-", None, Some("input-streaming")).is_err(), "nameless tool");
    assert!(
        insert("p4", 0, "tool-search", None, Some("output-available")).is_err(),
        "output without input"
    );
    assert!(
        insert("p5", 0, "tool-search", None, Some("finished")).is_err(),
        "unknown tool state"
    );
    assert!(insert("p6", -1, STEP_START, None, None).is_err(), "negative position");

    assert!(insert("p7", 0, STEP_START, None, None).is_ok());
    assert!(insert("p8", 0, TEXT, Some("dup"), None).is_err(), "duplicate position");
    assert!(insert("p9", 1, "tool-search", None, Some("input-streaming")).is_ok());
}

#[tokio::test]
async fn test_chat_has_messages() {
    let db = seeded_db().await;

    assert!(!db.chat_has_messages("chat-1").await.expect("query should succeed"));
    db.save_message("chat-1", "m1", Role::User, &[text_row("m1", 0, "hi")])
        .await
        .expect("save should succeed");
    assert!(db.chat_has_messages("chat-1").await.expect("query should succeed"));
    assert!(!db.chat_has_messages("missing").await.expect("query should succeed"));
}
