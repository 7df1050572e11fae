use serde_json::json;

use crate::backend::{
    BackendContext,
    db::{Database, sqlite::Sqlite},
    repo::{
        chat::{Chat, ChatRepo},
        message::{Message, MessageRepo, MessageRepoError, Role},
        part::{MessagePart, ToolCall, ToolState},
        part_codec::{self, PartRow},
    },
    test_helpers::{assistant_message, test_context, user_message},
};

async fn repos_with_chat() -> (ChatRepo<Sqlite>, MessageRepo<Sqlite>, Chat) {
    let ctx = test_context();
    let chats = ChatRepo::new(ctx.clone());
    let chat = chats.create("user-1", None).await.expect("chat should be created");
    (chats, MessageRepo::new(ctx), chat)
}

#[tokio::test]
async fn save_and_load_user_then_assistant_message() {
    let (_, repo, chat) = repos_with_chat().await;
    let user = Message::new(Role::User, vec![MessagePart::text("hi")]);
    let assistant = Message::new(
        Role::Assistant,
        vec![
            MessagePart::text("hello"),
            MessagePart::Tool(ToolCall {
                name: "generateImage".to_string(),
                tool_call_id: "call-1".to_string(),
                state: ToolState::OutputAvailable {
                    input: json!({"prompt": "cat"}),
                    output: json!("https://img/cat.jpg"),
                },
            }),
        ],
    );

    repo.save_message(&chat.id, &user).await.expect("user save should succeed");
    repo.save_message(&chat.id, &assistant)
        .await
        .expect("assistant save should succeed");
    let loaded = repo.load_messages(&chat.id).await.expect("load should succeed");

    assert_eq!(loaded, vec![user, assistant]);
    let MessagePart::Tool(call) = &loaded[1].parts[1] else {
        panic!("second assistant part should be a tool call");
    };
    assert_eq!(
        call.state,
        ToolState::OutputAvailable {
            input: json!({"prompt": "cat"}),
            output: json!("https://img/cat.jpg"),
        }
    );
}

#[tokio::test]
async fn load_returns_parts_by_order_whatever_the_insertion_sequence() {
    let ctx = test_context();
    let chat = ChatRepo::new(ctx.clone())
        .create("user-1", None)
        .await
        .expect("chat should be created");
    let parts: Vec<MessagePart> = (0..6).map(|i| MessagePart::text(format!("part {i}"))).collect();
    let mut rows = part_codec::encode_parts(&parts, "m1");
    rows.reverse();
    rows.swap(1, 4);

    ctx.db
        .save_message(&chat.id, "m1", Role::Assistant, &rows)
        .await
        .expect("raw save should succeed");
    let loaded = MessageRepo::new(ctx)
        .load_messages(&chat.id)
        .await
        .expect("load should succeed");

    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].parts, parts);
}

#[tokio::test]
async fn save_allocates_id_when_empty() {
    let (_, repo, chat) = repos_with_chat().await;
    let message = user_message("", "hello");

    let saved = repo.save_message(&chat.id, &message).await.expect("save should succeed");

    assert!(!saved.id.is_empty());
    assert_eq!(saved.parts, message.parts);
    assert!(repo.get_message(&saved.id).await.expect("get should succeed").is_some());
}

#[tokio::test]
async fn resaving_a_message_replaces_its_parts() {
    let (_, repo, chat) = repos_with_chat().await;
    let mut streaming = assistant_message("a1");
    streaming.parts.truncate(1);
    repo.save_message(&chat.id, &streaming).await.expect("save should succeed");

    let finished = assistant_message("a1");
    repo.save_message(&chat.id, &finished).await.expect("resave should succeed");

    let loaded = repo.load_messages(&chat.id).await.expect("load should succeed");
    assert_eq!(loaded, vec![finished]);
}

#[tokio::test]
async fn save_into_unknown_chat_fails() {
    let repo = MessageRepo::new(test_context());

    let result = repo.save_message("missing", &user_message("m1", "hi")).await;

    assert!(matches!(result, Err(MessageRepoError::ChatNotFound(id)) if id == "missing"));
}

#[tokio::test]
async fn role_cannot_change_on_resave() {
    let (_, repo, chat) = repos_with_chat().await;
    repo.save_message(&chat.id, &user_message("m1", "hi"))
        .await
        .expect("save should succeed");

    let mut as_assistant = user_message("m1", "hi");
    as_assistant.role = Role::Assistant;
    let result = repo.save_message(&chat.id, &as_assistant).await;

    assert!(matches!(
        result,
        Err(MessageRepoError::RoleChanged {
            existing: Role::User,
            requested: Role::Assistant,
            ..
        })
    ));
}

#[tokio::test]
async fn message_cannot_move_between_chats() {
    let (chats, repo, chat) = repos_with_chat().await;
    let other = chats.create("user-1", None).await.expect("chat should be created");
    repo.save_message(&chat.id, &user_message("m1", "hi"))
        .await
        .expect("save should succeed");

    let result = repo.save_message(&other.id, &user_message("m1", "hi")).await;

    assert!(matches!(result, Err(MessageRepoError::ChatMismatch { .. })));
    assert!(repo.load_messages(&other.id).await.expect("load should succeed").is_empty());
}

#[tokio::test]
async fn nameless_tool_call_is_rejected_before_storage() {
    let (_, repo, chat) = repos_with_chat().await;
    let message = Message::new(
        Role::Assistant,
        vec![MessagePart::Tool(ToolCall {
            name: String::new(),
            tool_call_id: "call-1".to_string(),
            state: ToolState::InputStreaming { input: None },
        })],
    );

    let result = repo.save_message(&chat.id, &message).await;

    assert!(matches!(result, Err(MessageRepoError::InvalidPart(_))));
    assert!(repo.get_message(&message.id).await.expect("get should succeed").is_none());
}

#[tokio::test]
async fn corrupt_stored_row_fails_the_load() {
    let ctx = test_context();
    let chat = ChatRepo::new(ctx.clone())
        .create("user-1", None)
        .await
        .expect("chat should be created");
    let stray = PartRow {
        message_id: "m1".to_string(),
        order: 0,
        part_type: part_codec::TEXT.to_string(),
        text: Some("hi".to_string()),
        file_url: Some("https://example.com/a.png".to_string()),
        ..Default::default()
    };
    ctx.db
        .save_message(&chat.id, "m1", Role::User, &[stray])
        .await
        .expect("raw save should succeed");

    let result = MessageRepo::new(ctx).load_messages(&chat.id).await;

    assert!(matches!(result, Err(MessageRepoError::InvalidPart(_))));
}

async fn three_message_chat(ctx: BackendContext<Sqlite>) -> (MessageRepo<Sqlite>, String) {
    let chat = ChatRepo::new(ctx.clone())
        .create("user-1", None)
        .await
        .expect("chat should be created");
    let repo = MessageRepo::new(ctx);
    repo.save_message(&chat.id, &user_message("m1", "one"))
        .await
        .expect("save should succeed");
    repo.save_message(&chat.id, &assistant_message("m2"))
        .await
        .expect("save should succeed");
    repo.save_message(&chat.id, &user_message("m3", "three"))
        .await
        .expect("save should succeed");
    (repo, chat.id)
}

#[tokio::test]
async fn truncate_from_first_message_empties_the_chat() {
    let (repo, chat_id) = three_message_chat(test_context()).await;

    let deleted = repo
        .delete_message_and_following("m1")
        .await
        .expect("delete should succeed");

    assert_eq!(deleted, 3);
    assert!(repo.load_messages(&chat_id).await.expect("load should succeed").is_empty());
}

#[tokio::test]
async fn truncate_from_middle_keeps_earlier_messages() {
    let (repo, chat_id) = three_message_chat(test_context()).await;

    let deleted = repo
        .delete_message_and_following("m2")
        .await
        .expect("delete should succeed");

    assert_eq!(deleted, 2);
    let remaining: Vec<_> = repo
        .load_messages(&chat_id)
        .await
        .expect("load should succeed")
        .into_iter()
        .map(|message| message.id)
        .collect();
    assert_eq!(remaining, vec!["m1"]);
}

#[test]
fn message_text_joins_text_parts() {
    let message = assistant_message("a1");
    assert_eq!(message.text(), "It is 21°C in Lisbon.");

    let mixed = Message::new(
        Role::User,
        vec![
            MessagePart::text("first"),
            MessagePart::StepStart,
            MessagePart::text("second"),
        ],
    );
    assert_eq!(mixed.text(), "first\n\nsecond");
}

#[test]
fn role_round_trips_through_strings() {
    for role in [Role::User, Role::Assistant, Role::System] {
        assert_eq!(role.as_str().parse::<Role>().expect("role should parse"), role);
    }
    assert!("tool".parse::<Role>().is_err());
}
