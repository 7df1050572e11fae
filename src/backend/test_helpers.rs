use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use serde_json::json;

use crate::backend::{
    BackendContext,
    db::sqlite::Sqlite,
    repo::{
        message::{Message, Role},
        part::{MessagePart, ToolCall, ToolState},
    },
    title::TitleGenerator,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn test_context() -> BackendContext<Sqlite> {
    init_logging();
    let db = Sqlite::new_in_memory().expect("in-memory db should initialize");
    BackendContext::new(db)
}

pub fn user_message(id: &str, text: &str) -> Message {
    Message {
        id: id.to_string(),
        role: Role::User,
        parts: vec![MessagePart::text(text)],
    }
}

/// An assistant turn that reasons, calls a tool and answers.
pub fn assistant_message(id: &str) -> Message {
    Message {
        id: id.to_string(),
        role: Role::Assistant,
        parts: vec![
            MessagePart::StepStart,
            MessagePart::Reasoning {
                text: "the user wants the weather".to_string(),
                provider_metadata: None,
            },
            MessagePart::Tool(ToolCall {
                name: "weather".to_string(),
                tool_call_id: "call-1".to_string(),
                state: ToolState::OutputAvailable {
                    input: json!({"city": "Lisbon"}),
                    output: json!({"celsius": 21}),
                },
            }),
            MessagePart::text("It is 21°C in Lisbon."),
        ],
    }
}

/// Title generator that returns a canned answer and records what it was asked.
pub struct FakeTitleGenerator {
    reply: Result<String, String>,
    calls: AtomicUsize,
    last_input: Mutex<Vec<Message>>,
}

impl FakeTitleGenerator {
    pub fn replying(title: &str) -> Self {
        Self {
            reply: Ok(title.to_string()),
            calls: AtomicUsize::new(0),
            last_input: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
            last_input: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Vec<Message> {
        self.last_input.lock().expect("lock should not be poisoned").clone()
    }
}

impl TitleGenerator for FakeTitleGenerator {
    async fn generate_title(&self, messages: &[Message]) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_input.lock().expect("lock should not be poisoned") = messages.to_vec();
        self.reply.clone().map_err(|message| anyhow::anyhow!(message))
    }
}
