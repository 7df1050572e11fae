use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{sync::broadcast, task::JoinHandle};

use crate::backend::{
    BackendContext,
    db::Database,
    repo::{
        chat::{Chat, ChatRepo, ChatRepoError, DEFAULT_CHAT_TITLE},
        message::{Message, MessageRepo, MessageRepoError, Role, validate_message},
    },
    title::{TitleGenerator, normalize_title},
};

/// Title a chat carries until its generated title lands.
pub const GENERATING_TITLE: &str = "Generating title...";

const EVENT_CAPACITY: usize = 64;

/// Notifications for whoever renders the chat list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ChatEvent {
    ChatsChanged {
        user_id: String,
    },
    TitleUpdated {
        chat_id: String,
        user_id: String,
        title: String,
    },
}

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error(transparent)]
    Chat(#[from] ChatRepoError),
    #[error(transparent)]
    Message(#[from] MessageRepoError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

#[derive(Debug)]
pub struct AppendOutcome {
    /// Full chat history including the message just appended, oldest first.
    pub messages: Vec<Message>,
    /// Set when this append started title generation for the chat.
    pub title_task: Option<JoinHandle<()>>,
}

pub struct ConversationService<D, G>
where
    D: Database,
    G: TitleGenerator,
{
    chats: ChatRepo<D>,
    messages: MessageRepo<D>,
    titles: Arc<G>,
    events: broadcast::Sender<ChatEvent>,
}

impl<D, G> Clone for ConversationService<D, G>
where
    D: Database,
    G: TitleGenerator,
{
    fn clone(&self) -> Self {
        Self {
            chats: self.chats.clone(),
            messages: self.messages.clone(),
            titles: Arc::clone(&self.titles),
            events: self.events.clone(),
        }
    }
}

impl<D, G> ConversationService<D, G>
where
    D: Database,
    G: TitleGenerator,
{
    pub fn new(ctx: BackendContext<D>, titles: Arc<G>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            chats: ChatRepo::new(ctx.clone()),
            messages: MessageRepo::new(ctx),
            titles,
            events,
        }
    }

    pub fn chats(&self) -> &ChatRepo<D> {
        &self.chats
    }

    pub fn messages(&self) -> &MessageRepo<D> {
        &self.messages
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Stores the user's message and returns the history to send to the model.
    ///
    /// An unknown chat id creates the chat for `user_id`. When the message is the first one
    /// in a chat that still has a placeholder title, a title is generated in the background.
    /// The returned history never waits on that task. A message that cannot be stored leaves
    /// no chat behind.
    pub async fn append_and_load(
        &self,
        chat_id: &str,
        user_id: &str,
        incoming: Message,
    ) -> Result<AppendOutcome, ConversationError> {
        if incoming.role != Role::User {
            return Err(ConversationError::InvalidMessage(format!(
                "expected a user message, got {}",
                incoming.role
            )));
        }
        if incoming.parts.is_empty() {
            return Err(ConversationError::InvalidMessage(
                "message has no parts".to_string(),
            ));
        }
        validate_message(&incoming)?;

        let (chat, created) = match self.chats.get(chat_id).await? {
            Some(chat) if chat.user_id == user_id => (chat, false),
            Some(_) => return Err(ConversationError::NotFound(format!("chat {chat_id}"))),
            None => {
                let chat = self
                    .chats
                    .create_with_id(chat_id, user_id, Some(GENERATING_TITLE))
                    .await?;
                (chat, true)
            }
        };
        let needs_title = created
            || (has_placeholder_title(&chat) && !self.messages.has_messages(chat_id).await?);

        if let Err(err) = self.messages.save_message(chat_id, &incoming).await {
            if created {
                self.discard_chat(&chat).await;
            }
            return Err(err.into());
        }

        let chat = if needs_title && chat.title != GENERATING_TITLE {
            self.chats.rename(chat_id, GENERATING_TITLE).await?
        } else {
            chat
        };
        if needs_title {
            publish(
                &self.events,
                ChatEvent::ChatsChanged {
                    user_id: user_id.to_string(),
                },
            );
        }

        let messages = self.messages.load_messages(chat_id).await?;
        let title_task = needs_title.then(|| self.spawn_title_task(chat, messages.clone()));

        Ok(AppendOutcome {
            messages,
            title_task,
        })
    }

    /// Stores the model's reply once its stream has ended, aborted streams included.
    pub async fn persist_response(
        &self,
        chat_id: &str,
        message: Message,
    ) -> Result<Message, ConversationError> {
        if message.role != Role::Assistant {
            return Err(ConversationError::InvalidMessage(format!(
                "expected an assistant message, got {}",
                message.role
            )));
        }
        Ok(self.messages.save_message(chat_id, &message).await?)
    }

    /// The chat's history as its owner sees it.
    pub async fn load_history(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> Result<Vec<Message>, ConversationError> {
        if self.chats.get_for_user(chat_id, user_id).await?.is_none() {
            return Err(ConversationError::NotFound(format!("chat {chat_id}")));
        }
        Ok(self.messages.load_messages(chat_id).await?)
    }

    /// Drops `message_id` and everything after it, for edit and regenerate.
    /// Returns 0 when the message does not exist.
    pub async fn truncate_from(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<usize, ConversationError> {
        let Some(message) = self.messages.get_message(message_id).await? else {
            return Ok(0);
        };
        if self
            .chats
            .get_for_user(&message.chat_id, user_id)
            .await?
            .is_none()
        {
            return Err(ConversationError::NotFound(format!("message {message_id}")));
        }

        Ok(self.messages.delete_message_and_following(message_id).await?)
    }

    async fn discard_chat(&self, chat: &Chat) {
        match self.chats.delete(&chat.id, &chat.user_id).await {
            Ok(()) => log::debug!("discarded chat {} after its first message failed", chat.id),
            Err(err) => log::error!("could not discard chat {}: {err}", chat.id),
        }
    }

    fn spawn_title_task(&self, chat: Chat, history: Vec<Message>) -> JoinHandle<()> {
        let chats = self.chats.clone();
        let titles = Arc::clone(&self.titles);
        let events = self.events.clone();

        tokio::spawn(async move {
            let title = match titles
                .generate_title(&history)
                .await
                .and_then(|raw| normalize_title(&raw))
            {
                Ok(title) => title,
                Err(err) => {
                    log::warn!("title generation failed for chat {}: {err:#}", chat.id);
                    DEFAULT_CHAT_TITLE.to_string()
                }
            };

            match chats.rename(&chat.id, &title).await {
                Ok(renamed) => {
                    log::debug!("chat {} titled {:?}", renamed.id, renamed.title);
                    publish(
                        &events,
                        ChatEvent::TitleUpdated {
                            chat_id: renamed.id,
                            user_id: renamed.user_id,
                            title: renamed.title,
                        },
                    );
                }
                Err(err) => log::warn!("could not store title for chat {}: {err}", chat.id),
            }
        })
    }
}

fn has_placeholder_title(chat: &Chat) -> bool {
    chat.title == DEFAULT_CHAT_TITLE || chat.title == GENERATING_TITLE
}

fn publish(events: &broadcast::Sender<ChatEvent>, event: ChatEvent) {
    if events.send(event).is_err() {
        log::debug!("no chat event subscribers");
    }
}
