pub mod backend;
pub mod config;

pub use backend::{
    BackendContext, BackendError,
    conversation::{AppendOutcome, ChatEvent, ConversationError, ConversationService},
    db::{Database, DatabaseError, DatabaseStartupError, sqlite::Sqlite},
    repo::{
        chat::{Chat, ChatRepo, ChatRepoError},
        message::{Message, MessageRecord, MessageRepo, MessageRepoError, Role},
        part::{MessagePart, ProviderMetadata, ToolCall, ToolState},
        part_codec::{PartCodecError, PartRow},
    },
    title::{TitleGenerator, openai::OpenAiTitleGenerator},
    uploads::{FileStore, LocalFileStore, StoredFile, UploadError},
};
pub use config::Config;
