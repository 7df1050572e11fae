use rusqlite_migration::{M, Migrations};

const SQLITE_MIGRATIONS_SLICE: &[M<'_>] = &[
    M::up(
        "
CREATE TABLE chats (
    id TEXT PRIMARY KEY NOT NULL CHECK(length(trim(id)) > 0),
    user_id TEXT NOT NULL CHECK(length(trim(user_id)) > 0),
    title TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX chats_user_created_idx ON chats(user_id, created_at);
",
    ),
    M::up(
        "
CREATE TABLE messages (
    id TEXT PRIMARY KEY NOT NULL CHECK(length(trim(id)) > 0),
    chat_id TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK(role IN ('user', 'assistant', 'system')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX messages_chat_id_idx ON messages(chat_id);
CREATE INDEX messages_chat_created_idx ON messages(chat_id, created_at);
",
    ),
    M::up(
        "
CREATE TABLE message_parts (
    id TEXT PRIMARY KEY NOT NULL,
    message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,

    position INTEGER NOT NULL CHECK(position >= 0), -- order within the message
    part_type TEXT NOT NULL CHECK(
        part_type IN ('text', 'reasoning', 'file', 'source-url', 'source-document', 'step-start')
        OR part_type LIKE 'tool-_%'
    ),

    text TEXT,

    reasoning_text TEXT,

    file_media_type TEXT,
    file_filename TEXT,
    file_url TEXT,

    source_url_source_id TEXT,
    source_url_url TEXT,
    source_url_title TEXT,

    source_document_source_id TEXT,
    source_document_media_type TEXT,
    source_document_title TEXT,
    source_document_filename TEXT,

    tool_call_id TEXT,
    tool_state TEXT CHECK(
        tool_state IS NULL
        OR tool_state IN ('input-streaming', 'input-available', 'output-available', 'output-error')
    ),
    tool_input TEXT, -- json
    tool_output TEXT, -- json
    tool_error_text TEXT,

    provider_metadata TEXT, -- json

    created_at TEXT NOT NULL,

    CHECK(part_type <> 'text' OR text IS NOT NULL),
    CHECK(part_type <> 'reasoning' OR reasoning_text IS NOT NULL),
    CHECK(part_type <> 'file' OR (file_media_type IS NOT NULL AND file_url IS NOT NULL)),
    CHECK(part_type <> 'source-url' OR (source_url_source_id IS NOT NULL AND source_url_url IS NOT NULL)),
    CHECK(part_type <> 'source-document' OR (
        source_document_source_id IS NOT NULL
        AND source_document_media_type IS NOT NULL
        AND source_document_title IS NOT NULL
    )),
    CHECK(part_type NOT LIKE 'tool-%' OR (tool_call_id IS NOT NULL AND tool_state IS NOT NULL)),
    CHECK(tool_state IS NULL OR tool_state = 'input-streaming' OR tool_input IS NOT NULL),
    CHECK(tool_state IS NULL OR tool_state <> 'output-available' OR tool_output IS NOT NULL),
    CHECK(tool_state IS NULL OR tool_state <> 'output-error' OR tool_error_text IS NOT NULL)
);
CREATE UNIQUE INDEX message_parts_message_position_uq ON message_parts(message_id, position);
CREATE INDEX message_parts_message_id_idx ON message_parts(message_id);
",
    ),
];
pub const SQLITE_MIGRATIONS: Migrations<'_> = Migrations::from_slice(SQLITE_MIGRATIONS_SLICE);
