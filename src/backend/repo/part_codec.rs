//! Conversion between [`MessagePart`] and the flat `message_parts` row.
//!
//! A row has one nullable column group per part type. Encoding fills only the group of
//! the part's type; decoding refuses rows whose populated columns do not match their
//! declared type exactly.

use serde_json::Value;
use thiserror::Error;

use super::part::{MessagePart, ProviderMetadata, ToolCall, ToolState};

pub const TEXT: &str = "text";
pub const REASONING: &str = "reasoning";
pub const FILE: &str = "file";
pub const SOURCE_URL: &str = "source-url";
pub const SOURCE_DOCUMENT: &str = "source-document";
pub const STEP_START: &str = "step-start";
pub const TOOL_TYPE_PREFIX: &str = "tool-";

/// Storage shape of a part. Every payload column is optional; which ones are set
/// depends on `part_type`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PartRow {
    pub message_id: String,
    pub order: i64,
    pub part_type: String,

    pub text: Option<String>,

    pub reasoning_text: Option<String>,

    pub file_media_type: Option<String>,
    pub file_filename: Option<String>,
    pub file_url: Option<String>,

    pub source_url_source_id: Option<String>,
    pub source_url_url: Option<String>,
    pub source_url_title: Option<String>,

    pub source_document_source_id: Option<String>,
    pub source_document_media_type: Option<String>,
    pub source_document_title: Option<String>,
    pub source_document_filename: Option<String>,

    pub tool_call_id: Option<String>,
    pub tool_state: Option<String>,
    pub tool_input: Option<Value>,
    pub tool_output: Option<Value>,
    pub tool_error_text: Option<String>,

    pub provider_metadata: Option<Value>,
}

impl PartRow {
    /// Names of the payload columns that hold a value.
    pub fn populated_columns(&self) -> Vec<&'static str> {
        [
            ("text", self.text.is_some()),
            ("reasoning_text", self.reasoning_text.is_some()),
            ("file_media_type", self.file_media_type.is_some()),
            ("file_filename", self.file_filename.is_some()),
            ("file_url", self.file_url.is_some()),
            ("source_url_source_id", self.source_url_source_id.is_some()),
            ("source_url_url", self.source_url_url.is_some()),
            ("source_url_title", self.source_url_title.is_some()),
            ("source_document_source_id", self.source_document_source_id.is_some()),
            ("source_document_media_type", self.source_document_media_type.is_some()),
            ("source_document_title", self.source_document_title.is_some()),
            ("source_document_filename", self.source_document_filename.is_some()),
            ("tool_call_id", self.tool_call_id.is_some()),
            ("tool_state", self.tool_state.is_some()),
            ("tool_input", self.tool_input.is_some()),
            ("tool_output", self.tool_output.is_some()),
            ("tool_error_text", self.tool_error_text.is_some()),
            ("provider_metadata", self.provider_metadata.is_some()),
        ]
        .into_iter()
        .filter_map(|(column, populated)| populated.then_some(column))
        .collect()
    }

    fn empty(message_id: &str, order: i64, part_type: impl Into<String>) -> Self {
        Self {
            message_id: message_id.to_string(),
            order,
            part_type: part_type.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PartCodecError {
    #[error("unsupported part type: {0}")]
    UnsupportedType(String),
    #[error("{part_type} part is missing required field {field}")]
    MissingField {
        part_type: String,
        field: &'static str,
    },
    #[error("{part_type} part has unexpected field {field}")]
    UnexpectedField {
        part_type: String,
        field: &'static str,
    },
    #[error("{part_type} part has unknown tool state {state:?}")]
    UnknownToolState { part_type: String, state: String },
    #[error("{part_type} part has provider metadata that is not a JSON object")]
    InvalidProviderMetadata { part_type: String },
}

pub fn encode(part: &MessagePart, message_id: &str, order: i64) -> PartRow {
    match part {
        MessagePart::Text { text } => PartRow {
            text: Some(text.clone()),
            ..PartRow::empty(message_id, order, TEXT)
        },
        MessagePart::Reasoning {
            text,
            provider_metadata,
        } => PartRow {
            reasoning_text: Some(text.clone()),
            provider_metadata: provider_metadata.clone().map(Value::Object),
            ..PartRow::empty(message_id, order, REASONING)
        },
        MessagePart::File {
            media_type,
            url,
            filename,
        } => PartRow {
            file_media_type: Some(media_type.clone()),
            file_url: Some(url.clone()),
            file_filename: filename.clone(),
            ..PartRow::empty(message_id, order, FILE)
        },
        MessagePart::SourceUrl {
            source_id,
            url,
            title,
            provider_metadata,
        } => PartRow {
            source_url_source_id: Some(source_id.clone()),
            source_url_url: Some(url.clone()),
            source_url_title: title.clone(),
            provider_metadata: provider_metadata.clone().map(Value::Object),
            ..PartRow::empty(message_id, order, SOURCE_URL)
        },
        MessagePart::SourceDocument {
            source_id,
            media_type,
            title,
            filename,
            provider_metadata,
        } => PartRow {
            source_document_source_id: Some(source_id.clone()),
            source_document_media_type: Some(media_type.clone()),
            source_document_title: Some(title.clone()),
            source_document_filename: filename.clone(),
            provider_metadata: provider_metadata.clone().map(Value::Object),
            ..PartRow::empty(message_id, order, SOURCE_DOCUMENT)
        },
        MessagePart::StepStart => PartRow::empty(message_id, order, STEP_START),
        MessagePart::Tool(call) => encode_tool(call, message_id, order),
    }
}

fn encode_tool(call: &ToolCall, message_id: &str, order: i64) -> PartRow {
    let mut row = PartRow {
        tool_call_id: Some(call.tool_call_id.clone()),
        tool_state: Some(call.state.as_str().to_string()),
        ..PartRow::empty(message_id, order, format!("{TOOL_TYPE_PREFIX}{}", call.name))
    };

    match &call.state {
        ToolState::InputStreaming { input } => {
            row.tool_input = input.clone();
        }
        ToolState::InputAvailable { input } => {
            row.tool_input = Some(input.clone());
        }
        ToolState::OutputAvailable { input, output } => {
            row.tool_input = Some(input.clone());
            row.tool_output = Some(output.clone());
        }
        ToolState::OutputError { input, error_text } => {
            row.tool_input = Some(input.clone());
            row.tool_error_text = Some(error_text.clone());
        }
    }

    row
}

/// Encodes a message's parts, numbering them densely from zero in slice order.
pub fn encode_parts(parts: &[MessagePart], message_id: &str) -> Vec<PartRow> {
    parts
        .iter()
        .enumerate()
        .map(|(order, part)| encode(part, message_id, order as i64))
        .collect()
}

pub fn decode(row: &PartRow) -> Result<MessagePart, PartCodecError> {
    let decoder = RowDecoder { row };

    match row.part_type.as_str() {
        TEXT => {
            decoder.allow_only(&["text"])?;
            Ok(MessagePart::Text {
                text: decoder.required("text", &row.text)?,
            })
        }
        REASONING => {
            decoder.allow_only(&["reasoning_text", "provider_metadata"])?;
            Ok(MessagePart::Reasoning {
                text: decoder.required("reasoning_text", &row.reasoning_text)?,
                provider_metadata: decoder.provider_metadata()?,
            })
        }
        FILE => {
            decoder.allow_only(&["file_media_type", "file_filename", "file_url"])?;
            Ok(MessagePart::File {
                media_type: decoder.required("file_media_type", &row.file_media_type)?,
                url: decoder.required("file_url", &row.file_url)?,
                filename: row.file_filename.clone(),
            })
        }
        SOURCE_URL => {
            decoder.allow_only(&[
                "source_url_source_id",
                "source_url_url",
                "source_url_title",
                "provider_metadata",
            ])?;
            Ok(MessagePart::SourceUrl {
                source_id: decoder.required("source_url_source_id", &row.source_url_source_id)?,
                url: decoder.required("source_url_url", &row.source_url_url)?,
                title: row.source_url_title.clone(),
                provider_metadata: decoder.provider_metadata()?,
            })
        }
        SOURCE_DOCUMENT => {
            decoder.allow_only(&[
                "source_document_source_id",
                "source_document_media_type",
                "source_document_title",
                "source_document_filename",
                "provider_metadata",
            ])?;
            Ok(MessagePart::SourceDocument {
                source_id: decoder
                    .required("source_document_source_id", &row.source_document_source_id)?,
                media_type: decoder
                    .required("source_document_media_type", &row.source_document_media_type)?,
                title: decoder.required("source_document_title", &row.source_document_title)?,
                filename: row.source_document_filename.clone(),
                provider_metadata: decoder.provider_metadata()?,
            })
        }
        STEP_START => {
            decoder.allow_only(&[])?;
            Ok(MessagePart::StepStart)
        }
        other => match other.strip_prefix(TOOL_TYPE_PREFIX) {
            Some(name) if !name.is_empty() => decoder.tool(name),
            _ => Err(PartCodecError::UnsupportedType(other.to_string())),
        },
    }
}

/// Decodes a message's rows in `order`, whatever order storage returned them in.
pub fn decode_parts(mut rows: Vec<PartRow>) -> Result<Vec<MessagePart>, PartCodecError> {
    rows.sort_by_key(|row| row.order);
    rows.iter().map(decode).collect()
}

struct RowDecoder<'a> {
    row: &'a PartRow,
}

impl RowDecoder<'_> {
    fn allow_only(&self, allowed: &[&'static str]) -> Result<(), PartCodecError> {
        match self
            .row
            .populated_columns()
            .into_iter()
            .find(|column| !allowed.contains(column))
        {
            Some(field) => Err(PartCodecError::UnexpectedField {
                part_type: self.row.part_type.clone(),
                field,
            }),
            None => Ok(()),
        }
    }

    fn required<T: Clone>(&self, field: &'static str, value: &Option<T>) -> Result<T, PartCodecError> {
        value.clone().ok_or_else(|| PartCodecError::MissingField {
            part_type: self.row.part_type.clone(),
            field,
        })
    }

    fn provider_metadata(&self) -> Result<Option<ProviderMetadata>, PartCodecError> {
        match &self.row.provider_metadata {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map.clone())),
            Some(_) => Err(PartCodecError::InvalidProviderMetadata {
                part_type: self.row.part_type.clone(),
            }),
        }
    }

    fn tool(&self, name: &str) -> Result<MessagePart, PartCodecError> {
        let row = self.row;
        let tool_call_id = self.required("tool_call_id", &row.tool_call_id)?;
        let state_name = self.required("tool_state", &row.tool_state)?;

        let state = match state_name.as_str() {
            ToolState::INPUT_STREAMING => {
                self.allow_only(&["tool_call_id", "tool_state", "tool_input"])?;
                ToolState::InputStreaming {
                    input: row.tool_input.clone(),
                }
            }
            ToolState::INPUT_AVAILABLE => {
                self.allow_only(&["tool_call_id", "tool_state", "tool_input"])?;
                ToolState::InputAvailable {
                    input: self.required("tool_input", &row.tool_input)?,
                }
            }
            ToolState::OUTPUT_AVAILABLE => {
                self.allow_only(&["tool_call_id", "tool_state", "tool_input", "tool_output"])?;
                ToolState::OutputAvailable {
                    input: self.required("tool_input", &row.tool_input)?,
                    output: self.required("tool_output", &row.tool_output)?,
                }
            }
            ToolState::OUTPUT_ERROR => {
                self.allow_only(&["tool_call_id", "tool_state", "tool_input", "tool_error_text"])?;
                ToolState::OutputError {
                    input: self.required("tool_input", &row.tool_input)?,
                    error_text: self.required("tool_error_text", &row.tool_error_text)?,
                }
            }
            _ => {
                return Err(PartCodecError::UnknownToolState {
                    part_type: row.part_type.clone(),
                    state: state_name,
                });
            }
        };

        Ok(MessagePart::Tool(ToolCall {
            name: name.to_string(),
            tool_call_id,
            state,
        }))
    }
}
